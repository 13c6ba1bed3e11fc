use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use kyarashi_core::TableId;

pub mod memory;

/// Connection state as seen by consumers. `Connected` is re-entered by the
/// transport's own reconnection; the store only reports what it observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    Unavailable { detail: String },
    PermissionDenied { detail: String },
    Timeout,
    Protocol { detail: String },
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Unavailable { detail } => write!(f, "store unavailable: {detail}"),
            RemoteError::PermissionDenied { detail } => write!(f, "permission denied: {detail}"),
            RemoteError::Timeout => write!(f, "store did not answer in time"),
            RemoteError::Protocol { detail } => write!(f, "protocol error: {detail}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Callbacks for one subscription. Every change to the table arrives as a
/// full snapshot; `None` means the document does not exist.
#[derive(Clone)]
pub struct RemoteHooks {
    pub on_snapshot: Rc<dyn Fn(Option<Value>)>,
    pub on_error: Rc<dyn Fn(RemoteError)>,
}

/// Dropping the subscription closes the stream; that is the one teardown
/// obligation a session has, and Drop makes it happen exactly once.
pub struct RemoteSubscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl RemoteSubscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// The document service contract for one table: stream snapshots in, send
/// shallow top-level patches (or a one-time seeding replace) out. Writes are
/// fire-and-forget; failures surface through the subscription's `on_error`.
/// The existence check is bounded by the implementation's own timeout and
/// reports "could not verify" as an error, never as a false "does not exist".
pub trait RemoteTable {
    fn subscribe(&self, table: &TableId, hooks: RemoteHooks) -> RemoteSubscription;
    fn patch(&self, table: &TableId, fields: Map<String, Value>);
    fn replace(&self, table: &TableId, document: Value);
    fn check_exists(&self, table: &TableId, on_result: Rc<dyn Fn(Result<bool, RemoteError>)>);
}
