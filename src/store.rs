use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use kyarashi_core::{
    local_schema_version, participant_id, repair, should_block, DocumentPatch, GameDocument,
    Participant, RepairWarning, Role, TableId,
};

use crate::cache::LocalCache;
use crate::diag;
use crate::remote::{ConnectionStatus, RemoteError, RemoteHooks, RemoteSubscription, RemoteTable};

pub type StoreSubscriber = Rc<dyn Fn()>;

pub struct StoreConfig {
    pub table: TableId,
    pub display_name: String,
    pub role: Role,
    /// The running build's schema version; injectable so tests can pin it.
    pub schema_version: String,
}

impl StoreConfig {
    pub fn new(table: TableId, display_name: &str, role: Role) -> Self {
        Self {
            table,
            display_name: display_name.to_string(),
            role,
            schema_version: local_schema_version().to_string(),
        }
    }

    pub fn with_schema_version(mut self, schema_version: &str) -> Self {
        self.schema_version = schema_version.to_string();
        self
    }
}

/// Returned from the mutation path when the version gate blocks the write.
/// The mutation has still been applied locally; the caller is expected to
/// surface this and force a reload rather than let the session diverge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMismatch {
    pub local_version: String,
    pub remote_version: String,
}

impl fmt::Display for VersionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "build {} may not write to a document at {}",
            self.local_version, self.remote_version
        )
    }
}

impl std::error::Error for VersionMismatch {}

/// The one stateful piece of the session: seeds from the local cache for
/// instant first paint, subscribes to the remote table, repairs and merges
/// every snapshot, and forwards optimistic local mutations through the
/// version gate. Consumers read through `document()` and get a plain
/// callback on every change.
pub struct GameStateStore {
    remote: Rc<dyn RemoteTable>,
    cache: LocalCache,
    config: StoreConfig,
    session_key: String,
    self_id: String,
    document: RefCell<GameDocument>,
    status: Cell<ConnectionStatus>,
    remote_version: RefCell<Option<String>>,
    last_warnings: RefCell<Vec<RepairWarning>>,
    seeding: Cell<bool>,
    initialized: Cell<bool>,
    subscription: RefCell<Option<RemoteSubscription>>,
    subscribers: Rc<RefCell<Vec<StoreSubscriber>>>,
}

impl GameStateStore {
    pub fn new(remote: Rc<dyn RemoteTable>, cache: LocalCache, config: StoreConfig) -> Rc<Self> {
        let session_key = cache.session_key(&config.table);
        let document = cache.load(&config.table).unwrap_or_else(|| {
            GameDocument::new(config.table.as_str(), &config.schema_version)
        });
        let self_id = participant_id(&config.display_name);
        diag::log(&format!(
            "session {session_key} opening table {}",
            config.table
        ));
        Rc::new(Self {
            remote,
            cache,
            config,
            session_key,
            self_id,
            document: RefCell::new(document),
            status: Cell::new(ConnectionStatus::Connecting),
            remote_version: RefCell::new(None),
            last_warnings: RefCell::new(Vec::new()),
            seeding: Cell::new(false),
            initialized: Cell::new(false),
            subscription: RefCell::new(None),
            subscribers: Rc::new(RefCell::new(Vec::new())),
        })
    }

    /// Opens the snapshot stream. Safe to call once per store; a second call
    /// is a no-op while the first subscription is alive.
    pub fn connect(self: &Rc<Self>) {
        if self.subscription.borrow().is_some() {
            return;
        }
        self.set_status(ConnectionStatus::Connecting);
        let on_snapshot: Rc<dyn Fn(Option<Value>)> = {
            let store = Rc::clone(self);
            Rc::new(move |raw| store.handle_snapshot(raw))
        };
        let on_error: Rc<dyn Fn(RemoteError)> = {
            let store = Rc::clone(self);
            Rc::new(move |error| store.handle_remote_error(error))
        };
        let subscription = self.remote.subscribe(
            &self.config.table,
            RemoteHooks {
                on_snapshot,
                on_error,
            },
        );
        *self.subscription.borrow_mut() = Some(subscription);
    }

    /// Tears the stream down; dropping the subscription closes it exactly
    /// once.
    pub fn shutdown(&self) {
        self.subscription.borrow_mut().take();
        self.set_status(ConnectionStatus::Disconnected);
    }

    pub fn document(&self) -> GameDocument {
        self.document.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.get()
    }

    pub fn last_warnings(&self) -> Vec<RepairWarning> {
        self.last_warnings.borrow().clone()
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn self_participant_id(&self) -> &str {
        &self.self_id
    }

    pub fn last_confirmed_role(&self) -> Option<Role> {
        self.cache.last_role()
    }

    pub fn subscribe(&self, subscriber: StoreSubscriber) -> StoreSubscription {
        self.subscribers.borrow_mut().push(subscriber.clone());
        StoreSubscription {
            subscriber,
            subscribers: Rc::clone(&self.subscribers),
        }
    }

    /// Applies the patch optimistically, then forwards it remotely unless
    /// the version gate blocks. A blocked mutation keeps the local apply so
    /// no input is lost, and hands the caller a `VersionMismatch` to surface.
    pub fn mutate(&self, patch: DocumentPatch) -> Result<(), VersionMismatch> {
        if patch.is_empty() {
            return Ok(());
        }
        self.document.borrow_mut().apply_patch(&patch);
        if let Some(players) = patch.players.as_ref() {
            if let Some(own) = players.iter().find(|player| player.id == self.self_id) {
                self.cache.save_last_role(own.role);
            }
        }
        self.notify();
        let remote_version = self
            .remote_version
            .borrow()
            .clone()
            .unwrap_or_default();
        if should_block(&self.config.schema_version, &remote_version) {
            return Err(VersionMismatch {
                local_version: self.config.schema_version.clone(),
                remote_version,
            });
        }
        self.remote.patch(&self.config.table, patch.fields());
        Ok(())
    }

    fn handle_snapshot(&self, raw: Option<Value>) {
        self.set_status(ConnectionStatus::Connected);
        let Some(raw) = raw else {
            // The existence check only applies before the first real
            // snapshot; the core never deletes documents, so a later null
            // is the store misbehaving, not a reason to re-seed.
            if self.initialized.get() {
                diag::warn(&format!("table {} reported missing", self.config.table));
                return;
            }
            // The first participant to load defines the game. The seeding
            // flag keeps a second null snapshot from racing a replace that
            // is already in flight.
            if self.seeding.get() {
                return;
            }
            self.seeding.set(true);
            diag::log(&format!(
                "table {} does not exist yet, seeding it",
                self.config.table
            ));
            let seed = self.seed_document();
            match seed.to_value() {
                Some(value) => self.remote.replace(&self.config.table, value),
                None => diag::warn("seed document failed to encode"),
            }
            return;
        };
        self.seeding.set(false);
        self.initialized.set(true);
        let repaired = repair(&raw);
        if !repaired.warnings.is_empty() {
            diag::warn(&format!(
                "snapshot for {} repaired on {} field(s)",
                self.config.table,
                repaired.warnings.len()
            ));
        }
        *self.remote_version.borrow_mut() = Some(repaired.document.schema_version.clone());
        {
            let mut document = self.document.borrow_mut();
            document.merge_remote(repaired.document);
            self.cache.save(&self.config.table, &document);
        }
        *self.last_warnings.borrow_mut() = repaired.warnings;
        self.notify();
        self.ensure_self_participant();
    }

    fn handle_remote_error(&self, error: RemoteError) {
        diag::warn(&format!("remote stream error: {error}"));
        let next = match error {
            RemoteError::Unavailable { .. } | RemoteError::Timeout => {
                ConnectionStatus::Disconnected
            }
            RemoteError::PermissionDenied { .. } | RemoteError::Protocol { .. } => {
                ConnectionStatus::Error
            }
        };
        self.set_status(next);
    }

    fn seed_document(&self) -> GameDocument {
        let mut seed = self.document.borrow().clone();
        seed.document_id = self.config.table.as_str().to_string();
        seed.schema_version = self.config.schema_version.clone();
        if seed.participant(&self.self_id).is_none() {
            seed.players.push(self.self_participant());
        }
        seed
    }

    fn self_participant(&self) -> Participant {
        Participant::new(&self.config.display_name, self.config.role)
    }

    /// First join on an existing table: append this session's participant.
    /// Identity is derived from the display name, so re-running against a
    /// snapshot that already carries it is a no-op.
    fn ensure_self_participant(&self) {
        let present = self.document.borrow().participant(&self.self_id).is_some();
        if present {
            return;
        }
        let mut players = self.document.borrow().players.clone();
        players.push(self.self_participant());
        diag::log(&format!(
            "joining table {} as {}",
            self.config.table, self.config.display_name
        ));
        if let Err(err) = self.mutate(DocumentPatch::players(players)) {
            diag::warn(&format!("join was not forwarded: {err}"));
        }
    }

    fn set_status(&self, next: ConnectionStatus) {
        if self.status.get() == next {
            return;
        }
        self.status.set(next);
        self.notify();
    }

    fn notify(&self) {
        let subscribers = self.subscribers.borrow().clone();
        for subscriber in subscribers {
            (subscriber)();
        }
    }
}

pub struct StoreSubscription {
    subscriber: StoreSubscriber,
    subscribers: Rc<RefCell<Vec<StoreSubscriber>>>,
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        let mut subscribers = self.subscribers.borrow_mut();
        subscribers.retain(|item| !Rc::ptr_eq(item, &self.subscriber));
    }
}
