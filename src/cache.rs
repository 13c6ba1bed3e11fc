use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use kyarashi_core::{repair, GameDocument, Role, TableId};

use crate::diag;
use crate::session;

const DOCUMENT_KEY_PREFIX: &str = "kyarashi.table.";
const SESSION_KEY_PREFIX: &str = "kyarashi.session.";
const LAST_ROLE_KEY: &str = "kyarashi.last_role";

/// On-device key-value storage. The browser build backs this with
/// `localStorage`; native builds and tests use the in-memory backend.
pub trait StorageBackend {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> bool;
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> bool {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        true
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}

/// Last-known-good document per table, plus the two session-scoped entries:
/// the diagnostic session key and the user's last confirmed role. Writes are
/// best-effort; a failed write is logged and swallowed because the remote
/// store stays the source of truth.
pub struct LocalCache {
    backend: Rc<dyn StorageBackend>,
}

impl LocalCache {
    pub fn new(backend: Rc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn load(&self, table: &TableId) -> Option<GameDocument> {
        let raw = self.backend.get(&document_key(table))?;
        let value: Value = serde_json::from_str(&raw).ok()?;
        let repaired = repair(&value);
        if !repaired.warnings.is_empty() {
            diag::warn(&format!(
                "cached document for {table} needed repair on {} field(s)",
                repaired.warnings.len()
            ));
        }
        Some(repaired.document)
    }

    pub fn save(&self, table: &TableId, document: &GameDocument) {
        let raw = match serde_json::to_string(document) {
            Ok(raw) => raw,
            Err(err) => {
                diag::warn(&format!("failed to encode document for cache: {err}"));
                return;
            }
        };
        if !self.backend.set(&document_key(table), &raw) {
            diag::warn(&format!("cache write for {table} failed"));
        }
    }

    pub fn clear(&self, table: &TableId) {
        self.backend.remove(&document_key(table));
    }

    /// Stable per-browser key: random on first run, persisted thereafter.
    pub fn session_key(&self, table: &TableId) -> String {
        let key = format!("{SESSION_KEY_PREFIX}{}", table.as_str());
        if let Some(existing) = self.backend.get(&key) {
            if !existing.is_empty() {
                return existing;
            }
        }
        let fresh = session::generate_session_key();
        if !self.backend.set(&key, &fresh) {
            diag::warn("session key write failed");
        }
        fresh
    }

    pub fn last_role(&self) -> Option<Role> {
        self.backend
            .get(LAST_ROLE_KEY)
            .and_then(|raw| Role::parse(&raw))
    }

    pub fn save_last_role(&self, role: Role) {
        if !self.backend.set(LAST_ROLE_KEY, role.as_str()) {
            diag::warn("last role write failed");
        }
    }
}

fn document_key(table: &TableId) -> String {
    format!("{DOCUMENT_KEY_PREFIX}{}", table.as_str())
}
