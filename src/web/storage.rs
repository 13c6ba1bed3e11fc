use web_sys::Storage;

use crate::cache::StorageBackend;

fn storage() -> Option<Storage> {
    web_sys::window()?.local_storage().ok()?
}

/// `localStorage` backend. Every access re-acquires the handle; quota or
/// privacy-mode failures degrade to misses, which the cache treats as
/// best-effort anyway.
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for LocalStorage {
    fn get(&self, key: &str) -> Option<String> {
        storage()?.get_item(key).ok()?
    }

    fn set(&self, key: &str, value: &str) -> bool {
        storage()
            .map(|storage| storage.set_item(key, value).is_ok())
            .unwrap_or(false)
    }

    fn remove(&self, key: &str) {
        if let Some(storage) = storage() {
            let _ = storage.remove_item(key);
        }
    }
}
