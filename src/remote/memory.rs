use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use kyarashi_core::TableId;

use super::{RemoteError, RemoteHooks, RemoteSubscription, RemoteTable};

/// Integer-keyed objects at least this dense get collapsed into arrays, the
/// same way the production store mangles them. Keys past the cap stay maps.
const COERCE_MAX_SLOTS: usize = 512;

/// In-process document service with the production store's observable
/// behavior: full-snapshot fan-out on every write, shallow top-level patch
/// merge, server-side `lastModified` stamping, and the dense-integer-key
/// array collapse. Clones share state, so one instance can back any number
/// of client stores in a test or simulation.
#[derive(Clone)]
pub struct MemoryRemote {
    inner: Rc<MemoryRemoteInner>,
}

struct MemoryRemoteInner {
    tables: RefCell<HashMap<String, Value>>,
    subscribers: RefCell<Vec<MemorySubscriber>>,
    next_subscriber: Cell<u64>,
    clock: Cell<i64>,
    offline: Cell<bool>,
}

struct MemorySubscriber {
    id: u64,
    table: String,
    hooks: RemoteHooks,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MemoryRemoteInner {
                tables: RefCell::new(HashMap::new()),
                subscribers: RefCell::new(Vec::new()),
                next_subscriber: Cell::new(0),
                clock: Cell::new(0),
                offline: Cell::new(false),
            }),
        }
    }

    /// While offline, writes are dropped with an error broadcast and the
    /// existence check times out.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.set(offline);
    }

    /// The raw stored value, quirks and all.
    pub fn document(&self, table: &TableId) -> Option<Value> {
        self.inner.tables.borrow().get(table.as_str()).cloned()
    }

    /// Seeds a stored value without stamping or broadcasting, for arranging
    /// pre-existing state in tests.
    pub fn seed_document(&self, table: &TableId, document: Value) {
        self.inner
            .tables
            .borrow_mut()
            .insert(table.as_str().to_string(), document);
    }

    pub fn subscriber_count(&self, table: &TableId) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.table == table.as_str())
            .count()
    }

    fn stamp(&self, mut document: Value) -> Value {
        if let Some(fields) = document.as_object_mut() {
            fields.insert("lastModified".to_string(), Value::from(self.inner.tick()));
        }
        document
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteInner {
    fn tick(&self) -> i64 {
        let next = self.clock.get() + 1;
        self.clock.set(next);
        next
    }

    fn broadcast(&self, table: &str, document: Option<Value>) {
        let hooks: Vec<RemoteHooks> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.table == table)
            .map(|subscriber| subscriber.hooks.clone())
            .collect();
        for hook in hooks {
            (hook.on_snapshot)(document.clone());
        }
    }

    fn broadcast_error(&self, table: &str, error: RemoteError) {
        let hooks: Vec<RemoteHooks> = self
            .subscribers
            .borrow()
            .iter()
            .filter(|subscriber| subscriber.table == table)
            .map(|subscriber| subscriber.hooks.clone())
            .collect();
        for hook in hooks {
            (hook.on_error)(error.clone());
        }
    }

    fn store(&self, table: &str, document: Value) -> Value {
        let collapsed = collapse_integer_maps(document);
        self.tables
            .borrow_mut()
            .insert(table.to_string(), collapsed.clone());
        collapsed
    }
}

impl RemoteTable for MemoryRemote {
    fn subscribe(&self, table: &TableId, hooks: RemoteHooks) -> RemoteSubscription {
        let id = self.inner.next_subscriber.get();
        self.inner.next_subscriber.set(id + 1);
        self.inner.subscribers.borrow_mut().push(MemorySubscriber {
            id,
            table: table.as_str().to_string(),
            hooks: hooks.clone(),
        });
        if self.inner.offline.get() {
            (hooks.on_error)(RemoteError::Unavailable {
                detail: "offline".to_string(),
            });
        } else {
            let current = self.inner.tables.borrow().get(table.as_str()).cloned();
            (hooks.on_snapshot)(current);
        }
        let inner = Rc::clone(&self.inner);
        RemoteSubscription::new(move || {
            inner
                .subscribers
                .borrow_mut()
                .retain(|subscriber| subscriber.id != id);
        })
    }

    fn patch(&self, table: &TableId, fields: Map<String, Value>) {
        if self.inner.offline.get() {
            self.inner.broadcast_error(
                table.as_str(),
                RemoteError::Unavailable {
                    detail: "offline".to_string(),
                },
            );
            return;
        }
        let merged = {
            let mut tables = self.inner.tables.borrow_mut();
            let entry = tables
                .entry(table.as_str().to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Some(document) = entry.as_object_mut() else {
                return;
            };
            for (key, value) in fields {
                document.insert(key, value);
            }
            entry.clone()
        };
        let stamped = self.stamp(merged);
        let stored = self.inner.store(table.as_str(), stamped);
        self.inner.broadcast(table.as_str(), Some(stored));
    }

    fn replace(&self, table: &TableId, document: Value) {
        if self.inner.offline.get() {
            self.inner.broadcast_error(
                table.as_str(),
                RemoteError::Unavailable {
                    detail: "offline".to_string(),
                },
            );
            return;
        }
        let stamped = self.stamp(document);
        let stored = self.inner.store(table.as_str(), stamped);
        self.inner.broadcast(table.as_str(), Some(stored));
    }

    fn check_exists(&self, table: &TableId, on_result: Rc<dyn Fn(Result<bool, RemoteError>)>) {
        if self.inner.offline.get() {
            on_result(Err(RemoteError::Timeout));
            return;
        }
        let exists = self.inner.tables.borrow().contains_key(table.as_str());
        on_result(Ok(exists));
    }
}

/// The storage layer's encoding quirk: an object whose keys are a dense
/// enough run of small non-negative integers comes back as a positional
/// array with null holes. Applied recursively on every write so subscribers
/// observe the same mangling the production store produces.
fn collapse_integer_maps(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(key, value)| (key, collapse_integer_maps(value)))
                .collect();
            match as_dense_array(&map) {
                Some(items) => Value::Array(items),
                None => Value::Object(map),
            }
        }
        Value::Array(items) => {
            Value::Array(items.into_iter().map(collapse_integer_maps).collect())
        }
        other => other,
    }
}

fn as_dense_array(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if map.is_empty() {
        return None;
    }
    let mut max_index = 0usize;
    for key in map.keys() {
        let index = key.parse::<usize>().ok()?;
        if key != &index.to_string() {
            return None;
        }
        max_index = max_index.max(index);
    }
    let len = max_index + 1;
    if len > COERCE_MAX_SLOTS || map.len() * 2 < len {
        return None;
    }
    let mut items = vec![Value::Null; len];
    for (key, value) in map {
        if let Ok(index) = key.parse::<usize>() {
            items[index] = value.clone();
        }
    }
    Some(items)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn half_dense_integer_map_collapses_with_null_holes() {
        let collapsed = collapse_integer_maps(json!({ "1": true, "3": false }));
        assert_eq!(collapsed, json!([null, true, null, false]));
    }

    #[test]
    fn sparse_integer_map_stays_a_map() {
        let value = json!({ "0": true, "9": false });
        assert_eq!(collapse_integer_maps(value.clone()), value);
    }

    #[test]
    fn non_integer_keys_are_never_collapsed() {
        let value = json!({ "0": true, "manor": false });
        assert_eq!(collapse_integer_maps(value.clone()), value);
    }

    #[test]
    fn non_canonical_integer_keys_are_never_collapsed() {
        let value = json!({ "00": true, "1": false });
        assert_eq!(collapse_integer_maps(value.clone()), value);
    }
}
