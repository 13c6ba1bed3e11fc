use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::document::{participant_id, GameDocument, Participant, Role, SafetyTools};

/// Field names that are sparse integer-keyed maps on the wire. The storage
/// layer collapses dense runs of small integer keys into positional arrays;
/// only these names are decoded back, every other array is kept verbatim.
pub const SPARSE_MAP_FIELDS: &[&str] = &["lines", "veils", "clues"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairWarning {
    pub field: String,
    pub expected: &'static str,
    pub received: String,
}

#[derive(Debug, Clone)]
pub struct Repaired {
    pub document: GameDocument,
    pub warnings: Vec<RepairWarning>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(field: impl Into<String>, expected: &'static str, received: &Value) -> RepairWarning {
    RepairWarning {
        field: field.into(),
        expected,
        received: type_name(received).to_string(),
    }
}

fn missing(field: impl Into<String>, expected: &'static str) -> RepairWarning {
    RepairWarning {
        field: field.into(),
        expected,
        received: "missing".to_string(),
    }
}

/// Reverses the storage layer's array collapse. Walks the whole tree; any
/// value sitting under an allow-listed key that arrives as an array becomes a
/// string-integer-keyed map again, with null slots dropped rather than
/// materialized as entries.
pub fn decode_sparse_maps(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                let value = if SPARSE_MAP_FIELDS.contains(&key.as_str()) {
                    decode_sparse_field(value)
                } else {
                    decode_sparse_maps(value)
                };
                out.insert(key, value);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(decode_sparse_maps).collect()),
        other => other,
    }
}

fn decode_sparse_field(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut out = Map::new();
            for (index, item) in items.into_iter().enumerate() {
                if item.is_null() {
                    continue;
                }
                out.insert(index.to_string(), decode_sparse_maps(item));
            }
            Value::Object(out)
        }
        other => decode_sparse_maps(other),
    }
}

/// Turns an arbitrary inbound value into a structurally valid document.
/// Never fails: each bad field degrades to its documented default and leaves
/// a warning behind; only a value that is not an object at all falls back to
/// the fully defaulted document. A valid document round-trips untouched with
/// zero warnings.
pub fn repair(raw: &Value) -> Repaired {
    if !raw.is_object() {
        return Repaired {
            document: GameDocument::default(),
            warnings: vec![mismatch("document", "object", raw)],
        };
    }
    let Value::Object(mut fields) = decode_sparse_maps(raw.clone()) else {
        return Repaired {
            document: GameDocument::default(),
            warnings: vec![mismatch("document", "object", raw)],
        };
    };

    let mut warnings = Vec::new();
    let document = GameDocument {
        document_id: take_string(&mut fields, "documentId", &mut warnings),
        schema_version: take_string(&mut fields, "schemaVersion", &mut warnings),
        last_modified: take_timestamp(&mut fields, &mut warnings),
        players: take_players(&mut fields, &mut warnings),
        mysteries: take_object(&mut fields, "mysteries", &mut warnings),
        safety: take_safety(&mut fields, &mut warnings),
        scene: take_optional_object(&mut fields, "scene", &mut warnings),
        extra: fields,
    };
    Repaired { document, warnings }
}

fn take_string(
    fields: &mut Map<String, Value>,
    key: &'static str,
    warnings: &mut Vec<RepairWarning>,
) -> String {
    match fields.remove(key) {
        Some(Value::String(value)) => value,
        Some(other) => {
            warnings.push(mismatch(key, "string", &other));
            String::new()
        }
        None => {
            warnings.push(missing(key, "string"));
            String::new()
        }
    }
}

fn take_timestamp(fields: &mut Map<String, Value>, warnings: &mut Vec<RepairWarning>) -> i64 {
    match fields.remove("lastModified") {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value as i64))
            .unwrap_or(0),
        Some(other) => {
            warnings.push(mismatch("lastModified", "number", &other));
            0
        }
        None => {
            warnings.push(missing("lastModified", "number"));
            0
        }
    }
}

fn take_object(
    fields: &mut Map<String, Value>,
    key: &'static str,
    warnings: &mut Vec<RepairWarning>,
) -> Map<String, Value> {
    match fields.remove(key) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            warnings.push(mismatch(key, "object", &other));
            Map::new()
        }
        None => {
            warnings.push(missing(key, "object"));
            Map::new()
        }
    }
}

fn take_optional_object(
    fields: &mut Map<String, Value>,
    key: &'static str,
    warnings: &mut Vec<RepairWarning>,
) -> Option<Map<String, Value>> {
    match fields.remove(key) {
        Some(Value::Object(map)) => Some(map),
        Some(Value::Null) | None => None,
        Some(other) => {
            warnings.push(mismatch(key, "object", &other));
            None
        }
    }
}

fn take_players(
    fields: &mut Map<String, Value>,
    warnings: &mut Vec<RepairWarning>,
) -> Vec<Participant> {
    let entries = match fields.remove("players") {
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            warnings.push(mismatch("players", "array", &other));
            return Vec::new();
        }
        None => {
            warnings.push(missing("players", "array"));
            return Vec::new();
        }
    };
    let mut players: Vec<Participant> = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let mut entry = match entry {
            Value::Object(entry) => entry,
            other => {
                warnings.push(mismatch(format!("players[{index}]"), "object", &other));
                continue;
            }
        };
        let name = match entry.remove("name") {
            Some(Value::String(name)) => name,
            Some(other) => {
                warnings.push(mismatch(format!("players[{index}].name"), "string", &other));
                String::new()
            }
            None => {
                warnings.push(missing(format!("players[{index}].name"), "string"));
                String::new()
            }
        };
        let id = match entry.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => id,
            other => {
                let received = match other {
                    Some(ref value) => type_name(value).to_string(),
                    None => "missing".to_string(),
                };
                warnings.push(RepairWarning {
                    field: format!("players[{index}].id"),
                    expected: "string",
                    received,
                });
                if name.trim().is_empty() {
                    // No identity to derive from; the entry cannot survive.
                    continue;
                }
                participant_id(&name)
            }
        };
        let role = match entry.remove("role") {
            Some(Value::String(raw)) => match Role::parse(&raw) {
                Some(role) => role,
                None => {
                    warnings.push(RepairWarning {
                        field: format!("players[{index}].role"),
                        expected: "keeper|player",
                        received: raw,
                    });
                    Role::Player
                }
            },
            Some(other) => {
                warnings.push(mismatch(
                    format!("players[{index}].role"),
                    "keeper|player",
                    &other,
                ));
                Role::Player
            }
            None => {
                warnings.push(missing(format!("players[{index}].role"), "keeper|player"));
                Role::Player
            }
        };
        let online = match entry.remove("online") {
            Some(Value::Bool(online)) => online,
            Some(other) => {
                warnings.push(mismatch(format!("players[{index}].online"), "bool", &other));
                false
            }
            None => {
                warnings.push(missing(format!("players[{index}].online"), "bool"));
                false
            }
        };
        let sheet = match entry.remove("sheet") {
            Some(Value::Object(map)) => Some(map),
            Some(Value::Null) | None => None,
            Some(other) => {
                warnings.push(mismatch(format!("players[{index}].sheet"), "object", &other));
                None
            }
        };
        if players.iter().any(|existing| existing.id == id) {
            warnings.push(RepairWarning {
                field: format!("players[{index}].id"),
                expected: "unique id",
                received: id,
            });
            continue;
        }
        players.push(Participant {
            id,
            name,
            role,
            online,
            sheet,
            extra: entry,
        });
    }
    players
}

fn take_safety(fields: &mut Map<String, Value>, warnings: &mut Vec<RepairWarning>) -> SafetyTools {
    let mut container = match fields.remove("safety") {
        Some(Value::Object(map)) => map,
        Some(other) => {
            warnings.push(mismatch("safety", "object", &other));
            return SafetyTools::default();
        }
        None => {
            warnings.push(missing("safety", "object"));
            return SafetyTools::default();
        }
    };
    let lines = take_toggle_map(&mut container, "lines", "safety.lines", warnings);
    let veils = take_toggle_map(&mut container, "veils", "safety.veils", warnings);
    SafetyTools {
        lines,
        veils,
        extra: container,
    }
}

fn take_toggle_map(
    container: &mut Map<String, Value>,
    key: &'static str,
    path: &'static str,
    warnings: &mut Vec<RepairWarning>,
) -> BTreeMap<u32, bool> {
    let entries = match container.remove(key) {
        Some(Value::Object(entries)) => entries,
        Some(other) => {
            warnings.push(mismatch(path, "object", &other));
            return BTreeMap::new();
        }
        None => {
            warnings.push(missing(path, "object"));
            return BTreeMap::new();
        }
    };
    let mut out = BTreeMap::new();
    for (slot, value) in entries {
        let Ok(slot_index) = slot.parse::<u32>() else {
            warnings.push(RepairWarning {
                field: format!("{path}.{slot}"),
                expected: "integer key",
                received: slot,
            });
            continue;
        };
        match value {
            Value::Bool(toggled) => {
                out.insert(slot_index, toggled);
            }
            other => {
                warnings.push(mismatch(format!("{path}.{slot}"), "bool", &other));
            }
        }
    }
    out
}
