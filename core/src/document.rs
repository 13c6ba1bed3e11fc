use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub const PARTICIPANT_ID_BYTES: usize = 8;

/// Schema version the running build writes into documents it creates.
/// Overridable at build time so staged rollouts can pin a version.
pub fn local_schema_version() -> &'static str {
    option_env!("KYARASHI_SCHEMA_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Stable participant identity: SHA-256 of the trimmed, lowercased display
/// name, first 8 bytes as lowercase hex. Re-deriving for the same name is a
/// no-op, which is what makes the join path idempotent.
pub fn participant_id(display_name: &str) -> String {
    let normalized = display_name.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest[..PARTICIPANT_ID_BYTES]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Keeper,
    #[default]
    Player,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Keeper => "keeper",
            Role::Player => "player",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "keeper" => Some(Role::Keeper),
            "player" => Some(Role::Player),
            _ => None,
        }
    }
}

/// Inbound participants are rebuilt field-by-field by the repair pass, so
/// these document types only ever serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub role: Role,
    pub online: bool,
    pub sheet: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Participant {
    pub fn new(display_name: &str, role: Role) -> Self {
        Self {
            id: participant_id(display_name),
            name: display_name.trim().to_string(),
            role,
            online: true,
            sheet: None,
            extra: Map::new(),
        }
    }
}

/// Shared safety-tooling lists. The two inner maps are sparse integer-keyed
/// toggle sets and are exactly the fields the storage layer is prone to
/// collapsing into positional arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SafetyTools {
    pub lines: BTreeMap<u32, bool>,
    pub veils: BTreeMap<u32, bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The single shared aggregate: one table's full state. Top-level keys merge
/// independently; unknown keys ride along in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameDocument {
    pub document_id: String,
    pub schema_version: String,
    pub last_modified: i64,
    pub players: Vec<Participant>,
    pub mysteries: Map<String, Value>,
    pub safety: SafetyTools,
    pub scene: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameDocument {
    pub fn new(document_id: &str, schema_version: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            schema_version: schema_version.to_string(),
            ..Self::default()
        }
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.players.iter().find(|participant| participant.id == id)
    }

    pub fn to_value(&self) -> Option<Value> {
        serde_json::to_value(self).ok()
    }

    /// Folds a repaired remote snapshot over local state. Remote wins per
    /// top-level key; each key's subtree is replaced wholesale. Keys the
    /// remote never mentioned keep their local value. The document id is the
    /// join code shared out-of-band, so a remote value never overrides a
    /// non-empty local one.
    pub fn merge_remote(&mut self, remote: GameDocument) {
        if self.document_id.is_empty() {
            self.document_id = remote.document_id;
        }
        self.schema_version = remote.schema_version;
        self.last_modified = remote.last_modified;
        self.players = remote.players;
        self.mysteries = remote.mysteries;
        self.safety = remote.safety;
        self.scene = remote.scene;
        for (key, value) in remote.extra {
            self.extra.insert(key, value);
        }
    }
}
