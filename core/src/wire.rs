use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frames a client sends to the document service. `subscribe` opens the
/// snapshot stream for one table; `patch` is a shallow top-level merge;
/// `replace` seeds a document that does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Subscribe {
        table: String,
    },
    Patch {
        table: String,
        fields: Map<String, Value>,
    },
    Replace {
        table: String,
        document: Value,
    },
    Exists {
        table: String,
    },
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<u64>,
    },
}

/// Frames the service sends back. Every change to a subscribed table arrives
/// as a full `snapshot`; `document: null` means the table does not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Snapshot {
        table: String,
        document: Option<Value>,
    },
    Exists {
        table: String,
        exists: bool,
    },
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nonce: Option<u64>,
    },
    Error {
        code: String,
        message: String,
    },
}

pub fn encode_frame<T>(frame: &T) -> Option<String>
where
    T: Serialize,
{
    serde_json::to_string(frame).ok()
}

pub fn decode_frame<T>(raw: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    serde_json::from_str(raw).ok()
}
