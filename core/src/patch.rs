use serde::Serialize;
use serde_json::{Map, Value};

use crate::document::{GameDocument, Participant, SafetyTools};

/// A partial update: only the keys that are set travel to the remote store,
/// and each one replaces the corresponding top-level key wholesale. There is
/// no `lastModified` here on purpose; the store stamps it server-side.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Participant>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mysteries: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyTools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DocumentPatch {
    pub fn players(players: Vec<Participant>) -> Self {
        Self {
            players: Some(players),
            ..Self::default()
        }
    }

    pub fn mysteries(mysteries: Map<String, Value>) -> Self {
        Self {
            mysteries: Some(mysteries),
            ..Self::default()
        }
    }

    pub fn safety(safety: SafetyTools) -> Self {
        Self {
            safety: Some(safety),
            ..Self::default()
        }
    }

    pub fn scene(scene: Map<String, Value>) -> Self {
        Self {
            scene: Some(scene),
            ..Self::default()
        }
    }

    /// A patch for a top-level key outside the typed schema.
    pub fn field(key: &str, value: Value) -> Self {
        let mut extra = Map::new();
        extra.insert(key.to_string(), value);
        Self {
            extra,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.schema_version.is_none()
            && self.players.is_none()
            && self.mysteries.is_none()
            && self.safety.is_none()
            && self.scene.is_none()
            && self.extra.is_empty()
    }

    /// The wire shape: one entry per key the patch actually sets.
    pub fn fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        }
    }
}

impl GameDocument {
    /// Applies a patch to local state: every key the patch sets replaces the
    /// matching top-level key, everything else is untouched.
    pub fn apply_patch(&mut self, patch: &DocumentPatch) {
        if let Some(schema_version) = &patch.schema_version {
            self.schema_version = schema_version.clone();
        }
        if let Some(players) = &patch.players {
            self.players = players.clone();
        }
        if let Some(mysteries) = &patch.mysteries {
            self.mysteries = mysteries.clone();
        }
        if let Some(safety) = &patch.safety {
            self.safety = safety.clone();
        }
        if let Some(scene) = &patch.scene {
            self.scene = Some(scene.clone());
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}
