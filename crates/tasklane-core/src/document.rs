//! The persisted application state as the engine sees it.
//!
//! The engine only interprets `version`. Everything else lives in an opaque
//! field bag that is flattened into the top-level JSON object on the way
//! out and collected back on the way in, so fields no migration knows about
//! survive a round trip unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A versioned, otherwise opaque, application document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedDocument {
    pub version: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl VersionedDocument {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    /// Insert `value` only when `name` is not already present.
    pub fn insert_if_absent(&mut self, name: &str, value: Value) {
        self.fields.entry(name.to_string()).or_insert(value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Serialize to compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if a field value cannot be represented as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a document from JSON text. A missing `version` is rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON object with a string
    /// `version` field.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Size in bytes of the compact JSON serialization.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be serialized.
    pub fn serialized_len(&self) -> serde_json::Result<u64> {
        self.to_json().map(|s| s.len() as u64)
    }
}
