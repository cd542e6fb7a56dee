//! Key-typed payload blobs.

use std::collections::BTreeMap;
use std::collections::btree_map;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Input or output payload of a work record.
///
/// Keys are strings, values are arbitrary JSON. Keys iterate in sorted order
/// so that equal blobs always serialize identically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Data(BTreeMap<String, serde_json::Value>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Decode a single value; `None` if missing or of the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, serde_json::Value> {
        self.0.iter()
    }

    pub(crate) fn entry(&mut self, key: String) -> btree_map::Entry<'_, String, serde_json::Value> {
        self.0.entry(key)
    }

    /// View the blob as a JSON object (used to decode typed inputs).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(self.0.clone().into_iter().collect())
    }

    /// Build a blob from a JSON value; anything but an object is rejected.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self(map.into_iter().collect())),
            _ => None,
        }
    }
}

impl FromIterator<(String, serde_json::Value)> for Data {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Data {
    type Item = (String, serde_json::Value);
    type IntoIter = btree_map::IntoIter<String, serde_json::Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
