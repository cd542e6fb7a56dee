//! Per-run platform context handed to workers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Extra context supplied by the platform trigger that started a run
/// (e.g. which content change or network triggered it).
///
/// Opaque to the runner; it is passed through to the worker untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeExtras {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggered_content: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, serde_json::Value>,
}

impl RuntimeExtras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_triggered_content(mut self, uri: impl Into<String>) -> Self {
        self.triggered_content.push(uri.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_extras_serialize_to_empty_object() {
        let s = serde_json::to_string(&RuntimeExtras::new()).unwrap();
        assert_eq!(s, "{}");
    }

    #[test]
    fn builder_fills_fields() {
        let extras = RuntimeExtras::new()
            .with_triggered_content("content://photos/1")
            .with_network("wifi")
            .with_value("battery", 80);
        assert_eq!(extras.triggered_content, vec!["content://photos/1"]);
        assert_eq!(extras.network.as_deref(), Some("wifi"));
        assert_eq!(extras.values["battery"], 80);
    }
}
