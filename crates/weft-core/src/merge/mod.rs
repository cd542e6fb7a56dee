//! Input mergers: combine a record's own input with its prerequisites' outputs.
//!
//! The first element of `inputs` is always the record's own input, followed by
//! the outputs of its finished prerequisites in a stable but unspecified
//! order. Strategies must be pure.

use std::collections::HashMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{Data, MergeError, RegistryError};

pub const OVERWRITING: &str = "overwriting";
pub const ARRAY_CREATING: &str = "array_creating";
pub const REJECTING: &str = "rejecting";

pub trait InputMerger: Send + Sync {
    fn merge(&self, inputs: &[Data]) -> Result<Data, MergeError>;
}

/// Later keys overwrite earlier ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwritingInputMerger;

impl InputMerger for OverwritingInputMerger {
    fn merge(&self, inputs: &[Data]) -> Result<Data, MergeError> {
        Ok(inputs
            .iter()
            .flat_map(|data| data.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect())
    }
}

/// Keys seen more than once are collected into a JSON array.
///
/// Arrays are concatenated, scalars appended. A key seen once keeps its value
/// as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayCreatingInputMerger;

impl InputMerger for ArrayCreatingInputMerger {
    fn merge(&self, inputs: &[Data]) -> Result<Data, MergeError> {
        let mut merged = Data::new();
        for data in inputs {
            for (key, value) in data.iter() {
                match merged.entry(key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(value.clone());
                    }
                    Entry::Occupied(mut slot) => {
                        let existing = slot.get_mut();
                        let mut items = match existing.take() {
                            Value::Array(items) => items,
                            other => vec![other],
                        };
                        match value {
                            Value::Array(more) => items.extend(more.iter().cloned()),
                            other => items.push(other.clone()),
                        }
                        *existing = Value::Array(items);
                    }
                }
            }
        }
        Ok(merged)
    }
}

/// Fails on a key carrying two different values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingInputMerger;

impl InputMerger for RejectingInputMerger {
    fn merge(&self, inputs: &[Data]) -> Result<Data, MergeError> {
        let mut merged = Data::new();
        for data in inputs {
            for (key, value) in data.iter() {
                match merged.entry(key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(value.clone());
                    }
                    Entry::Occupied(slot) if slot.get() == value => {}
                    Entry::Occupied(_) => {
                        return Err(MergeError::Conflict { key: key.clone() });
                    }
                }
            }
        }
        Ok(merged)
    }
}

/// Name -> merger strategy.
#[derive(Clone, Default)]
pub struct MergerRegistry {
    mergers: HashMap<String, Arc<dyn InputMerger>>,
}

impl MergerRegistry {
    /// Empty registry; nothing resolves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in strategies.
    pub fn with_defaults() -> Self {
        let mut mergers: HashMap<String, Arc<dyn InputMerger>> = HashMap::new();
        mergers.insert(OVERWRITING.to_string(), Arc::new(OverwritingInputMerger));
        mergers.insert(ARRAY_CREATING.to_string(), Arc::new(ArrayCreatingInputMerger));
        mergers.insert(REJECTING.to_string(), Arc::new(RejectingInputMerger));
        Self { mergers }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        merger: impl InputMerger + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.mergers.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.mergers.insert(name, Arc::new(merger));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn InputMerger>, MergeError> {
        self.mergers
            .get(name)
            .cloned()
            .ok_or_else(|| MergeError::UnresolvableMerger(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.mergers.keys().cloned().collect();
        names.sort();
        names
    }
}
