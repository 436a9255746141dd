//! The shared intermediate-results store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key holding the upstream extraction seed.
pub const EXTRACTED_DATA_KEY: &str = "extracted_data";
/// Key holding the planner's latest reasoning.
pub const PLANNER_REASONING_KEY: &str = "planner_reasoning";
/// Key holding the repair strategy's latest reasoning.
pub const REPAIR_REASONING_KEY: &str = "repair_reasoning";

/// Raw tool outputs keyed by `{tool}_{step}_output|error`, plus notes.
///
/// Entries are only overwritten when the same step is reprocessed. The
/// verifier reads nothing but this map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingSet {
    #[serde(default)]
    entries: BTreeMap<String, Value>,
    #[serde(default)]
    notes: BTreeMap<String, String>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the working set with the extraction collaborator's data.
    pub fn seeded(extracted_data: Value) -> Self {
        let mut ws = Self::new();
        if !extracted_data.is_null() {
            ws.insert(EXTRACTED_DATA_KEY, extracted_data);
        }
        ws
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Successful outputs of the given tool, in key order.
    ///
    /// Keys are matched on the `{tool}_` prefix and `_output` suffix, the
    /// same layout the executor writes.
    pub fn outputs_for<'a>(&'a self, tool_name: &'a str) -> impl Iterator<Item = (&'a str, &'a Value)> {
        let prefix = format!("{}_", tool_name);
        self.entries
            .iter()
            .filter(move |(key, _)| key.starts_with(&prefix) && key.ends_with("_output"))
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Step id embedded in an output key for the given tool.
    pub fn step_id_from_key<'a>(tool_name: &str, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(tool_name)?
            .strip_prefix('_')?
            .strip_suffix("_output")
    }

    /// Record narrative metadata such as planner or repair reasoning.
    pub fn note(&mut self, key: &str, text: impl Into<String>) {
        self.notes.insert(key.to_string(), text.into());
    }

    pub fn get_note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }
}
