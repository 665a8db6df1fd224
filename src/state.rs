use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Mutable key/value bag accumulated across one pipeline run.
/// Keys written by an earlier step stay visible (and overwritable) for every
/// later step; nothing is ever implicitly deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineState(Map<String, Value>);

impl PipelineState {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
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

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Shallow merge: every key in `data` is written into the bag, overwriting
    /// existing keys.
    pub fn merge(&mut self, data: Map<String, Value>) {
        for (key, value) in data {
            self.0.insert(key, value);
        }
    }

    /// Merge a fan-out branch's output under its own key, so concurrent
    /// branches can never clobber each other's fields.
    pub fn merge_namespaced(&mut self, branch: &str, data: Map<String, Value>) {
        self.0.insert(branch.to_string(), Value::Object(data));
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for PipelineState {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
