//! Prompt state assembled before each model call

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Values substituted into prompt templates
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct State {
    /// String values (template substitution)
    pub values: HashMap<String, String>,

    /// Structured data (lists, nested objects)
    pub data: HashMap<String, serde_json::Value>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string value
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style [`State::set_value`]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_value(key, value);
        self
    }

    /// Get a string value
    pub fn get_value(&self, key: &str) -> Option<&String> {
        self.values.get(key)
    }

    /// Set structured data
    pub fn set_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Merge another state into this one; `other` wins on conflicts
    pub fn merge(&mut self, other: State) {
        self.values.extend(other.values);
        self.data.extend(other.data);
    }

    /// Flatten into the map handed to the template engine
    pub fn to_template_data(&self) -> HashMap<String, serde_json::Value> {
        let mut data: HashMap<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        for (key, value) in &self.data {
            data.insert(key.clone(), value.clone());
        }
        data
    }
}
