//! The record model: keyed, value-like data units flowing through pipelines.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::errors::ItemError;

mod field;
mod value;

pub use field::Field;
pub use value::{FromValue, Value};

/// Implicit creation-time field, epoch milliseconds. Stamped on every item.
pub const TIME_CREATED: Field<i64> = Field::new("time_created");

/// A keyed record flowing through a pipeline.
///
/// Items are value-like: operators derive new items (or rework an item they
/// own within a branch's private step) rather than mutating shared state.
/// Field order is deterministic, so two items with equal fields serialize
/// identically.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

impl Item {
    /// Fresh item carrying only its creation timestamp.
    pub fn new() -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TIME_CREATED.name().to_string(), Value::Int(now_millis()));
        Self { fields }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Typed read through a [`Field`] accessor.
    pub fn get<T: FromValue>(&self, field: Field<T>) -> Result<T, ItemError> {
        field.get(self)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// JSON rendering used by the debug broadcast sink.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for Item {
    fn default() -> Self {
        Self::new()
    }
}

/// Field on group items emitted by the grouping operators; holds the member
/// items of the group.
pub const GROUPED_ITEMS: Field<Vec<Item>> = Field::new("grouped_items");

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
