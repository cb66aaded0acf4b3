//! Whole-item operators for `map`.

use async_trait::async_trait;

use crate::errors::ItemError;
use crate::item::{Item, Value};

use super::{ItemFunction, ItemTransform};

/// Transform that attaches one derived field to every passing item.
pub struct SetField<F> {
    name: String,
    function: F,
}

pub fn set_field<F: ItemFunction>(name: impl Into<String>, function: F) -> SetField<F> {
    SetField {
        name: name.into(),
        function,
    }
}

#[async_trait]
impl<F: ItemFunction> ItemTransform for SetField<F> {
    async fn transform(&self, item: Item) -> Result<Item, ItemError> {
        let value = self.function.apply(&item).await?;
        Ok(item.with_field(self.name.clone(), value))
    }
}

/// Function that reads one field's raw value off the item.
pub struct GetField {
    name: String,
}

pub fn get_field(name: impl Into<String>) -> GetField {
    GetField { name: name.into() }
}

#[async_trait]
impl ItemFunction for GetField {
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        item.get_value(&self.name)
            .cloned()
            .ok_or_else(|| ItemError::missing_field(&self.name))
    }

    fn name(&self) -> &'static str {
        "get_field"
    }
}
