//! Arithmetic field derivations.

use async_trait::async_trait;

use crate::errors::ItemError;
use crate::item::{Field, Item, Value};

use super::ItemFunction;

/// Rounds an integer field up to the next multiple of `step`.
///
/// Typical use: bucketing `time_created` into fixed windows before
/// `local_group_by`.
pub struct RoundUp {
    field: Field<i64>,
    step: i64,
}

pub fn round_up(field: Field<i64>, step: i64) -> RoundUp {
    RoundUp { field, step }
}

#[async_trait]
impl ItemFunction for RoundUp {
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        if self.step <= 0 {
            return Err(ItemError::function(
                self.name(),
                format!("step must be positive, got {}", self.step),
            ));
        }
        let value = self.field.get(item)?;
        Ok(Value::Int(value.div_euclid(self.step) * self.step
            + if value.rem_euclid(self.step) == 0 {
                0
            } else {
                self.step
            }))
    }

    fn name(&self) -> &'static str {
        "round_up"
    }
}
