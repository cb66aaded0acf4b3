//! Group reducers, applied to group items via `set_group_field`.
//!
//! Each reducer reads the [`GROUPED_ITEMS`] field that the grouping
//! operators attach, so staging one outside a grouped chain is a build
//! error long before it could fail here.

use async_trait::async_trait;

use crate::errors::ItemError;
use crate::item::{Field, FromValue, Item, Value, GROUPED_ITEMS};

use super::ItemFunction;

/// Number of items in the group.
pub struct Count;

pub fn count() -> Count {
    Count
}

#[async_trait]
impl ItemFunction for Count {
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        let members = GROUPED_ITEMS.get(item)?;
        Ok(Value::Int(members.len() as i64))
    }

    fn name(&self) -> &'static str {
        "count"
    }
}

/// Largest value of a field across the group's members.
///
/// Members missing the field (or holding an incomparable value) are skipped;
/// a group where no member carries it is a per-item error.
pub struct MaxOf<T> {
    field: Field<T>,
}

pub fn max_of<T>(field: Field<T>) -> MaxOf<T> {
    MaxOf { field }
}

#[async_trait]
impl<T> ItemFunction for MaxOf<T>
where
    T: FromValue + PartialOrd + Into<Value> + Send + Sync,
{
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        fold_group(item, self.field, self.name(), |best, next| next > best)
    }

    fn name(&self) -> &'static str {
        "max_of"
    }
}

/// Smallest value of a field across the group's members.
pub struct MinOf<T> {
    field: Field<T>,
}

pub fn min_of<T>(field: Field<T>) -> MinOf<T> {
    MinOf { field }
}

#[async_trait]
impl<T> ItemFunction for MinOf<T>
where
    T: FromValue + PartialOrd + Into<Value> + Send + Sync,
{
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        fold_group(item, self.field, self.name(), |best, next| next < best)
    }

    fn name(&self) -> &'static str {
        "min_of"
    }
}

fn fold_group<T>(
    item: &Item,
    field: Field<T>,
    reducer: &'static str,
    replace: impl Fn(&T, &T) -> bool,
) -> Result<Value, ItemError>
where
    T: FromValue + PartialOrd + Into<Value>,
{
    let members = GROUPED_ITEMS.get(item)?;
    let mut best: Option<T> = None;
    for member in &members {
        if let Ok(candidate) = field.get(member) {
            match &best {
                Some(current) if !replace(current, &candidate) => {}
                _ => best = Some(candidate),
            }
        }
    }
    best.map(Into::into).ok_or_else(|| {
        ItemError::function(
            reducer,
            format!("no item in the group carries field '{}'", field.name()),
        )
    })
}
