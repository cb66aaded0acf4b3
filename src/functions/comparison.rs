//! Field comparison predicates for `filter`.

use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ItemError;
use crate::item::{now_millis, Field, FromValue, Item, Value};

use super::ItemFunction;

#[derive(Debug, Clone, Copy)]
enum CmpOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

/// Compares a typed field against a fixed right-hand side.
pub struct FieldCompare<T> {
    field: Field<T>,
    op: CmpOp,
    rhs: T,
}

#[async_trait]
impl<T> ItemFunction for FieldCompare<T>
where
    T: FromValue + PartialOrd + Send + Sync,
{
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        let lhs = self.field.get(item)?;
        let pass = match self.op {
            CmpOp::Gt => lhs > self.rhs,
            CmpOp::Gte => lhs >= self.rhs,
            CmpOp::Lt => lhs < self.rhs,
            CmpOp::Lte => lhs <= self.rhs,
            CmpOp::Eq => lhs == self.rhs,
        };
        Ok(Value::Bool(pass))
    }

    fn name(&self) -> &'static str {
        "compare"
    }
}

pub fn gt<T>(field: Field<T>, rhs: T) -> FieldCompare<T> {
    FieldCompare {
        field,
        op: CmpOp::Gt,
        rhs,
    }
}

pub fn gte<T>(field: Field<T>, rhs: T) -> FieldCompare<T> {
    FieldCompare {
        field,
        op: CmpOp::Gte,
        rhs,
    }
}

pub fn lt<T>(field: Field<T>, rhs: T) -> FieldCompare<T> {
    FieldCompare {
        field,
        op: CmpOp::Lt,
        rhs,
    }
}

pub fn lte<T>(field: Field<T>, rhs: T) -> FieldCompare<T> {
    FieldCompare {
        field,
        op: CmpOp::Lte,
        rhs,
    }
}

pub fn eq<T>(field: Field<T>, rhs: T) -> FieldCompare<T> {
    FieldCompare {
        field,
        op: CmpOp::Eq,
        rhs,
    }
}

/// Passes items whose epoch-millisecond timestamp field falls within the
/// trailing window.
pub struct Recent {
    field: Field<i64>,
    window: Duration,
}

pub fn recent(field: Field<i64>, window: Duration) -> Recent {
    Recent { field, window }
}

#[async_trait]
impl ItemFunction for Recent {
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        let stamp = self.field.get(item)?;
        let age = now_millis().saturating_sub(stamp);
        Ok(Value::Bool(age <= self.window.as_millis() as i64))
    }

    fn name(&self) -> &'static str {
        "recent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::TIME_CREATED;

    const X: Field<i64> = Field::new("x");

    #[tokio::test]
    async fn compares_against_fixed_value() {
        let item = Item::new().with_field("x", 6);
        assert_eq!(gt(X, 5).apply(&item).await.unwrap(), Value::Bool(true));
        assert_eq!(lte(X, 5).apply(&item).await.unwrap(), Value::Bool(false));
        assert_eq!(eq(X, 6).apply(&item).await.unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn missing_field_is_a_per_item_error() {
        let item = Item::new();
        assert!(gt(X, 5).apply(&item).await.is_err());
    }

    #[tokio::test]
    async fn fresh_items_are_recent() {
        let item = Item::new();
        let pred = recent(TIME_CREATED, Duration::from_secs(60));
        assert_eq!(pred.apply(&item).await.unwrap(), Value::Bool(true));
    }

    #[tokio::test]
    async fn stale_items_are_not_recent() {
        let item = Item::new().with_field(TIME_CREATED.name(), 0i64);
        let pred = recent(TIME_CREATED, Duration::from_secs(60));
        assert_eq!(pred.apply(&item).await.unwrap(), Value::Bool(false));
    }
}
