//! Function and callback abstractions, plus the built-in operator library.
//!
//! Pipelines are composed from small, pure, per-item functions. Three shapes
//! cover every staged computation:
//!
//! * [`ItemFunction`]: derive a [`Value`] from an item (filters, field
//!   derivations, group reducers)
//! * [`ItemTransform`]: derive a whole new item from an item (`map`)
//! * [`ValueProvider`]: produce a value with no input item
//!   (`set_independent_field`, compound sub-queries, value generators)
//!
//! Plain closures implement the first two, so call sites only reach for the
//! library modules (`comparison`, `arithmetic`, `statistics`, ...) when they
//! want a named, reusable operator.

use async_trait::async_trait;

use crate::errors::{ItemError, PipelineError};
use crate::item::{Item, Value};

pub mod arithmetic;
pub mod collectors;
pub mod comparison;
pub mod item_ops;
pub mod items;
pub mod statistics;
pub mod storage;

/// Pure per-item computation producing a single value.
#[async_trait]
pub trait ItemFunction: Send + Sync {
    async fn apply(&self, item: &Item) -> Result<Value, ItemError>;

    /// Stable name used in per-item failure reports.
    fn name(&self) -> &'static str {
        "fn"
    }
}

#[async_trait]
impl<F> ItemFunction for F
where
    F: Fn(&Item) -> Result<Value, ItemError> + Send + Sync,
{
    async fn apply(&self, item: &Item) -> Result<Value, ItemError> {
        (self)(item)
    }
}

/// Pure whole-item derivation used by `map`.
#[async_trait]
pub trait ItemTransform: Send + Sync {
    async fn transform(&self, item: Item) -> Result<Item, ItemError>;
}

#[async_trait]
impl<F> ItemTransform for F
where
    F: Fn(Item) -> Result<Item, ItemError> + Send + Sync,
{
    async fn transform(&self, item: Item) -> Result<Item, ItemError> {
        (self)(item)
    }
}

/// Computation that needs no input item.
///
/// `set_independent_field` evaluates one of these exactly once per pipeline
/// execution; compound sub-queries and value generators implement it too.
#[async_trait]
pub trait ValueProvider: Send + Sync {
    async fn provide(&self) -> Result<Value, ItemError>;
}

#[async_trait]
impl<F> ValueProvider for F
where
    F: Fn() -> Result<Value, ItemError> + Send + Sync,
{
    async fn provide(&self) -> Result<Value, ItemError> {
        (self)()
    }
}

/// Consumer sink with separate value and failure entry points.
///
/// Both entry points run on an engine delivery task, not the thread that
/// registered the callback. Per-item failures arrive as
/// [`PipelineError::Item`]; a pipeline-fatal failure arrives exactly once.
pub trait Callback<T>: Send {
    fn on_input(&mut self, input: T);

    fn on_fail(&mut self, error: PipelineError) {
        tracing::warn!(error = %error, "callback received a failure");
    }
}

impl<T, F> Callback<T> for F
where
    F: FnMut(T) + Send,
{
    fn on_input(&mut self, input: T) {
        self(input)
    }
}

/// Callback built from two closures, one per entry point.
pub struct FnCallback<I, E> {
    on_input: I,
    on_fail: E,
}

/// Build a [`Callback`] with explicit handling for both entry points.
pub fn callback<T, I, E>(on_input: I, on_fail: E) -> FnCallback<I, E>
where
    I: FnMut(T) + Send,
    E: FnMut(PipelineError) + Send,
{
    FnCallback { on_input, on_fail }
}

impl<T, I, E> Callback<T> for FnCallback<I, E>
where
    I: FnMut(T) + Send,
    E: FnMut(PipelineError) + Send,
{
    fn on_input(&mut self, input: T) {
        (self.on_input)(input)
    }

    fn on_fail(&mut self, error: PipelineError) {
        (self.on_fail)(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closures_are_item_functions() {
        let double = |item: &Item| -> Result<Value, ItemError> {
            let x = item.get_value("x").and_then(Value::as_int).unwrap_or(0);
            Ok(Value::Int(x * 2))
        };
        let item = Item::new().with_field("x", 21);
        assert_eq!(double.apply(&item).await.unwrap(), Value::Int(42));
    }

    #[test]
    fn fn_callback_routes_both_entry_points() {
        let mut seen = Vec::new();
        let mut failures = 0usize;
        {
            let mut cb = callback(
                |v: i64| seen.push(v),
                |_err| failures += 1,
            );
            cb.on_input(1);
            cb.on_fail(PipelineError::NoResult);
            cb.on_input(2);
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(failures, 1);
    }
}
