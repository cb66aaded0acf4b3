//! Nested sub-query evaluation.
//!
//! A [`CompoundQuery`] re-executes an inner pipeline description to
//! completion every time it is evaluated; a [`ValueGenerator`] keeps one
//! inner execution running and snapshots its latest folded value without
//! blocking. Both surface inner failures as recoverable per-field errors on
//! the outer item, never as a fatal failure of the outer pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::errors::ItemError;
use crate::functions::collectors::StreamCollector;
use crate::functions::{ItemFunction, ValueProvider};
use crate::item::{Item, Value};

use super::execution::{self, StreamEvent};
use super::Stream;

/// Runs the inner pipeline to completion per evaluation and returns the
/// collector's folded value.
pub struct CompoundQuery {
    inner: Stream,
    collector: Arc<dyn StreamCollector>,
}

pub(crate) fn compound(inner: Stream, collector: Arc<dyn StreamCollector>) -> CompoundQuery {
    CompoundQuery { inner, collector }
}

impl CompoundQuery {
    async fn evaluate(&self) -> Result<Value, ItemError> {
        let mut run = execution::launch(self.inner.clone());
        let mut state = self.collector.start();
        while let Some(event) = run.events.recv().await {
            match event {
                StreamEvent::Item(item) => state.add(&item),
                StreamEvent::Skip(_) => {}
                StreamEvent::Failed(error) => {
                    return Err(ItemError::sub_query(error.to_string()))
                }
                StreamEvent::Completed => break,
            }
        }
        Ok(state.value())
    }
}

#[async_trait]
impl ValueProvider for CompoundQuery {
    async fn provide(&self) -> Result<Value, ItemError> {
        self.evaluate().await
    }
}

#[async_trait]
impl ItemFunction for CompoundQuery {
    async fn apply(&self, _item: &Item) -> Result<Value, ItemError> {
        self.evaluate().await
    }

    fn name(&self) -> &'static str {
        "compound"
    }
}

enum Snapshot {
    Pending,
    Ready(Value),
    Failed(String),
}

/// Continuously running inner pipeline whose latest folded value can be
/// snapshotted without blocking.
///
/// The inner execution is registered with the context's registry, so
/// `stop_all` stops it like any other pipeline.
pub struct ValueGenerator {
    latest: watch::Receiver<Snapshot>,
}

pub(crate) fn generator(inner: Stream, collector: Arc<dyn StreamCollector>) -> ValueGenerator {
    let (tx, rx) = watch::channel(Snapshot::Pending);
    let mut run = execution::launch(inner);
    tokio::spawn(async move {
        let mut state = collector.start();
        while let Some(event) = run.events.recv().await {
            match event {
                StreamEvent::Item(item) => {
                    state.add(&item);
                    if tx.send(Snapshot::Ready(state.value())).is_err() {
                        // Nobody holds the generator any more.
                        run.cancel.cancel();
                        break;
                    }
                }
                StreamEvent::Skip(_) => {}
                StreamEvent::Failed(error) => {
                    let _ = tx.send(Snapshot::Failed(error.to_string()));
                    break;
                }
                StreamEvent::Completed => break,
            }
        }
    });
    ValueGenerator { latest: rx }
}

#[async_trait]
impl ValueProvider for ValueGenerator {
    async fn provide(&self) -> Result<Value, ItemError> {
        let snapshot = self.latest.borrow();
        match &*snapshot {
            Snapshot::Pending => Err(ItemError::sub_query("no value produced yet")),
            Snapshot::Ready(value) => Ok(value.clone()),
            Snapshot::Failed(message) => Err(ItemError::sub_query(message.clone())),
        }
    }
}

#[async_trait]
impl ItemFunction for ValueGenerator {
    async fn apply(&self, _item: &Item) -> Result<Value, ItemError> {
        self.provide().await
    }

    fn name(&self) -> &'static str {
        "value_generator"
    }
}
