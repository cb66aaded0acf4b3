//! The pipeline: lazy, declarative composition over live sources.
//!
//! A [`Stream`] is an immutable description: a source factory, a purpose,
//! and an ordered chain of staged operators. Build methods register stages
//! and return a new handle; they never touch the data source. Only a
//! terminal call (awaited `count`/`collect`, or the callback-registering
//! `for_each`/`if_present` family) makes anything run.
//!
//! Within one branch, item arrival order is preserved end to end. Chain
//! position is authoritative for `limit`: it counts the items reaching its
//! own stage, so a limit staged after a filter counts post-filter items.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::context::ContextInner;
use crate::errors::{BuildError, PipelineError};
use crate::functions::collectors::StreamCollector;
use crate::functions::items::Selector;
use crate::functions::{item_ops, Callback, ItemFunction, ItemTransform, ValueProvider};
use crate::item::{Field, FromValue, Item};
use crate::purpose::Purpose;
use crate::source::SourceFactory;

mod compound;
pub(crate) mod execution;
mod grouping;
pub mod multicast;
mod operator;

#[cfg(test)]
mod integration_tests;

pub use compound::{CompoundQuery, ValueGenerator};
pub use multicast::SharedStream;

use execution::StreamEvent;
use grouping::{GroupByFactory, LocalGroupByFactory, SelectFactory};
use multicast::ReplayEvent;
use operator::{
    DebugFactory, FilterFactory, IndependentFieldFactory, LimitFactory, MapFactory, StageFactory,
};

/// Where a pipeline's items come from: a live source, or a claimed branch of
/// a multicast point replaying the shared sequence.
#[derive(Clone)]
pub(crate) enum StreamInput {
    Source(Arc<dyn SourceFactory>),
    Replay(Arc<StdMutex<Option<mpsc::UnboundedReceiver<ReplayEvent>>>>),
}

impl StreamInput {
    pub(crate) fn label(&self) -> &str {
        match self {
            StreamInput::Source(factory) => factory.name(),
            StreamInput::Replay(_) => "branch",
        }
    }
}

/// An unexecuted pipeline description.
#[derive(Clone)]
pub struct Stream {
    pub(crate) ctx: Arc<ContextInner>,
    pub(crate) input: StreamInput,
    pub(crate) purpose: Purpose,
    pub(crate) stages: Vec<Arc<dyn StageFactory>>,
    pub(crate) deadline: Option<Duration>,
    grouped: bool,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("source", &self.input.label())
            .field("purpose", &self.purpose)
            .field("stage_count", &self.stages.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Stream {
    pub(crate) fn new(
        ctx: Arc<ContextInner>,
        source: Arc<dyn SourceFactory>,
        purpose: Purpose,
    ) -> Self {
        Self {
            ctx,
            input: StreamInput::Source(source),
            purpose,
            stages: Vec::new(),
            deadline: None,
            grouped: false,
        }
    }

    pub(crate) fn from_replay(
        ctx: Arc<ContextInner>,
        purpose: Purpose,
        rx: mpsc::UnboundedReceiver<ReplayEvent>,
    ) -> Self {
        Self {
            ctx,
            input: StreamInput::Replay(Arc::new(StdMutex::new(Some(rx)))),
            purpose,
            stages: Vec::new(),
            deadline: None,
            grouped: false,
        }
    }

    fn stage(mut self, factory: impl StageFactory + 'static) -> Self {
        self.stages.push(Arc::new(factory));
        self
    }

    /// The pipeline's purpose: readable anywhere, changeable nowhere.
    pub fn purpose(&self) -> &Purpose {
        &self.purpose
    }

    // -- build-time operators ----------------------------------------------

    /// Pass at most `n` items through this point, then signal upstream
    /// completion. For a non-multicast pipeline this also stops the source.
    pub fn limit(self, n: u64) -> Self {
        self.stage(LimitFactory { limit: n })
    }

    /// Arm a watchdog for the whole execution. If the terminal condition is
    /// not reached within `after`, the execution is cancelled and the
    /// terminal reports a timeout instead of hanging.
    pub fn timeout(mut self, after: Duration) -> Self {
        self.deadline = Some(after);
        self
    }

    /// Drop items failing the predicate. A predicate error skips that one
    /// item onto the failure path.
    pub fn filter(self, predicate: impl ItemFunction + 'static) -> Self {
        self.stage(FilterFactory {
            predicate: Arc::new(predicate),
        })
    }

    /// Derive a new item from each input item.
    pub fn map(self, transform: impl ItemTransform + 'static) -> Self {
        self.stage(MapFactory {
            transform: Arc::new(transform),
        })
    }

    /// Attach a field derived from each item's existing fields.
    pub fn set_field(self, name: impl Into<String>, function: impl ItemFunction + 'static) -> Self {
        self.map(item_ops::set_field(name, function))
    }

    /// Attach a field whose value is computed once per execution, not once
    /// per item, and shared by every item passing this stage.
    pub fn set_independent_field(
        self,
        name: impl Into<String>,
        provider: impl ValueProvider + 'static,
    ) -> Self {
        let name = name.into();
        self.stage(IndependentFieldFactory {
            name,
            provider: Arc::new(provider),
        })
    }

    /// Bucket all items by a key field until the (bounded) upstream
    /// completes, then emit one group item per key.
    pub fn group_by(mut self, key: impl Into<String>) -> Self {
        self.grouped = true;
        self.stage(GroupByFactory { key: key.into() })
    }

    /// Incremental grouping: a key change emits the open group downstream;
    /// completion or cancellation flushes the final one. Works on infinite
    /// streams.
    pub fn local_group_by(mut self, key: impl Into<String>) -> Self {
        self.grouped = true;
        self.stage(LocalGroupByFactory { key: key.into() })
    }

    /// Attach a reduced field to each group item. Only valid after a
    /// grouping stage.
    pub fn set_group_field(
        self,
        name: impl Into<String>,
        function: impl ItemFunction + 'static,
    ) -> Result<Self, BuildError> {
        if !self.grouped {
            return Err(BuildError::NotGrouped {
                operation: "set_group_field",
            });
        }
        Ok(self.set_field(name, function))
    }

    /// Reduce the whole grouped stream to at most one item at completion.
    pub fn select(self, selector: impl Selector + 'static) -> Result<Self, BuildError> {
        if !self.grouped {
            return Err(BuildError::NotGrouped {
                operation: "select",
            });
        }
        Ok(self.stage(SelectFactory {
            selector: Arc::new(selector),
        }))
    }

    /// Forward each passing item, serialized, to the debug broadcast sink.
    pub fn debug_print(self) -> Self {
        self.stage(DebugFactory { tag: None })
    }

    /// Like [`Stream::debug_print`], with a tag identifying this stage in
    /// the broadcast.
    pub fn log_as(self, tag: impl Into<String>) -> Self {
        self.stage(DebugFactory {
            tag: Some(tag.into()),
        })
    }

    /// Turn this pipeline into a multicast point with exactly `branches`
    /// independent downstream branches. The upstream starts executing once,
    /// immediately; see [`SharedStream`].
    pub fn reuse(self, branches: usize) -> Result<SharedStream, BuildError> {
        multicast::share(self, branches)
    }

    /// A provider that re-executes this pipeline to completion per
    /// evaluation and folds the results with `collector`.
    pub fn compound(self, collector: impl StreamCollector + 'static) -> CompoundQuery {
        compound::compound(self, Arc::new(collector))
    }

    /// Start this pipeline now and keep it running; the returned generator
    /// snapshots the latest folded value without blocking.
    pub fn value_generator(self, collector: impl StreamCollector + 'static) -> ValueGenerator {
        compound::generator(self, Arc::new(collector))
    }

    // -- terminals ---------------------------------------------------------

    /// Execute and count delivered items. Blocks (awaits) until the source
    /// completes, a limit is reached, or the execution is cancelled or
    /// timed out.
    pub async fn count(self) -> Result<u64, PipelineError> {
        let mut run = execution::launch(self);
        let mut seen: u64 = 0;
        while let Some(event) = run.events.recv().await {
            match event {
                StreamEvent::Item(_) => seen += 1,
                StreamEvent::Skip(_) => {}
                StreamEvent::Failed(error) => return Err(error),
                StreamEvent::Completed => break,
            }
        }
        Ok(seen)
    }

    /// Execute and collect every delivered item, in arrival order.
    pub async fn collect(self) -> Result<Vec<Item>, PipelineError> {
        let mut run = execution::launch(self);
        let mut items = Vec::new();
        while let Some(event) = run.events.recv().await {
            match event {
                StreamEvent::Item(item) => items.push(item),
                StreamEvent::Skip(_) => {}
                StreamEvent::Failed(error) => return Err(error),
                StreamEvent::Completed => break,
            }
        }
        Ok(items)
    }

    /// Register a callback for one field of every delivered item and return
    /// immediately. Items missing the field hit the failure entry point;
    /// sibling items keep flowing. Delivery happens on an engine task.
    pub fn for_each<T, C>(self, field: Field<T>, mut callback: C) -> JoinHandle<()>
    where
        T: FromValue + Send + 'static,
        C: Callback<T> + 'static,
    {
        let mut run = execution::launch(self);
        tokio::spawn(async move {
            while let Some(event) = run.events.recv().await {
                match event {
                    StreamEvent::Item(item) => match field.get(&item) {
                        Ok(value) => callback.on_input(value),
                        Err(error) => callback.on_fail(PipelineError::Item(error)),
                    },
                    StreamEvent::Skip(error) => callback.on_fail(PipelineError::Item(error)),
                    StreamEvent::Failed(error) => {
                        callback.on_fail(error);
                        break;
                    }
                    StreamEvent::Completed => break,
                }
            }
        })
    }

    /// Register a callback for every delivered item and return immediately.
    pub fn for_each_item<C>(self, mut callback: C) -> JoinHandle<()>
    where
        C: Callback<Item> + 'static,
    {
        let mut run = execution::launch(self);
        tokio::spawn(async move {
            while let Some(event) = run.events.recv().await {
                match event {
                    StreamEvent::Item(item) => callback.on_input(item),
                    StreamEvent::Skip(error) => callback.on_fail(PipelineError::Item(error)),
                    StreamEvent::Failed(error) => {
                        callback.on_fail(error);
                        break;
                    }
                    StreamEvent::Completed => break,
                }
            }
        })
    }

    /// Like [`Stream::for_each`], and additionally reports through the
    /// failure entry point when the pipeline completes without having
    /// delivered anything at all: the "absent result" of an empty
    /// selection.
    pub fn if_present<T, C>(self, field: Field<T>, mut callback: C) -> JoinHandle<()>
    where
        T: FromValue + Send + 'static,
        C: Callback<T> + 'static,
    {
        let mut run = execution::launch(self);
        tokio::spawn(async move {
            let mut reported = false;
            while let Some(event) = run.events.recv().await {
                match event {
                    StreamEvent::Item(item) => {
                        reported = true;
                        match field.get(&item) {
                            Ok(value) => callback.on_input(value),
                            Err(error) => callback.on_fail(PipelineError::Item(error)),
                        }
                    }
                    StreamEvent::Skip(error) => {
                        reported = true;
                        callback.on_fail(PipelineError::Item(error));
                    }
                    StreamEvent::Failed(error) => {
                        callback.on_fail(error);
                        return;
                    }
                    StreamEvent::Completed => break,
                }
            }
            if !reported {
                callback.on_fail(PipelineError::NoResult);
            }
        })
    }
}
