//! Operator stages: the per-execution state behind each build-time method.
//!
//! Building a pipeline collects [`StageFactory`] descriptions; nothing runs.
//! At execution start the engine instantiates each factory into a fresh
//! [`Operator`], so a description can be executed any number of times
//! (compound sub-queries rely on this).
//!
//! Per-item failures returned from an operator drop that one item onto the
//! failure path; they never close the stage or the pipeline.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ContextInner;
use crate::errors::{ItemError, PipelineError};
use crate::functions::{ItemFunction, ItemTransform, ValueProvider};
use crate::item::{Item, Value};

/// Whether a stage keeps accepting items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageFlow {
    Continue,
    /// The stage is satisfied (e.g. a limit was reached): stop feeding it,
    /// stop the upstream, and flush everything downstream of it.
    Close,
}

/// One instantiated stage of a running pipeline.
#[async_trait]
pub(crate) trait Operator: Send {
    /// Feed one item; emit zero or more derived items downstream.
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError>;

    /// Upstream is done; flush any buffered state downstream.
    async fn on_complete(&mut self, out: &mut Vec<Item>) -> Result<(), ItemError> {
        let _ = out;
        Ok(())
    }
}

/// Per-execution environment handed to factories at instantiation time.
pub(crate) struct ExecutionEnv {
    pub(crate) ctx: Arc<ContextInner>,
}

/// Build-time description of a stage.
#[async_trait]
pub(crate) trait StageFactory: Send + Sync {
    async fn instantiate(&self, env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError>;

    /// Stable stage name for skip reports and logs.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// map

pub(crate) struct MapFactory {
    pub(crate) transform: Arc<dyn ItemTransform>,
}

#[async_trait]
impl StageFactory for MapFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        Ok(Box::new(MapOperator {
            transform: Arc::clone(&self.transform),
        }))
    }

    fn name(&self) -> &'static str {
        "map"
    }
}

struct MapOperator {
    transform: Arc<dyn ItemTransform>,
}

#[async_trait]
impl Operator for MapOperator {
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        let derived = self.transform.transform(item).await?;
        out.push(derived);
        Ok(StageFlow::Continue)
    }
}

// ---------------------------------------------------------------------------
// filter

pub(crate) struct FilterFactory {
    pub(crate) predicate: Arc<dyn ItemFunction>,
}

#[async_trait]
impl StageFactory for FilterFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        Ok(Box::new(FilterOperator {
            predicate: Arc::clone(&self.predicate),
        }))
    }

    fn name(&self) -> &'static str {
        "filter"
    }
}

struct FilterOperator {
    predicate: Arc<dyn ItemFunction>,
}

#[async_trait]
impl Operator for FilterOperator {
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        let verdict = self.predicate.apply(&item).await?;
        match verdict {
            Value::Bool(true) => out.push(item),
            Value::Bool(false) => {}
            other => {
                return Err(ItemError::function(
                    "filter",
                    format!("predicate returned {}, expected bool", other.type_name()),
                ))
            }
        }
        Ok(StageFlow::Continue)
    }
}

// ---------------------------------------------------------------------------
// limit

pub(crate) struct LimitFactory {
    pub(crate) limit: u64,
}

#[async_trait]
impl StageFactory for LimitFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        Ok(Box::new(LimitOperator {
            remaining: self.limit,
        }))
    }

    fn name(&self) -> &'static str {
        "limit"
    }
}

struct LimitOperator {
    remaining: u64,
}

#[async_trait]
impl Operator for LimitOperator {
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        if self.remaining == 0 {
            return Ok(StageFlow::Close);
        }
        self.remaining -= 1;
        out.push(item);
        if self.remaining == 0 {
            Ok(StageFlow::Close)
        } else {
            Ok(StageFlow::Continue)
        }
    }
}

// ---------------------------------------------------------------------------
// set_independent_field

pub(crate) struct IndependentFieldFactory {
    pub(crate) name: String,
    pub(crate) provider: Arc<dyn ValueProvider>,
}

#[async_trait]
impl StageFactory for IndependentFieldFactory {
    async fn instantiate(&self, _env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        // The provider runs exactly once per execution, here. A failure is
        // remembered and reported per item, keeping it recoverable.
        let value = self.provider.provide().await;
        Ok(Box::new(ConstFieldOperator {
            name: self.name.clone(),
            value,
        }))
    }

    fn name(&self) -> &'static str {
        "set_independent_field"
    }
}

struct ConstFieldOperator {
    name: String,
    value: Result<Value, ItemError>,
}

#[async_trait]
impl Operator for ConstFieldOperator {
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        let value = self.value.clone()?;
        out.push(item.with_field(self.name.clone(), value));
        Ok(StageFlow::Continue)
    }
}

// ---------------------------------------------------------------------------
// debug_print / log_as

pub(crate) struct DebugFactory {
    pub(crate) tag: Option<String>,
}

#[async_trait]
impl StageFactory for DebugFactory {
    async fn instantiate(&self, env: &ExecutionEnv) -> Result<Box<dyn Operator>, PipelineError> {
        if let Err(error) = env.ctx.debug.ensure_started().await {
            tracing::warn!(error = %error, "debug sink unavailable, stage degrades to pass-through");
        }
        Ok(Box::new(DebugOperator {
            ctx: Arc::clone(&env.ctx),
            tag: self.tag.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "debug"
    }
}

struct DebugOperator {
    ctx: Arc<ContextInner>,
    tag: Option<String>,
}

#[derive(serde::Serialize)]
struct TaggedItem<'a> {
    tag: &'a str,
    item: &'a Item,
}

#[async_trait]
impl Operator for DebugOperator {
    async fn on_item(&mut self, item: Item, out: &mut Vec<Item>) -> Result<StageFlow, ItemError> {
        let rendered = match &self.tag {
            None => item.to_json(),
            Some(tag) => serde_json::to_string(&TaggedItem { tag, item: &item }),
        };
        match rendered {
            // Queued for the sink's writer loop; item flow never waits on
            // client sockets.
            Ok(message) => self.ctx.debug.send(message).await,
            Err(error) => {
                tracing::warn!(error = %error, "item not serializable for debug sink")
            }
        }
        out.push(item);
        Ok(StageFlow::Continue)
    }
}
