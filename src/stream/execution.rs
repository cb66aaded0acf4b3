//! The execution engine: turns a pipeline description into a running
//! producer task, an operator chain, and a delivery channel.
//!
//! Nothing here runs at build time. [`launch`] spawns one driver task per
//! execution; the driver registers with the cancellation registry,
//! instantiates every stage, starts the source, arms the timeout watchdog,
//! and threads each emitted item through the stages in order. The terminal
//! consumes [`StreamEvent`]s: any number of `Item`/`Skip` deliveries followed
//! by exactly one `Completed` or `Failed`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::ContextInner;
use crate::errors::{ItemError, PipelineError, SourceError};
use crate::item::Item;
use crate::observability::messages::engine::{
    ItemSkipped, PipelineCompleted, PipelineStarted, PipelineTerminated,
};
use crate::observability::messages::StructuredLog;
use crate::source::SourceHandle;

use super::multicast::ReplayEvent;
use super::operator::{ExecutionEnv, Operator, StageFlow};
use super::{Stream, StreamInput};

/// What a terminal observes from a running pipeline.
pub(crate) enum StreamEvent {
    Item(Item),
    /// A per-item failure; the item was dropped, the pipeline continues.
    Skip(ItemError),
    /// The single fatal failure ending this execution.
    Failed(PipelineError),
    Completed,
}

pub(crate) struct RunningPipeline {
    pub(crate) events: mpsc::Receiver<StreamEvent>,
    pub(crate) cancel: CancellationToken,
}

/// Start executing a pipeline description. Returns immediately; the driver
/// task owns everything else.
pub(crate) fn launch(stream: Stream) -> RunningPipeline {
    let capacity = stream.ctx.config.execution.channel_capacity;
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let cancel = CancellationToken::new();
    tokio::spawn(run_pipeline(stream, events_tx, cancel.clone()));
    RunningPipeline {
        events: events_rx,
        cancel,
    }
}

async fn run_pipeline(
    stream: Stream,
    events_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let Stream {
        ctx,
        input,
        purpose,
        stages,
        deadline,
        ..
    } = stream;

    let source_label = input.label().to_string();
    let registration = ctx
        .registry
        .register(purpose.clone(), source_label.clone(), cancel.clone());
    let execution_id = registration.id();
    PipelineStarted {
        execution_id,
        source: &source_label,
        purpose: &purpose,
    }
    .log();

    let env = ExecutionEnv {
        ctx: Arc::clone(&ctx),
    };
    let mut ops: Vec<Box<dyn Operator>> = Vec::with_capacity(stages.len());
    let mut names: Vec<&'static str> = Vec::with_capacity(stages.len());
    for factory in &stages {
        match factory.instantiate(&env).await {
            Ok(op) => {
                ops.push(op);
                names.push(factory.name());
            }
            Err(error) => {
                fail(execution_id, &cancel, &events_tx, error).await;
                return;
            }
        }
    }

    let mut upstream = match build_upstream(&ctx, input, &cancel) {
        Ok(upstream) => upstream,
        Err(error) => {
            fail(execution_id, &cancel, &events_tx, error).await;
            return;
        }
    };

    let deadline_at = deadline.map(|after| (after, tokio::time::Instant::now() + after));
    let mut driver = Driver {
        ops,
        names,
        events_tx,
        execution_id,
        output_alive: true,
        delivered: 0,
    };

    let outcome = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Err(PipelineError::Cancelled),
            _ = wait_deadline(deadline_at) => {
                let (after, _) = deadline_at.expect("watchdog fired without a deadline");
                break Err(PipelineError::Timeout { after });
            }
            feed = upstream.next() => match feed {
                Feed::Item(item) => {
                    if let Some(closed) = driver.push_through(0, vec![item]).await {
                        // A stage is satisfied: the source stops, stateful
                        // stages downstream of it still flush.
                        cancel.cancel();
                        driver.complete_from(closed + 1).await;
                        break Ok(());
                    }
                    if !driver.output_alive {
                        cancel.cancel();
                        break Ok(());
                    }
                }
                Feed::Failed(error) => break Err(error),
                Feed::Done => {
                    driver.complete_from(0).await;
                    break Ok(());
                }
            },
        }
    };

    match outcome {
        Ok(()) => {
            PipelineCompleted {
                execution_id,
                items_delivered: driver.delivered,
            }
            .log();
            let _ = driver.events_tx.send(StreamEvent::Completed).await;
        }
        Err(error) => {
            fail(execution_id, &cancel, &driver.events_tx, error).await;
        }
    }
}

async fn fail(
    execution_id: u64,
    cancel: &CancellationToken,
    events_tx: &mpsc::Sender<StreamEvent>,
    error: PipelineError,
) {
    PipelineTerminated {
        execution_id,
        reason: &error,
    }
    .log();
    cancel.cancel();
    let _ = events_tx.send(StreamEvent::Failed(error)).await;
}

async fn wait_deadline(deadline: Option<(Duration, tokio::time::Instant)>) {
    match deadline {
        Some((_, at)) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

enum Feed {
    Item(Item),
    Failed(PipelineError),
    Done,
}

enum Upstream {
    /// A live source feeding a bounded channel from its own task.
    Live {
        rx: mpsc::Receiver<Item>,
        join: Option<JoinHandle<Result<(), SourceError>>>,
    },
    /// A claimed multicast branch replaying the shared sequence.
    Replay {
        rx: mpsc::UnboundedReceiver<ReplayEvent>,
    },
}

impl Upstream {
    async fn next(&mut self) -> Feed {
        match self {
            Upstream::Live { rx, join } => match rx.recv().await {
                Some(item) => Feed::Item(item),
                // Channel drained; the source task result says how it ended.
                None => match join.take() {
                    Some(join) => match join.await {
                        Ok(Ok(())) => Feed::Done,
                        Ok(Err(error)) => Feed::Failed(error.into()),
                        Err(join_error) => Feed::Failed(PipelineError::Source {
                            message: format!("source task aborted: {join_error}"),
                            cause: None,
                        }),
                    },
                    None => Feed::Done,
                },
            },
            Upstream::Replay { rx } => match rx.recv().await {
                Some(ReplayEvent::Item(item)) => Feed::Item(item),
                Some(ReplayEvent::Failed(error)) => Feed::Failed(error),
                None => Feed::Done,
            },
        }
    }
}

fn build_upstream(
    ctx: &Arc<ContextInner>,
    input: StreamInput,
    cancel: &CancellationToken,
) -> Result<Upstream, PipelineError> {
    match input {
        StreamInput::Source(factory) => {
            let (tx, rx) = mpsc::channel(ctx.config.execution.channel_capacity);
            let runner = factory.create();
            let handle = SourceHandle::new(tx, cancel.clone());
            let join = tokio::spawn(async move { runner.run(handle).await });
            Ok(Upstream::Live {
                rx,
                join: Some(join),
            })
        }
        StreamInput::Replay(slot) => {
            let rx = slot
                .lock()
                .expect("branch slot poisoned")
                .take()
                .ok_or_else(|| PipelineError::Source {
                    message: "multicast branch was already executed".to_string(),
                    cause: None,
                })?;
            Ok(Upstream::Replay { rx })
        }
    }
}

struct Driver {
    ops: Vec<Box<dyn Operator>>,
    names: Vec<&'static str>,
    events_tx: mpsc::Sender<StreamEvent>,
    execution_id: u64,
    output_alive: bool,
    delivered: u64,
}

impl Driver {
    /// Push items into the chain starting at stage `start`, delivering
    /// whatever falls out the end. Returns the index of the first stage that
    /// closed, if any.
    async fn push_through(&mut self, start: usize, items: Vec<Item>) -> Option<usize> {
        let mut current = items;
        let mut first_closed = None;
        let mut index = start;
        while index < self.ops.len() {
            if current.is_empty() {
                return first_closed;
            }
            let mut next = Vec::new();
            let mut closed = false;
            for item in current {
                let outcome = self.ops[index].on_item(item, &mut next).await;
                match outcome {
                    Ok(StageFlow::Continue) => {}
                    Ok(StageFlow::Close) => {
                        closed = true;
                        break;
                    }
                    Err(error) => self.skip(index, error).await,
                }
            }
            if closed && first_closed.is_none() {
                first_closed = Some(index);
            }
            current = next;
            index += 1;
        }
        for item in current {
            self.deliver(item).await;
        }
        first_closed
    }

    /// Flush stages from `start` onward in chain order, feeding each flush
    /// into the stages after it.
    async fn complete_from(&mut self, start: usize) {
        let mut index = start;
        while index < self.ops.len() {
            let mut flushed = Vec::new();
            let outcome = self.ops[index].on_complete(&mut flushed).await;
            if let Err(error) = outcome {
                self.skip(index, error).await;
            }
            match self.push_through(index + 1, flushed).await {
                // A close during the flush truncates everything up to that
                // stage; resume flushing past it.
                Some(closed) => index = closed + 1,
                None => index += 1,
            }
        }
    }

    async fn deliver(&mut self, item: Item) {
        if !self.output_alive {
            return;
        }
        self.delivered += 1;
        if self.events_tx.send(StreamEvent::Item(item)).await.is_err() {
            self.output_alive = false;
        }
    }

    async fn skip(&mut self, stage: usize, error: ItemError) {
        ItemSkipped {
            execution_id: self.execution_id,
            stage: self.names[stage],
            error: &error,
        }
        .log();
        if self.output_alive && self.events_tx.send(StreamEvent::Skip(error)).await.is_err() {
            self.output_alive = false;
        }
    }
}
