//! Multicast: execute an upstream once, replay it to N independent branches.
//!
//! `reuse(n)` is the upstream's execution point. The upstream (source plus
//! every stage before the reuse point) runs exactly once; each event is
//! replayed verbatim to `n` per-branch channels. Branches claim a channel
//! via [`SharedStream::branch`] and run their own operator chains and
//! terminals, fully independently.
//!
//! Backpressure policy: the shared producer is never blocked by a branch and
//! no branch ever drops an item. A branch that is slow, or whose terminal
//! has not started yet, buffers its backlog in its replay channel without
//! bound. Callers bound the memory by bounding the upstream (`limit`,
//! `timeout`); the observed usage (sequentially consumed branches) requires
//! exactly this. Once every branch is gone, the upstream is cancelled.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::context::ContextInner;
use crate::errors::{BuildError, PipelineError};
use crate::item::Item;
use crate::purpose::Purpose;

use super::execution::{self, StreamEvent};
use super::Stream;

/// One entry of a branch's replay sequence.
pub(crate) enum ReplayEvent {
    Item(Item),
    Failed(PipelineError),
}

/// A pipeline turned into a shared execution point with a fixed number of
/// claimable branches.
pub struct SharedStream {
    ctx: Arc<ContextInner>,
    purpose: Purpose,
    branches: Mutex<Vec<mpsc::UnboundedReceiver<ReplayEvent>>>,
    total: usize,
}

pub(crate) fn share(stream: Stream, count: usize) -> Result<SharedStream, BuildError> {
    if count == 0 {
        return Err(BuildError::ZeroBranches);
    }
    let ctx = Arc::clone(&stream.ctx);
    let purpose = stream.purpose.clone();

    let mut senders: Vec<Option<mpsc::UnboundedSender<ReplayEvent>>> = Vec::with_capacity(count);
    let mut receivers = Vec::with_capacity(count);
    for _ in 0..count {
        let (tx, rx) = mpsc::unbounded_channel();
        senders.push(Some(tx));
        receivers.push(rx);
    }

    let mut run = execution::launch(stream);
    tokio::spawn(async move {
        while let Some(event) = run.events.recv().await {
            match event {
                StreamEvent::Item(item) => {
                    let mut alive = 0;
                    for slot in senders.iter_mut() {
                        if let Some(tx) = slot {
                            if tx.send(ReplayEvent::Item(item.clone())).is_err() {
                                *slot = None;
                            } else {
                                alive += 1;
                            }
                        }
                    }
                    if alive == 0 {
                        run.cancel.cancel();
                        break;
                    }
                }
                // Upstream per-item skips were already logged by its driver;
                // branches only see the shared item sequence.
                StreamEvent::Skip(_) => {}
                StreamEvent::Failed(error) => {
                    for slot in senders.iter_mut() {
                        if let Some(tx) = slot.take() {
                            let _ = tx.send(ReplayEvent::Failed(error.clone()));
                        }
                    }
                    break;
                }
                StreamEvent::Completed => break,
            }
        }
        // Dropping the senders closes every branch channel: completion.
    });

    Ok(SharedStream {
        ctx,
        purpose,
        branches: Mutex::new(receivers),
        total: count,
    })
}

impl std::fmt::Debug for SharedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStream")
            .field("purpose", &self.purpose)
            .field("total_branches", &self.total)
            .field("remaining_branches", &self.remaining_branches())
            .finish()
    }
}

impl SharedStream {
    /// Claim one of the fixed branches as an independent pipeline.
    ///
    /// The branch observes the shared sequence from its beginning; items
    /// produced before this call were buffered for it. Claiming more
    /// branches than the multicast point was created with is a build error;
    /// a multicast point never grows.
    pub fn branch(&self) -> Result<Stream, BuildError> {
        let mut branches = self.branches.lock().expect("branch set poisoned");
        let rx = branches.pop().ok_or(BuildError::BranchesExhausted {
            count: self.total,
        })?;
        Ok(Stream::from_replay(
            Arc::clone(&self.ctx),
            self.purpose.clone(),
            rx,
        ))
    }

    /// The pipeline's purpose, readable but fixed.
    pub fn purpose(&self) -> &Purpose {
        &self.purpose
    }

    pub fn remaining_branches(&self) -> usize {
        self.branches.lock().expect("branch set poisoned").len()
    }
}
