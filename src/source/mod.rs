//! The producer interface every data source implements.
//!
//! A source is started with a [`SourceHandle`] and runs until it has nothing
//! left to emit, the pipeline stops wanting input, or it fails. Returning
//! `Ok` signals natural completion; returning a [`SourceError`] marks the
//! whole pipeline execution failed. Cooperative stop is built into the
//! handle: once the pipeline is limited out, cancelled, or timed out, every
//! `emit` (and `sleep`) returns [`Stopped`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::SourceError;
use crate::item::Item;

pub mod mock;

/// The pipeline no longer wants input; the source should wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped;

/// Output side handed to a running source.
pub struct SourceHandle {
    tx: mpsc::Sender<Item>,
    cancel: CancellationToken,
}

impl SourceHandle {
    pub(crate) fn new(tx: mpsc::Sender<Item>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Deliver one item downstream, waiting for channel capacity.
    pub async fn emit(&self, item: Item) -> Result<(), Stopped> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Stopped),
            sent = self.tx.send(item) => sent.map_err(|_| Stopped),
        }
    }

    /// Cancellation-aware pause between emissions for periodic sources.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Stopped> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Stopped),
            _ = self.tx.closed() => Err(Stopped),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// A running producer of items.
#[async_trait]
pub trait Source: Send {
    async fn run(self: Box<Self>, out: SourceHandle) -> Result<(), SourceError>;
}

/// Creates a fresh [`Source`] per pipeline execution.
///
/// Descriptions are re-executed (compound sub-queries run their inner
/// pipeline once per outer item), so the factory, not a source instance, is
/// what a pipeline holds on to.
pub trait SourceFactory: Send + Sync {
    fn create(&self) -> Box<dyn Source>;

    /// Short label used in registry entries and log messages.
    fn name(&self) -> &str {
        "source"
    }
}
