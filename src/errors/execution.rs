// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::ItemError;

/// Pipeline-fatal failures.
///
/// Exactly one of these terminates a pipeline execution: it is returned from
/// an awaited terminal, or delivered once to an asynchronous terminal's
/// failure entry point. Every branch sharing the execution observes it.
///
/// The `Item` variant exists so per-item failures can travel through the same
/// callback failure entry point; it is never fatal on its own.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    /// The data source failed while producing items.
    #[error("data source failed: {message}")]
    Source {
        message: String,
        #[source]
        cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    },

    /// The execution was cancelled, either individually or via `stop_all`.
    #[error("pipeline was cancelled")]
    Cancelled,

    /// The watchdog armed by `timeout` fired before the terminal condition.
    #[error("pipeline timed out after {after:?}")]
    Timeout { after: Duration },

    /// The pipeline completed without producing a result item.
    #[error("pipeline produced no result")]
    NoResult,

    /// A per-item failure, carried to a callback's failure entry point.
    #[error(transparent)]
    Item(#[from] ItemError),
}

impl PipelineError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Item(_))
    }
}

/// Failure reported by a data source.
///
/// Carries a message and an optional causing error; the engine surfaces it as
/// [`PipelineError::Source`].
#[derive(Debug, Error, Clone)]
#[error("{message}")]
pub struct SourceError {
    message: String,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for SourceError {
    fn from(error: std::io::Error) -> Self {
        SourceError::with_cause("i/o error", error)
    }
}

impl From<SourceError> for PipelineError {
    fn from(error: SourceError) -> Self {
        PipelineError::Source {
            message: error.message,
            cause: error.cause,
        }
    }
}
