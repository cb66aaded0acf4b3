// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for pipeline lifecycle and execution events.

use std::fmt::{Display, Formatter};

use crate::observability::messages::StructuredLog;
use crate::purpose::Purpose;

/// A pipeline execution started.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PipelineStarted<'a> {
    pub execution_id: u64,
    pub source: &'a str,
    pub purpose: &'a Purpose,
}

impl Display for PipelineStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Starting pipeline #{} over '{}' source for {}",
            self.execution_id, self.source, self.purpose
        )
    }
}

impl StructuredLog for PipelineStarted<'_> {
    fn log(&self) {
        tracing::info!(
            execution_id = self.execution_id,
            source = self.source,
            purpose = %self.purpose,
            "{}", self
        );
    }
}

/// A pipeline execution ran to completion.
///
/// # Log Level
/// `info!` - Important operational event
pub struct PipelineCompleted {
    pub execution_id: u64,
    pub items_delivered: u64,
}

impl Display for PipelineCompleted {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline #{} completed after delivering {} items",
            self.execution_id, self.items_delivered
        )
    }
}

impl StructuredLog for PipelineCompleted {
    fn log(&self) {
        tracing::info!(
            execution_id = self.execution_id,
            items_delivered = self.items_delivered,
            "{}", self
        );
    }
}

/// A pipeline execution terminated on a fatal condition.
///
/// # Log Level
/// `warn!` - Expected for cancellation/timeout, still worth surfacing
pub struct PipelineTerminated<'a> {
    pub execution_id: u64,
    pub reason: &'a dyn std::error::Error,
}

impl Display for PipelineTerminated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Pipeline #{} terminated: {}", self.execution_id, self.reason)
    }
}

impl StructuredLog for PipelineTerminated<'_> {
    fn log(&self) {
        tracing::warn!(
            execution_id = self.execution_id,
            reason = %self.reason,
            "{}", self
        );
    }
}

/// An item was skipped by a stage and reported to the failure path.
///
/// # Log Level
/// `debug!` - Routine per-item condition
pub struct ItemSkipped<'a> {
    pub execution_id: u64,
    pub stage: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ItemSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Pipeline #{} skipped an item at '{}': {}",
            self.execution_id, self.stage, self.error
        )
    }
}

impl StructuredLog for ItemSkipped<'_> {
    fn log(&self) {
        tracing::debug!(
            execution_id = self.execution_id,
            stage = self.stage,
            error = %self.error,
            "{}", self
        );
    }
}

/// Every active execution was asked to stop.
///
/// # Log Level
/// `info!` - Important operational event
pub struct StopAllRequested {
    pub active_count: usize,
}

impl Display for StopAllRequested {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Stopping all {} active executions", self.active_count)
    }
}

impl StructuredLog for StopAllRequested {
    fn log(&self) {
        tracing::info!(active_count = self.active_count, "{}", self);
    }
}
