// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] for field-structured emission through `tracing`.
//!
//! # Usage Pattern
//!
//! ```rust
//! use tapline::observability::messages::StructuredLog;
//! use tapline::observability::messages::engine::PipelineCompleted;
//!
//! let msg = PipelineCompleted {
//!     execution_id: 3,
//!     items_delivered: 42,
//! };
//! msg.log();
//! ```

use std::fmt::Display;

pub mod engine;
pub mod sink;

/// Emit a message through `tracing` with structured fields.
pub trait StructuredLog: Display {
    fn log(&self);
}
