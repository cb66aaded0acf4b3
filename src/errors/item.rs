// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Recoverable, per-item failures.
///
/// These are routed to the failing item's consumer (the `on_fail` entry point
/// of a callback, or a trace log for awaited terminals) and never terminate
/// the pipeline; sibling items keep flowing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ItemError {
    /// The item has no field with the requested name.
    #[error("field '{field}' is missing")]
    MissingField { field: String },

    /// The field exists but holds a value of the wrong type.
    #[error("field '{field}' holds {actual}, expected {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// A per-item function rejected its input.
    #[error("function '{function}' failed: {message}")]
    Function { function: String, message: String },

    /// A nested sub-query could not produce a value for the outer item.
    #[error("sub-query failed: {message}")]
    SubQuery { message: String },
}

impl ItemError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        ItemError::MissingField {
            field: field.into(),
        }
    }

    pub fn function(function: impl Into<String>, message: impl Into<String>) -> Self {
        ItemError::Function {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn sub_query(message: impl Into<String>) -> Self {
        ItemError::SubQuery {
            message: message.into(),
        }
    }
}
