// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

/// Errors raised while composing a pipeline, before anything executes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// `reuse` was asked for zero downstream branches.
    #[error("reuse requires at least one branch")]
    ZeroBranches,

    /// Every branch of a multicast point has already been claimed.
    #[error("all {count} branches of this multicast point are already claimed")]
    BranchesExhausted { count: usize },

    /// An operation that only makes sense on grouped items was staged
    /// without a preceding `group_by` / `local_group_by`.
    #[error("'{operation}' requires a preceding group_by or local_group_by")]
    NotGrouped { operation: &'static str },
}
