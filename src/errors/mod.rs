// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod build;
mod config;
mod execution;
mod item;

pub use build::BuildError;
pub use config::ConfigError;
pub use execution::{PipelineError, SourceError};
pub use item::ItemError;
