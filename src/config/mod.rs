// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Engine configuration, loadable from a YAML file.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::ConfigError;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;
const DEFAULT_DEBUG_PORT: u16 = 9721;

/// Complete configuration for a query context.
///
/// Every field has a default, so `EngineConfig::default()` is a working
/// setup and a config file only needs to name what it overrides:
///
/// ```yaml
/// execution:
///   channel_capacity: 128
/// debug:
///   port: 9850
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub execution: ExecutionOptions,
    #[serde(default)]
    pub debug: DebugOptions,
}

/// Options governing pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExecutionOptions {
    /// Capacity of the producer-to-pipeline channel. Bounds how far a source
    /// can run ahead of a single branch.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Options for the debug broadcast sink.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DebugOptions {
    /// Listening port for inspection clients. Port 0 binds ephemerally.
    #[serde(default = "default_debug_port")]
    pub port: u16,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            port: DEFAULT_DEBUG_PORT,
        }
    }
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_debug_port() -> u16 {
    DEFAULT_DEBUG_PORT
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: EngineConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.execution.channel_capacity == 0 {
        return Err(ConfigError::Invalid(
            "execution.channel_capacity must be at least 1".to_string(),
        ));
    }
    Ok(())
}
