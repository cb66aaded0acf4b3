// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The root query context.
//!
//! A [`QueryContext`] owns the services shared by every pipeline built from
//! it: the engine configuration, the execution registry, and the debug
//! broadcast sink. Pipelines start at [`QueryContext::get_data`], which binds
//! a data source to an immutable [`Purpose`].

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::debug_sink::DebugServer;
use crate::purpose::Purpose;
use crate::registry::ExecutionRegistry;
use crate::source::SourceFactory;
use crate::stream::Stream;

#[derive(Clone)]
pub struct QueryContext {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    pub(crate) config: EngineConfig,
    pub(crate) registry: ExecutionRegistry,
    pub(crate) debug: DebugServer,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let debug = DebugServer::new(config.debug.port);
        Self {
            inner: Arc::new(ContextInner {
                config,
                registry: ExecutionRegistry::new(),
                debug,
            }),
        }
    }

    /// Bind a data source to a purpose, yielding an unexecuted pipeline.
    ///
    /// The purpose is fixed here for the lifetime of the pipeline; nothing
    /// downstream can alter it.
    pub fn get_data(&self, source: impl SourceFactory + 'static, purpose: Purpose) -> Stream {
        Stream::new(Arc::clone(&self.inner), Arc::new(source), purpose)
    }

    /// Signal every active pipeline built from this context to stop.
    pub fn stop_all(&self) {
        self.inner.registry.stop_all();
    }

    pub fn registry(&self) -> &ExecutionRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn debug_server(&self) -> &DebugServer {
        &self.inner.debug
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}
