// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for debug broadcast sink events.

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

use crate::observability::messages::StructuredLog;

/// The sink began accepting inspection clients.
///
/// # Log Level
/// `info!` - Important operational event
pub struct SinkListening {
    pub addr: SocketAddr,
}

impl Display for SinkListening {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Debug sink listening on {}", self.addr)
    }
}

impl StructuredLog for SinkListening {
    fn log(&self) {
        tracing::info!(addr = %self.addr, "{}", self);
    }
}

/// A client joined the broadcast set.
///
/// # Log Level
/// `debug!` - Routine connection churn
pub struct ClientConnected {
    pub peer: SocketAddr,
    pub client_count: usize,
}

impl Display for ClientConnected {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Debug client {} connected ({} total)",
            self.peer, self.client_count
        )
    }
}

impl StructuredLog for ClientConnected {
    fn log(&self) {
        tracing::debug!(peer = %self.peer, client_count = self.client_count, "{}", self);
    }
}

/// A client was dropped from the broadcast set after a failed write.
///
/// # Log Level
/// `debug!` - Routine connection churn
pub struct ClientRemoved<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for ClientRemoved<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Debug client removed after write failure: {}", self.error)
    }
}

impl StructuredLog for ClientRemoved<'_> {
    fn log(&self) {
        tracing::debug!(error = %self.error, "{}", self);
    }
}

/// The accept loop stopped on an unrecoverable error.
///
/// # Log Level
/// `warn!` - Sink degraded until the next get-or-create heals it
pub struct ListenerFailed<'a> {
    pub error: &'a dyn std::error::Error,
}

impl Display for ListenerFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Debug sink accept loop failed: {}", self.error)
    }
}

impl StructuredLog for ListenerFailed<'_> {
    fn log(&self) {
        tracing::warn!(error = %self.error, "{}", self);
    }
}
