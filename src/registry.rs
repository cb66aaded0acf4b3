// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process-wide tracking of live pipeline executions.
//!
//! Every execution registers itself here for its lifetime, carrying its
//! purpose tag. The registry is the cooperative-shutdown surface
//! ([`ExecutionRegistry::stop_all`]) and the read-only audit surface
//! ([`ExecutionRegistry::active`]): an auditing layer can see why each live
//! pipeline is accessing data, and nothing it is handed can mutate that.
//!
//! The registry is owned by a query context and passed to executions
//! explicitly; there is no ambient global.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::observability::messages::engine::StopAllRequested;
use crate::observability::messages::StructuredLog;
use crate::purpose::Purpose;

/// Read-only view of one active execution, for auditing.
#[derive(Debug, Clone)]
pub struct ExecutionInfo {
    pub id: u64,
    pub purpose: Purpose,
    pub source: String,
}

struct ActiveExecution {
    info: ExecutionInfo,
    token: CancellationToken,
}

type ActiveMap = Arc<Mutex<HashMap<u64, ActiveExecution>>>;

pub struct ExecutionRegistry {
    next_id: AtomicU64,
    active: ActiveMap,
}

impl ExecutionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Track a new execution until the returned guard drops. The token is
    /// the execution's own; `stop_all` cancels it through the registry.
    pub(crate) fn register(
        &self,
        purpose: Purpose,
        source: impl Into<String>,
        token: CancellationToken,
    ) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let info = ExecutionInfo {
            id,
            purpose,
            source: source.into(),
        };
        self.active.lock().expect("registry poisoned").insert(
            id,
            ActiveExecution {
                info,
                token: token.clone(),
            },
        );
        Registration {
            id,
            token,
            active: Arc::clone(&self.active),
        }
    }

    /// Signal every live execution to terminate promptly.
    pub fn stop_all(&self) {
        let active = self.active.lock().expect("registry poisoned");
        StopAllRequested {
            active_count: active.len(),
        }
        .log();
        for execution in active.values() {
            execution.token.cancel();
        }
    }

    /// Audit view: purpose and source of every live execution.
    pub fn active(&self) -> Vec<ExecutionInfo> {
        let active = self.active.lock().expect("registry poisoned");
        let mut infos: Vec<ExecutionInfo> =
            active.values().map(|execution| execution.info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().expect("registry poisoned").len()
    }
}

/// Guard tying an execution's registry entry to its driver task.
pub(crate) struct Registration {
    id: u64,
    token: CancellationToken,
    active: ActiveMap,
}

impl Registration {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.active.lock().expect("registry poisoned").remove(&self.id);
    }
}
