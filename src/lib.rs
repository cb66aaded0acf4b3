// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod config;     // engine configuration
pub mod context;    // root query context
pub mod debug_sink; // debug broadcast sink
pub mod errors;     // error handling
pub mod functions;  // transforms, callbacks, operator library
pub mod item;       // record model
pub mod observability;
pub mod purpose;    // purpose tags
pub mod registry;   // cancellation + audit registry
pub mod source;     // producer interface + mock sources
pub mod stream;     // pipeline builder + execution engine
