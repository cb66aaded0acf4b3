// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Purpose tags: the privacy/audit declaration every pipeline carries.
//!
//! A [`Purpose`] is attached exactly once, when a data source is bound to a
//! pipeline, and is immutable from then on. Auditing layers read it through
//! the execution registry for the lifetime of the pipeline; nothing
//! downstream can change or strip it.

use std::fmt;

use serde::Serialize;

/// Coarse category of why the data is being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurposeCategory {
    Ads,
    Analytics,
    Feature,
    Health,
    Research,
    Social,
    Utility,
    Test,
}

impl fmt::Display for PurposeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurposeCategory::Ads => "ads",
            PurposeCategory::Analytics => "analytics",
            PurposeCategory::Feature => "feature",
            PurposeCategory::Health => "health",
            PurposeCategory::Research => "research",
            PurposeCategory::Social => "social",
            PurposeCategory::Utility => "utility",
            PurposeCategory::Test => "test",
        };
        f.write_str(name)
    }
}

/// Immutable `{category, description}` pair declaring why a pipeline
/// accesses its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Purpose {
    category: PurposeCategory,
    description: String,
}

impl Purpose {
    fn tagged(category: PurposeCategory, description: impl Into<String>) -> Self {
        Self {
            category,
            description: description.into(),
        }
    }

    pub fn ads(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Ads, description)
    }

    pub fn analytics(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Analytics, description)
    }

    pub fn feature(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Feature, description)
    }

    pub fn health(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Health, description)
    }

    pub fn research(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Research, description)
    }

    pub fn social(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Social, description)
    }

    pub fn utility(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Utility, description)
    }

    pub fn test(description: impl Into<String>) -> Self {
        Self::tagged(PurposeCategory::Test, description)
    }

    pub fn category(&self) -> PurposeCategory {
        self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.description)
    }
}
