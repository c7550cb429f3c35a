//! Memory categories.
//!
//! The category drives the importance score a new memory starts with and how
//! it is labelled when rendered into the coach context. Identifiers are stable
//! `snake_case` strings for storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Semantic category of a coach memory.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    /// Objectives the user is working toward.
    Goals,
    /// Likes, dislikes, and routines.
    Preferences,
    /// Hard limits such as diet restrictions or schedule limits.
    Constraints,
    /// Medical conditions, medications, injuries, lab results.
    Health,
    /// Anything else worth keeping around for a conversation.
    #[default]
    Context,
}

impl MemoryCategory {
    /// All categories, in classification priority order.
    pub const ALL: [Self; 5] = [
        Self::Health,
        Self::Constraints,
        Self::Goals,
        Self::Preferences,
        Self::Context,
    ];

    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Goals => "goals",
            Self::Preferences => "preferences",
            Self::Constraints => "constraints",
            Self::Health => "health",
            Self::Context => "context",
        }
    }

    /// Importance score assigned to new memories of this category.
    #[must_use]
    pub const fn default_importance(self) -> f64 {
        match self {
            Self::Health => 0.9,
            Self::Constraints | Self::Goals => 0.8,
            Self::Preferences => 0.6,
            Self::Context => 0.3,
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown memory category: {0}")]
pub struct MemoryCategoryParseError(pub String);

impl FromStr for MemoryCategory {
    type Err = MemoryCategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "goals" | "goal" => Ok(Self::Goals),
            "preferences" | "preference" => Ok(Self::Preferences),
            "constraints" | "constraint" => Ok(Self::Constraints),
            "health" => Ok(Self::Health),
            "context" => Ok(Self::Context),
            other => Err(MemoryCategoryParseError(other.to_string())),
        }
    }
}
