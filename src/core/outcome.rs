//! Success-or-degraded results for best-effort operations.
//!
//! Services that must never fail the chat flow (deduplication, retrieval,
//! aggregation, retention sweeps) return an [`Outcome`] instead of a `Result`.
//! A degraded outcome still carries a usable value, usually an empty or zeroed
//! default, plus the reason the real value could not be produced.

/// Result of a best-effort operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    /// The operation completed normally.
    Success(T),
    /// A dependency failed and `value` is a fallback.
    Degraded {
        /// Fallback value handed to the caller.
        value: T,
        /// Why the fallback was used.
        reason: String,
    },
}

impl<T> Outcome<T> {
    /// Build a degraded outcome.
    #[must_use]
    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self::Degraded {
            value,
            reason: reason.into(),
        }
    }

    /// Whether the fallback path was taken.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Borrow the carried value.
    #[must_use]
    pub const fn value(&self) -> &T {
        match self {
            Self::Success(value) | Self::Degraded { value, .. } => value,
        }
    }

    /// Take the carried value, success or fallback.
    #[must_use]
    pub fn into_value(self) -> T {
        match self {
            Self::Success(value) | Self::Degraded { value, .. } => value,
        }
    }

    /// Degradation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    /// Transform the carried value, keeping the degradation state.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::Degraded { value, reason } => Outcome::Degraded {
                value: f(value),
                reason,
            },
        }
    }
}
