use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result of a metadata request.
///
/// Distinguishes a value read from a live backend, a best-effort value
/// inferred without one, and the absence of any answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// Read from the backend.
    Live(T),
    /// Inferred from the URI or earlier state because the backend could not answer.
    Degraded(T),
    /// Nothing could be determined.
    Absent,
}

impl<T> Outcome<T> {
    pub fn from_option(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Live)
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Live(value) | Self::Degraded(value) => Some(value),
            Self::Absent => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Live(value) | Self::Degraded(value) => Some(value),
            Self::Absent => None,
        }
    }

    pub fn as_ref(&self) -> Outcome<&T> {
        match self {
            Self::Live(value) => Outcome::Live(value),
            Self::Degraded(value) => Outcome::Degraded(value),
            Self::Absent => Outcome::Absent,
        }
    }

    /// Transform the carried value, keeping the live/degraded marker.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Live(value) => Outcome::Live(f(value)),
            Self::Degraded(value) => Outcome::Degraded(f(value)),
            Self::Absent => Outcome::Absent,
        }
    }

    /// Replace an absent outcome with the result of `fallback`.
    pub fn or_else(self, fallback: impl FnOnce() -> Self) -> Self {
        match self {
            Self::Absent => fallback(),
            other => other,
        }
    }
}

impl<T: Default> Outcome<T> {
    pub fn unwrap_or_default(self) -> T {
        self.into_value().unwrap_or_default()
    }
}
