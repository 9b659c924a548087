use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Ordered privilege tiers shared by every backend family.
///
/// Declaration order is the ordering: `Limited < ReadOnly < ReadWrite <
/// PowerUser < Administrator`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    Limited,
    ReadOnly,
    ReadWrite,
    PowerUser,
    Administrator,
}

impl AccessTier {
    /// Generic label used when a backend has no vocabulary of its own.
    pub fn default_label(self) -> &'static str {
        match self {
            Self::Limited => "Limited access",
            Self::ReadOnly => "Read-only access",
            Self::ReadWrite => "Write access",
            Self::PowerUser => "Power user",
            Self::Administrator => "Administrator",
        }
    }
}

/// Backend-specific access label placed on the shared tier scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AccessLevel {
    pub tier: AccessTier,
    pub label: String,
}

impl AccessLevel {
    pub fn new(tier: AccessTier, label: impl Into<String>) -> Self {
        Self {
            tier,
            label: label.into(),
        }
    }

    pub fn tier_default(tier: AccessTier) -> Self {
        Self::new(tier, tier.default_label())
    }

    pub fn limited() -> Self {
        Self::tier_default(AccessTier::Limited)
    }

    /// Append `" (<suffix>)"` to the label, keeping the tier.
    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.label = format!("{} ({suffix})", self.label);
        self
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
