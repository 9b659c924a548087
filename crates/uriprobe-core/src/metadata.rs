//! Metadata records returned by adapters.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::classify::ErrorCategory;

/// Canonical self-description of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Identity {
    pub version: String,
    pub database: Option<String>,
    pub user: Option<String>,
}

impl Identity {
    pub fn version_only(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            database: None,
            user: None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version)?;
        if let Some(database) = &self.database {
            write!(f, " (database: {database}")?;
            if let Some(user) = &self.user {
                write!(f, ", user: {user}")?;
            }
            f.write_str(")")?;
        } else if let Some(user) = &self.user {
            write!(f, " (user: {user})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseSummary {
    pub name: String,
    /// Human-readable size, e.g. `"12.50 MB"` or `"42 keys"`.
    pub size: String,
    pub raw_size: u64,
    /// Tables for relational backends, keys for key-value backends.
    pub object_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableSummary {
    pub name: String,
    pub size: String,
    pub raw_size: u64,
    /// Statistics-based estimate, never an exact count.
    pub row_count: Option<u64>,
}

/// Records that can be ordered by their raw byte size.
pub trait RawSized {
    fn raw_size(&self) -> u64;
}

impl RawSized for DatabaseSummary {
    fn raw_size(&self) -> u64 {
        self.raw_size
    }
}

impl RawSized for TableSummary {
    fn raw_size(&self) -> u64 {
        self.raw_size
    }
}

/// Sort descending by raw size. Ties keep their input order.
pub fn sort_by_size_desc<T: RawSized>(items: &mut [T]) {
    items.sort_by(|a, b| b.raw_size().cmp(&a.raw_size()));
}

/// Render a byte count as megabytes with two decimals.
pub fn format_megabytes(raw: u64) -> String {
    format!("{:.2} MB", raw as f64 / (1024.0 * 1024.0))
}

/// Open connections against an optional ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionUsage {
    pub current: u64,
    pub limit: Option<u64>,
}

impl fmt::Display for ConnectionUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.limit {
            Some(0) | None => write!(f, "{} (no limit)", self.current),
            Some(limit) => write!(f, "{} of {limit}", self.current),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionAccounting {
    Measured {
        /// Connections held by the authenticated principal, when the backend tracks them.
        user: Option<ConnectionUsage>,
        global: ConnectionUsage,
    },
    /// The backend refused to report, e.g. because the probe itself hit a limit.
    Unavailable {
        category: Option<ErrorCategory>,
        reason: String,
    },
}

/// Tri-state answer to "is replication in play here?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationStatus {
    Active,
    Inactive,
    /// The check itself failed.
    Unknown,
}

impl ReplicationStatus {
    pub fn from_flag(active: bool) -> Self {
        if active { Self::Active } else { Self::Inactive }
    }

    pub fn as_option(self) -> Option<bool> {
        match self {
            Self::Active => Some(true),
            Self::Inactive => Some(false),
            Self::Unknown => None,
        }
    }
}

/// Approximate row or key count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RowEstimate {
    pub rows: u64,
    /// True when a bounded scan stopped at its time cap; `rows` is then a lower bound.
    pub timed_out: bool,
}

impl RowEstimate {
    pub fn complete(rows: u64) -> Self {
        Self {
            rows,
            timed_out: false,
        }
    }

    pub fn partial(rows: u64) -> Self {
        Self {
            rows,
            timed_out: true,
        }
    }
}
