//! Core contracts and helpers for uriprobe.
//!
//! This crate defines the endpoint descriptor, capability sets, metadata
//! records, error classification and settings shared by the adapters and
//! the CLI. Nothing here performs network I/O.

pub mod access;
pub mod capabilities;
pub mod classify;
pub mod endpoint;
pub mod error;
pub mod metadata;
pub mod outcome;
pub mod redaction;
pub mod retry;
pub mod settings;

pub use access::{AccessLevel, AccessTier};
pub use capabilities::{BackendKind, Capabilities};
pub use classify::{
    BackendError, ErrorCategory, ErrorClassifier, ErrorRecord, MySqlCodes, PostgresCodes,
    RedisCodes, SmtpCodes,
};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use metadata::{
    ConnectionAccounting, ConnectionUsage, DatabaseSummary, Identity, ReplicationStatus,
    RowEstimate, TableSummary, format_megabytes, sort_by_size_desc,
};
pub use outcome::Outcome;
pub use redaction::redact_uri;
pub use retry::RetryPolicy;
pub use settings::{PrivilegeSettings, ProbeSettings, ScanSettings, Timeouts, TlsSettings};
