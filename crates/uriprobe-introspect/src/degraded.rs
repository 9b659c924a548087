//! Best-effort answers synthesized when no live connection is available.

use uriprobe_core::{ConnectionAccounting, Endpoint, ErrorRecord, Identity, Outcome};

/// Identity inferred from the URI alone.
///
/// Only produced when the URI names both a database and a user; the
/// version carries the recorded error category so callers can tell an
/// unreachable endpoint from one that was never described.
pub fn identity(endpoint: &Endpoint, error: Option<&ErrorRecord>) -> Outcome<Identity> {
    if !endpoint.has_identity_hint() {
        return Outcome::Absent;
    }
    let reason = error
        .map(|record| record.category.describe())
        .unwrap_or("connection issue");
    Outcome::Degraded(Identity {
        version: format!("Unknown ({reason})"),
        database: endpoint.database().map(str::to_string),
        user: endpoint.user().map(|user| format!("{user}@remote")),
    })
}

/// Explicit error marker in place of connection counts.
pub fn accounting(error: Option<&ErrorRecord>) -> Outcome<ConnectionAccounting> {
    match error {
        Some(record) => Outcome::Degraded(ConnectionAccounting::Unavailable {
            category: Some(record.category),
            reason: format!("Connection error: {}", record.category.describe()),
        }),
        None => Outcome::Absent,
    }
}

/// One database when the URI names it and the connection failed.
pub fn database_count(endpoint: &Endpoint, error: Option<&ErrorRecord>) -> Outcome<u64> {
    match (endpoint.database(), error) {
        (Some(_), Some(_)) => Outcome::Degraded(1),
        _ => Outcome::Absent,
    }
}
