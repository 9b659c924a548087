//! One-shot collection of everything an adapter can tell about its endpoint.

use std::net::IpAddr;

use schemars::JsonSchema;
use serde::Serialize;

use uriprobe_core::{
    AccessLevel, BackendKind, Capabilities, ConnectionAccounting, DatabaseSummary, ErrorRecord,
    Identity, Outcome, ReplicationStatus, RowEstimate, TableSummary,
};

use crate::adapter::Adapter;

/// What to drill into beyond the server-level accessors.
#[derive(Debug, Clone, Default)]
pub struct ReportScope {
    /// Database whose tables are listed; defaults to the URI's database.
    pub database: Option<String>,
    /// Table (or key pattern) whose rows are estimated.
    pub table: Option<String>,
    /// Run the TCP reachability and DNS checks.
    pub network_checks: bool,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableListing {
    pub database: String,
    pub tables: Outcome<Vec<TableSummary>>,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RowEstimateReport {
    pub table: String,
    pub database: Option<String>,
    pub estimate: Outcome<RowEstimate>,
}

/// Rendered form of a probe. The URI is always redacted.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ProbeReport {
    pub uri: String,
    pub kind: BackendKind,
    pub summary: String,
    pub cli: String,
    pub capabilities: Capabilities,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<IpAddr>,
    pub identity: Outcome<Identity>,
    pub usage: Outcome<String>,
    pub database_count: Outcome<u64>,
    pub databases: Outcome<Vec<DatabaseSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tables: Option<TableListing>,
    pub connection_accounting: Outcome<ConnectionAccounting>,
    pub privilege: Outcome<AccessLevel>,
    pub replication: ReplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_estimate: Option<RowEstimateReport>,
    /// Last classified error, if any accessor hit one.
    pub connection_error: Option<ErrorRecord>,
}

impl ProbeReport {
    /// Query every accessor once, in an order that connects early.
    pub async fn collect(adapter: &mut dyn Adapter, scope: &ReportScope) -> Self {
        let (reachable, address) = if scope.network_checks {
            (Some(adapter.reachable().await), adapter.resolve().await)
        } else {
            (None, None)
        };

        let identity = adapter.identity().await;
        let usage = adapter.usage().await;
        let databases = adapter.enumerate_databases().await;
        let database_count = adapter.database_count().await;

        let listed_database = scope
            .database
            .clone()
            .or_else(|| adapter.endpoint().database().map(str::to_string));
        let tables = match listed_database {
            Some(database) if adapter.capabilities().tables => {
                let tables = adapter.enumerate_tables(&database).await;
                Some(TableListing { database, tables })
            }
            _ => None,
        };

        let connection_accounting = adapter.connection_accounting().await;
        let privilege = adapter.privilege().await;
        let replication = adapter.replication_topology().await;

        let row_estimate = match &scope.table {
            Some(table) => {
                let estimate = adapter
                    .row_count_estimate(table, scope.database.as_deref())
                    .await;
                Some(RowEstimateReport {
                    table: table.clone(),
                    database: scope.database.clone(),
                    estimate,
                })
            }
            None => None,
        };

        Self {
            uri: adapter.endpoint().redacted(),
            kind: adapter.kind(),
            summary: adapter.summary(),
            cli: adapter.cli_name().to_string(),
            capabilities: adapter.capabilities(),
            reachable,
            address,
            identity,
            usage,
            database_count,
            databases,
            tables,
            connection_accounting,
            privilege,
            replication,
            row_estimate,
            connection_error: adapter.connection_error(),
        }
    }
}
