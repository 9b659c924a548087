use uriprobe_core::{
    AccessLevel, AccessTier, ConnectionAccounting, ConnectionUsage, DatabaseSummary, Identity,
    ReplicationStatus, TableSummary,
};

use super::queries::{RawConnections, RawDatabase, RawIdentity, RawReplication, RawRole, RawTable};

const SYSTEM_DATABASES: &[&str] = &["postgres", "template0", "template1"];

pub fn is_system_database(name: &str) -> bool {
    SYSTEM_DATABASES.contains(&name)
}

pub fn map_identity(raw: RawIdentity) -> Identity {
    Identity {
        version: raw.version,
        database: raw.database,
        user: raw.user,
    }
}

pub fn map_database(raw: RawDatabase, table_count: Option<u64>) -> DatabaseSummary {
    DatabaseSummary {
        name: raw.name,
        size: raw.size,
        raw_size: raw.raw_size.max(0) as u64,
        object_count: table_count,
    }
}

/// Tables outside `public` keep their schema as a prefix.
pub fn map_tables(raw: Vec<RawTable>) -> Vec<TableSummary> {
    raw.into_iter()
        .map(|table| TableSummary {
            name: if table.schema == "public" {
                table.name
            } else {
                format!("{}.{}", table.schema, table.name)
            },
            size: table.size,
            raw_size: table.raw_size.max(0) as u64,
            row_count: Some(table.row_estimate.max(0) as u64),
        })
        .collect()
}

pub fn map_connections(raw: RawConnections) -> ConnectionAccounting {
    let global_limit = positive(raw.global_limit);
    // rolconnlimit of -1 means the role inherits the server-wide ceiling.
    let user_limit = positive(raw.user_limit).or(global_limit);
    ConnectionAccounting::Measured {
        user: Some(ConnectionUsage {
            current: raw.user_current.max(0) as u64,
            limit: user_limit,
        }),
        global: ConnectionUsage {
            current: raw.global_current.max(0) as u64,
            limit: global_limit,
        },
    }
}

fn positive(value: i64) -> Option<u64> {
    (value > 0).then_some(value as u64)
}

/// Classify role attributes, broadest first. `None` when nothing stands out.
pub fn classify_role(role: &RawRole) -> Option<AccessLevel> {
    if role.superuser {
        return Some(AccessLevel::new(AccessTier::Administrator, "Superuser (full access)"));
    }
    if role.replication {
        return Some(AccessLevel::new(
            AccessTier::PowerUser,
            "Replication user (system-level replication access)",
        ));
    }
    if role.create_db {
        return Some(AccessLevel::new(
            AccessTier::PowerUser,
            "Database creator (can create new databases)",
        ));
    }
    if role.member_of.iter().any(|name| name == "rds_superuser") {
        return Some(AccessLevel::new(
            AccessTier::PowerUser,
            "RDS Superuser (limited admin privileges)",
        ));
    }
    if role.create_role {
        return Some(AccessLevel::new(
            AccessTier::PowerUser,
            "Role manager (can create roles)",
        ));
    }
    None
}

pub fn map_replication(raw: &RawReplication) -> ReplicationStatus {
    ReplicationStatus::from_flag(raw.replication_roles || raw.replicas > 0 || raw.in_recovery)
}
