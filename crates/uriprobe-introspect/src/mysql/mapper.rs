use regex::Regex;

use uriprobe_core::{
    AccessLevel, AccessTier, ConnectionAccounting, ConnectionUsage, DatabaseSummary, Identity,
    ReplicationStatus, TableSummary, format_megabytes,
};

use super::queries::{RawConnections, RawDatabase, RawIdentity, RawReplication, RawTable};

const GLOBAL_PRIVILEGES: &[&str] = &["CREATE USER", "PROCESS", "SUPER", "RELOAD", "SHUTDOWN"];
const WRITE_PRIVILEGES: &[&str] = &["INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP"];

pub fn map_identity(raw: RawIdentity, product: &str) -> Identity {
    Identity {
        version: format!("{product} {}", raw.version),
        database: raw.database,
        user: raw.user,
    }
}

pub fn map_usage(raw_size: i64) -> String {
    format_megabytes(raw_size.max(0) as u64)
}

pub fn map_database(raw: RawDatabase) -> DatabaseSummary {
    let raw_size = raw.raw_size.max(0) as u64;
    DatabaseSummary {
        name: raw.name,
        size: format_megabytes(raw_size),
        raw_size,
        object_count: Some(raw.table_count.max(0) as u64),
    }
}

pub fn map_tables(raw: Vec<RawTable>) -> Vec<TableSummary> {
    raw.into_iter()
        .map(|table| {
            let raw_size = table.raw_size.max(0) as u64;
            TableSummary {
                name: table.name,
                size: format_megabytes(raw_size),
                raw_size,
                row_count: Some(table.row_count.max(0) as u64),
            }
        })
        .collect()
}

/// `max_user_connections = 0` means no per-user ceiling; the server limit applies.
pub fn map_connections(raw: RawConnections) -> ConnectionAccounting {
    let global_limit = (raw.global_limit > 0).then_some(raw.global_limit as u64);
    let user_limit = (raw.user_limit > 0)
        .then_some(raw.user_limit as u64)
        .or(global_limit);
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

/// Classify the text of `SHOW GRANTS`, broadest grant first.
pub fn classify_grants(grants: &[String]) -> AccessLevel {
    let text = grants.join(" ");
    let matches = |pattern: &str| {
        Regex::new(pattern)
            .map(|re| re.is_match(&text))
            .unwrap_or(false)
    };

    if matches(r"(?i)ALL PRIVILEGES ON \*\.\* TO") {
        return AccessLevel::new(AccessTier::Administrator, "Administrator (all privileges)");
    }

    if matches(r"(?i)GRANT .* ON \*\.\*") {
        let held: Vec<&str> = GLOBAL_PRIVILEGES
            .iter()
            .copied()
            .filter(|privilege| matches(&format!("(?i){privilege}")))
            .collect();
        if held.contains(&"CREATE USER") || held.contains(&"SUPER") {
            return AccessLevel::new(
                AccessTier::PowerUser,
                format!("Power user ({})", held.join(", ")),
            );
        }
        if !held.is_empty() {
            return AccessLevel::new(
                AccessTier::PowerUser,
                format!("System monitor ({})", held.join(", ")),
            );
        }
    }

    if let Some(database) = all_privileges_database(&text) {
        return AccessLevel::new(
            AccessTier::ReadWrite,
            format!("Database admin (full access to: {database})"),
        );
    }

    let write = WRITE_PRIVILEGES
        .iter()
        .any(|privilege| matches(&format!("(?i){privilege}")));
    if write {
        AccessLevel::new(AccessTier::ReadWrite, "Write access")
    } else if matches(r"(?i)SELECT") {
        AccessLevel::new(AccessTier::ReadOnly, "Read-only access")
    } else {
        AccessLevel::limited()
    }
}

fn all_privileges_database(text: &str) -> Option<String> {
    let re = Regex::new(r"(?i)ALL PRIVILEGES ON (`[^`]+`|\w+)\.").ok()?;
    let captures = re.captures(text)?;
    Some(captures.get(1)?.as_str().replace('`', ""))
}

/// Any positive signal wins; otherwise binary logging decides.
pub fn map_replication(raw: &RawReplication) -> ReplicationStatus {
    let log_bin = raw
        .log_bin
        .as_deref()
        .is_some_and(|value| value.eq_ignore_ascii_case("on"));
    ReplicationStatus::from_flag(
        raw.master_rows > 0 || raw.replica_rows > 0 || raw.replication_users > 0 || log_bin,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn global_all_privileges_is_administrator() {
        let level = classify_grants(&grants(&[
            "GRANT ALL PRIVILEGES ON *.* TO `root`@`%` WITH GRANT OPTION",
        ]));
        assert_eq!(level.tier, AccessTier::Administrator);
        assert_eq!(level.label, "Administrator (all privileges)");
    }

    #[test]
    fn global_privileges_split_power_user_from_monitor() {
        let power = classify_grants(&grants(&["GRANT SUPER, PROCESS ON *.* TO `ops`@`%`"]));
        assert_eq!(power.label, "Power user (PROCESS, SUPER)");

        let monitor = classify_grants(&grants(&["GRANT PROCESS, RELOAD ON *.* TO `mon`@`%`"]));
        assert_eq!(monitor.label, "System monitor (PROCESS, RELOAD)");
    }

    #[test]
    fn database_scoped_all_privileges() {
        let level = classify_grants(&grants(&[
            "GRANT USAGE ON *.* TO `app`@`%`",
            "GRANT ALL PRIVILEGES ON `shop`.* TO `app`@`%`",
        ]));
        assert_eq!(level.label, "Database admin (full access to: shop)");
        assert_eq!(level.tier, AccessTier::ReadWrite);
    }

    #[test]
    fn falls_through_to_write_read_and_limited() {
        let write = classify_grants(&grants(&[
            "GRANT USAGE ON *.* TO `app`@`%`",
            "GRANT SELECT, INSERT ON `shop`.* TO `app`@`%`",
        ]));
        assert_eq!(write.label, "Write access");

        let read = classify_grants(&grants(&[
            "GRANT USAGE ON *.* TO `ro`@`%`",
            "GRANT SELECT ON `shop`.* TO `ro`@`%`",
        ]));
        assert_eq!(read.tier, AccessTier::ReadOnly);

        let none = classify_grants(&grants(&["GRANT USAGE ON *.* TO `nobody`@`%`"]));
        assert_eq!(none, AccessLevel::limited());
    }

    #[test]
    fn zero_user_limit_uses_global() {
        let ConnectionAccounting::Measured { user, .. } = map_connections(RawConnections {
            user_current: 1,
            user_limit: 0,
            global_current: 5,
            global_limit: 151,
        }) else {
            panic!("expected measured accounting");
        };
        assert_eq!(user.unwrap().limit, Some(151));
    }

    #[test]
    fn binary_log_alone_counts_as_replication() {
        let raw = RawReplication {
            master_rows: 0,
            replica_rows: 0,
            replication_users: 0,
            log_bin: Some("ON".into()),
        };
        assert_eq!(map_replication(&raw), ReplicationStatus::Active);
        let raw = RawReplication {
            log_bin: Some("OFF".into()),
            ..raw
        };
        assert_eq!(map_replication(&raw), ReplicationStatus::Inactive);
    }
}
