use std::collections::HashMap;

use uriprobe_core::{
    AccessLevel, AccessTier, ConnectionAccounting, ConnectionUsage, DatabaseSummary, Identity,
    ReplicationStatus,
};

use crate::session::Reply;

/// `INFO` output as a flat field map; section headers are dropped.
pub type Info = HashMap<String, String>;

pub fn parse_info(text: &str) -> Info {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn field<'a>(info: &'a Info, key: &str) -> Option<&'a str> {
    info.get(key).map(String::as_str)
}

fn number(info: &Info, key: &str) -> Option<u64> {
    field(info, key).and_then(|value| value.trim().parse().ok())
}

pub fn map_identity(info: &Info, database: Option<String>, user: Option<String>) -> Option<Identity> {
    let version = field(info, "redis_version")?;
    let os = field(info, "os").unwrap_or("unknown OS");
    let mut text = format!("Redis {version} on {os}");
    if let Some(compiler) = field(info, "gcc_version").filter(|v| !v.is_empty() && *v != "0.0.0") {
        text.push_str(&format!(", compiled by {compiler}"));
    }
    if let Some(bits) = field(info, "arch_bits") {
        text.push_str(&format!(", {bits}-bit"));
    }
    Some(Identity {
        version: text,
        database,
        user,
    })
}

/// Used memory against `maxmemory`; a zero limit means unbounded.
pub fn map_usage(info: &Info) -> Option<String> {
    let used_human = field(info, "used_memory_human")?;
    let used = number(info, "used_memory")?;
    match number(info, "maxmemory").filter(|max| *max > 0) {
        Some(max) => {
            let max_human = field(info, "maxmemory_human").unwrap_or("?");
            let percent = used as f64 / max as f64 * 100.0;
            Some(format!("{used_human} of {max_human} used ({percent:.2}%)"))
        }
        None => Some(format!("{used_human} used (no maxmemory limit)")),
    }
}

/// One summary per `dbN` keyspace line. The key count doubles as the
/// size rank so the listing sorts by key count.
pub fn map_keyspace(info: &Info) -> Vec<DatabaseSummary> {
    let mut databases: Vec<DatabaseSummary> = info
        .iter()
        .filter(|(name, _)| is_keyspace_name(name))
        .map(|(name, stats)| {
            let keys = keyspace_stat(stats, "keys").unwrap_or(0);
            let expires = keyspace_stat(stats, "expires").unwrap_or(0);
            DatabaseSummary {
                name: name.clone(),
                size: format!("{keys} keys ({expires} expiring)"),
                raw_size: keys,
                object_count: Some(keys),
            }
        })
        .collect();
    databases.sort_by(|a, b| a.name.cmp(&b.name));
    databases
}

fn is_keyspace_name(name: &str) -> bool {
    name.strip_prefix("db")
        .is_some_and(|index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
}

fn keyspace_stat(stats: &str, key: &str) -> Option<u64> {
    stats
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == key)
        .and_then(|(_, value)| value.parse().ok())
}

pub fn map_clients(info: &Info) -> Option<ConnectionAccounting> {
    let current = number(info, "connected_clients")?;
    Some(ConnectionAccounting::Measured {
        user: None,
        global: ConnectionUsage {
            current,
            limit: number(info, "maxclients").filter(|limit| *limit > 0),
        },
    })
}

/// A master, or any node feeding replicas, replicates. A replica with no
/// downstream replicas of its own does not.
pub fn map_replication(info: &Info) -> ReplicationStatus {
    let Some(role) = field(info, "role") else {
        return ReplicationStatus::Unknown;
    };
    let feeds_replicas = number(info, "connected_slaves").is_some_and(|count| count > 0);
    ReplicationStatus::from_flag(role.eq_ignore_ascii_case("master") || feeds_replicas)
}

/// Command categories effectively granted after applying ACL rules in order.
#[derive(Debug, Default, Clone, Copy)]
struct Grants {
    all: bool,
    admin: bool,
    dangerous: bool,
    write: bool,
    read: bool,
    /// Some command or untracked category was taken away after a grant.
    narrowed: bool,
}

impl Grants {
    fn everything() -> Self {
        Self {
            all: true,
            admin: true,
            dangerous: true,
            write: true,
            read: true,
            narrowed: false,
        }
    }

    fn from_rules(commands: &str) -> Self {
        let mut grants = Self::default();
        for rule in commands.split_whitespace() {
            match rule {
                "+@all" | "allcommands" => grants = Self::everything(),
                "-@all" | "nocommands" => grants = Self::default(),
                _ => {
                    let (allow, name) = match (rule.strip_prefix('+'), rule.strip_prefix('-')) {
                        (Some(name), _) => (true, name),
                        (_, Some(name)) => (false, name),
                        _ => continue,
                    };
                    if allow {
                        if let Some(flag) = grants.category(name) {
                            *flag = true;
                        }
                        continue;
                    }
                    grants.all = false;
                    match grants.category(name) {
                        Some(flag) => *flag = false,
                        None => grants.narrowed = true,
                    }
                }
            }
        }
        grants
    }

    /// Flag for a tracked `@category`; commands and other categories have none.
    fn category(&mut self, name: &str) -> Option<&mut bool> {
        match name {
            "@admin" => Some(&mut self.admin),
            "@dangerous" => Some(&mut self.dangerous),
            "@write" => Some(&mut self.write),
            "@read" => Some(&mut self.read),
            _ => None,
        }
    }
}

/// Classify an `ACL GETUSER` reply by its command rules, applied in order.
///
/// `None` when the rules do not settle the tier; administrative grants
/// with individual commands carved out are left to the next rung.
pub fn classify_acl(reply: Reply) -> Option<AccessLevel> {
    let items = reply.into_array();
    let commands = items
        .chunks(2)
        .find(|pair| pair.first().and_then(Reply::as_text) == Some("commands"))
        .and_then(|pair| pair.get(1))
        .and_then(Reply::as_text)?;
    let grants = Grants::from_rules(commands);

    if grants.all {
        return Some(AccessLevel::new(
            AccessTier::Administrator,
            "Administrator (all commands)",
        ));
    }
    if grants.admin || grants.dangerous {
        if grants.narrowed {
            return None;
        }
        return Some(AccessLevel::new(
            AccessTier::PowerUser,
            "Power user (administrative commands)",
        ));
    }
    if grants.write {
        return Some(AccessLevel::new(AccessTier::ReadWrite, "Read-write access"));
    }
    if grants.read {
        return Some(AccessLevel::new(AccessTier::ReadOnly, "Read-only access"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "# Server\r\nredis_version:7.2.4\r\nos:Linux 6.1.0 x86_64\r\narch_bits:64\r\ngcc_version:12.2.0\r\n\r\n# Clients\r\nconnected_clients:7\r\nmaxclients:10000\r\n\r\n# Memory\r\nused_memory:1048576\r\nused_memory_human:1.00M\r\nmaxmemory:4194304\r\nmaxmemory_human:4.00M\r\n\r\n# Keyspace\r\ndb0:keys=12,expires=2,avg_ttl=0\r\ndb3:keys=40,expires=0,avg_ttl=0\r\n";

    #[test]
    fn version_string() {
        let info = parse_info(INFO);
        let identity = map_identity(&info, Some("db0".into()), None).unwrap();
        assert_eq!(
            identity.version,
            "Redis 7.2.4 on Linux 6.1.0 x86_64, compiled by 12.2.0, 64-bit"
        );
    }

    #[test]
    fn usage_against_maxmemory() {
        let info = parse_info(INFO);
        assert_eq!(map_usage(&info).unwrap(), "1.00M of 4.00M used (25.00%)");

        let unbounded = parse_info("used_memory:10\nused_memory_human:10B\nmaxmemory:0\n");
        assert_eq!(map_usage(&unbounded).unwrap(), "10B used (no maxmemory limit)");
    }

    #[test]
    fn keyspace_lines_become_databases() {
        let databases = map_keyspace(&parse_info(INFO));
        assert_eq!(databases.len(), 2);
        assert_eq!(databases[1].name, "db3");
        assert_eq!(databases[1].raw_size, 40);
        assert_eq!(databases[0].size, "12 keys (2 expiring)");
    }

    #[test]
    fn clients_fill_global_accounting() {
        let ConnectionAccounting::Measured { user, global } =
            map_clients(&parse_info(INFO)).unwrap()
        else {
            panic!("expected measured accounting");
        };
        assert!(user.is_none());
        assert_eq!(global.current, 7);
        assert_eq!(global.limit, Some(10_000));
    }

    #[test]
    fn replication_rule() {
        let master = parse_info("role:master\nconnected_slaves:0\n");
        assert_eq!(map_replication(&master), ReplicationStatus::Active);
        let replica = parse_info("role:slave\nconnected_slaves:0\nslave_read_only:1\n");
        assert_eq!(map_replication(&replica), ReplicationStatus::Inactive);
        assert_eq!(map_replication(&Info::new()), ReplicationStatus::Unknown);
    }

    #[test]
    fn acl_rules_classify() {
        let reply = |commands: &str| {
            Reply::Array(vec![
                Reply::Bulk("flags".into()),
                Reply::Array(vec![Reply::Bulk("on".into())]),
                Reply::Bulk("commands".into()),
                Reply::Bulk(commands.into()),
            ])
        };
        assert_eq!(
            classify_acl(reply("+@all")).unwrap().tier,
            AccessTier::Administrator
        );
        assert_eq!(
            classify_acl(reply("-@all +@read +@write")).unwrap().tier,
            AccessTier::ReadWrite
        );
        assert!(classify_acl(reply("-@all +get")).is_none());
    }

    #[test]
    fn later_acl_denials_override_earlier_grants() {
        let reply = |commands: &str| {
            Reply::Array(vec![
                Reply::Bulk("commands".into()),
                Reply::Bulk(commands.into()),
            ])
        };
        let restricted = classify_acl(reply("+@all -@admin -@dangerous -config")).unwrap();
        assert_eq!(restricted.tier, AccessTier::ReadWrite);

        assert!(classify_acl(reply("+@all -config")).is_none());
        assert!(classify_acl(reply("+@all -@all")).is_none());
        assert_eq!(
            classify_acl(reply("-@all +@read +@admin")).unwrap().tier,
            AccessTier::PowerUser
        );
        assert_eq!(
            classify_acl(reply("+@all -@write")).unwrap().tier,
            AccessTier::PowerUser
        );
    }
}
