use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Backend family an adapter speaks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Postgres,
    Mysql,
    Mariadb,
    Redis,
    Smtp,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::Mariadb => "mariadb",
            Self::Redis => "redis",
            Self::Smtp => "smtp",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static declaration of what a backend family can report.
///
/// One value per adapter type, never per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Capabilities {
    pub kind: BackendKind,
    pub sql: bool,
    pub kv: bool,
    pub databases: bool,
    pub tables: bool,
}

impl Capabilities {
    pub const fn postgres() -> Self {
        Self {
            kind: BackendKind::Postgres,
            sql: true,
            kv: true,
            databases: true,
            tables: true,
        }
    }

    pub const fn mysql() -> Self {
        Self {
            kind: BackendKind::Mysql,
            sql: true,
            kv: true,
            databases: true,
            tables: true,
        }
    }

    pub const fn mariadb() -> Self {
        Self {
            kind: BackendKind::Mariadb,
            ..Self::mysql()
        }
    }

    pub const fn redis() -> Self {
        Self {
            kind: BackendKind::Redis,
            sql: false,
            kv: true,
            databases: true,
            tables: false,
        }
    }

    pub const fn smtp() -> Self {
        Self {
            kind: BackendKind::Smtp,
            sql: false,
            kv: true,
            databases: false,
            tables: false,
        }
    }

    /// True when the set declares no capability at all.
    pub fn is_empty(&self) -> bool {
        !(self.sql || self.kv || self.databases || self.tables)
    }
}
