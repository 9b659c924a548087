use std::time::Duration;

use async_trait::async_trait;

use uriprobe_core::{
    AccessLevel, AccessTier, BackendError, Capabilities, ConnectionAccounting, DatabaseSummary,
    Endpoint, ErrorCategory, ErrorRecord, Identity, MySqlCodes, Outcome, ProbeSettings,
    ReplicationStatus, RowEstimate, TableSummary,
};

use crate::adapter::Backend;
use crate::lifecycle::ConnectionManager;
use crate::probe::{PrivilegeLadder, run_ladder};
use crate::session::{Connector, SqlSession};

mod connector;
mod mapper;
mod queries;

pub use connector::{MySqlConnector, MySqlSession};

pub const DEFAULT_PORT: u16 = 3306;

const USER_LIMIT_CODE: &str = "1226";

/// Server family behind the MySQL wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MySqlFlavor {
    MySql,
    MariaDb,
}

impl MySqlFlavor {
    /// Exact scheme match; `mysql` and `mariadb` never overlap.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "mysql" => Some(Self::MySql),
            "mariadb" => Some(Self::MariaDb),
            _ => None,
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::MySql => Capabilities::mysql(),
            Self::MariaDb => Capabilities::mariadb(),
        }
    }

    pub fn cli_name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::MariaDb => "mariadb",
        }
    }

    fn product(self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::MariaDb => "MariaDB",
        }
    }
}

pub struct MySqlBackend<C = MySqlConnector>
where
    C: Connector,
    C::Session: SqlSession,
{
    flavor: MySqlFlavor,
    conn: ConnectionManager<C>,
}

impl MySqlBackend<MySqlConnector> {
    pub fn new(flavor: MySqlFlavor, endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self::with_connector(flavor, MySqlConnector, endpoint, settings)
    }
}

impl<C> MySqlBackend<C>
where
    C: Connector,
    C::Session: SqlSession,
{
    pub fn with_connector(
        flavor: MySqlFlavor,
        connector: C,
        endpoint: Endpoint,
        settings: &ProbeSettings,
    ) -> Self {
        Self {
            flavor,
            conn: ConnectionManager::new(connector, endpoint, settings.clone(), Box::new(MySqlCodes)),
        }
    }

    pub fn flavor(&self) -> MySqlFlavor {
        self.flavor
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.conn
    }

    async fn active_role(&mut self) -> Option<String> {
        match self
            .conn
            .run(|session| Box::pin(queries::current_role(session)))
            .await
        {
            Some(Ok(role)) => role,
            _ => None,
        }
    }
}

#[async_trait]
impl<C> Backend for MySqlBackend<C>
where
    C: Connector,
    C::Session: SqlSession,
{
    fn capabilities(&self) -> Capabilities {
        self.flavor.capabilities()
    }

    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    fn cli_name(&self) -> &'static str {
        self.flavor.cli_name()
    }

    fn default_port(&self) -> u16 {
        DEFAULT_PORT
    }

    fn connect_timeout(&self) -> Duration {
        self.conn.settings().timeouts.connect()
    }

    fn connection_error(&self) -> Option<&ErrorRecord> {
        self.conn.last_error()
    }

    async fn identity(&mut self) -> Outcome<Identity> {
        let product = self.flavor.product();
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_identity(session)))
            .await
        {
            Some(Ok(Some(raw))) => Outcome::Live(mapper::map_identity(raw, product)),
            _ => Outcome::Absent,
        }
    }

    async fn usage(&mut self) -> Outcome<String> {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_schema_size(session)))
            .await
        {
            Some(Ok(Some(size))) => Outcome::Live(mapper::map_usage(size)),
            _ => Outcome::Absent,
        }
    }

    async fn databases(&mut self) -> Outcome<Vec<DatabaseSummary>> {
        match self
            .conn
            .run(|session| Box::pin(queries::list_databases(session)))
            .await
        {
            Some(Ok(raw)) => Outcome::Live(raw.into_iter().map(mapper::map_database).collect()),
            _ => Outcome::Absent,
        }
    }

    async fn tables(&mut self, database: &str) -> Outcome<Vec<TableSummary>> {
        let database = database.to_string();
        match self
            .conn
            .run(move |session| {
                Box::pin(async move { queries::list_tables(session, &database).await })
            })
            .await
        {
            Some(Ok(raw)) => Outcome::Live(mapper::map_tables(raw)),
            _ => Outcome::Absent,
        }
    }

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting> {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_connections(session)))
            .await
        {
            Some(Ok(Some(raw))) => Outcome::Live(mapper::map_connections(raw)),
            Some(Err(record)) if record.code.as_deref() == Some(USER_LIMIT_CODE) => {
                Outcome::Live(ConnectionAccounting::Unavailable {
                    category: Some(ErrorCategory::ConnectionLimitExceeded),
                    reason: "User has exceeded max_user_connections limit".to_string(),
                })
            }
            _ => Outcome::Absent,
        }
    }

    async fn privilege(&mut self) -> Outcome<AccessLevel> {
        let write_probe = self.conn.settings().privilege.write_probe;
        let level = match self
            .conn
            .run(|session| Box::pin(run_ladder(session, &MySqlLadder, &MySqlCodes, write_probe)))
            .await
        {
            Some(Ok(level)) => level,
            _ => return Outcome::Absent,
        };
        if self.flavor == MySqlFlavor::MariaDb {
            if let Some(role) = self.active_role().await {
                return Outcome::Live(level.with_suffix(&format!("Role: {role}")));
            }
        }
        Outcome::Live(level)
    }

    async fn row_estimate(&mut self, table: &str, database: Option<&str>) -> Outcome<RowEstimate> {
        let table = table.to_string();
        let database = database.map(str::to_string);
        match self
            .conn
            .run(move |session| {
                Box::pin(async move {
                    queries::row_estimate(session, &table, database.as_deref()).await
                })
            })
            .await
        {
            Some(Ok(Some(rows))) => Outcome::Live(RowEstimate::complete(rows.max(0) as u64)),
            _ => Outcome::Absent,
        }
    }

    async fn replication(&mut self) -> ReplicationStatus {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_replication(session)))
            .await
        {
            Some(Ok(raw)) => mapper::map_replication(&raw),
            _ => ReplicationStatus::Unknown,
        }
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}

struct MySqlLadder;

#[async_trait]
impl<S: SqlSession> PrivilegeLadder<S> for MySqlLadder {
    /// A grant set that only classifies as limited is inconclusive; the probes may still find more.
    async fn introspect(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        let grants = queries::list_grants(session).await?;
        let level = mapper::classify_grants(&grants);
        Ok((level.tier > AccessTier::Limited).then_some(level))
    }

    async fn admin_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.query("SELECT COUNT(*) FROM mysql.user", &[]).await?;
        Ok(Some(AccessLevel::new(
            AccessTier::PowerUser,
            "Power user (access to system tables)",
        )))
    }

    async fn write_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session
            .execute(&format!("CREATE TABLE {} (id INT)", queries::ACCESS_CHECK_TABLE))
            .await?;
        if let Err(err) = session
            .execute(&format!("DROP TABLE {}", queries::ACCESS_CHECK_TABLE))
            .await
        {
            tracing::warn!(
                event = "access_check_cleanup_failed",
                table = queries::ACCESS_CHECK_TABLE,
                error = %err,
            );
        }
        Ok(Some(AccessLevel::new(AccessTier::ReadWrite, "Write access")))
    }

    async fn read_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.query("SELECT 1", &[]).await?;
        Ok(Some(AccessLevel::new(AccessTier::ReadOnly, "Read-only access")))
    }
}
