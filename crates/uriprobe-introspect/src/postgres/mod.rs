use std::time::Duration;

use async_trait::async_trait;

use uriprobe_core::{
    AccessLevel, AccessTier, BackendError, Capabilities, ConnectionAccounting, DatabaseSummary,
    Endpoint, ErrorRecord, Identity, Outcome, PostgresCodes, ProbeSettings, ReplicationStatus,
    RowEstimate, TableSummary,
};

use crate::adapter::Backend;
use crate::lifecycle::ConnectionManager;
use crate::probe::{PrivilegeLadder, run_ladder};
use crate::session::{Connector, SqlSession};

mod connector;
mod mapper;
mod queries;

pub use connector::{PgConnector, PgSession};

pub const DEFAULT_PORT: u16 = 5432;

/// Scheme predicate: anything mentioning postgres (`postgres`, `postgresql`, ...).
pub fn handles_scheme(scheme: &str) -> bool {
    scheme.contains("postgres")
}

/// PostgreSQL backend. Other databases on the same server are reached
/// through short-lived scoped sessions.
pub struct PostgresBackend<C = PgConnector>
where
    C: Connector,
    C::Session: SqlSession,
{
    conn: ConnectionManager<C>,
    current_database: Option<String>,
}

impl PostgresBackend<PgConnector> {
    pub fn new(endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self::with_connector(PgConnector, endpoint, settings)
    }
}

impl<C> PostgresBackend<C>
where
    C: Connector,
    C::Session: SqlSession,
{
    pub fn with_connector(connector: C, endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self {
            conn: ConnectionManager::new(
                connector,
                endpoint,
                settings.clone(),
                Box::new(PostgresCodes),
            ),
            current_database: None,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.conn
    }

    async fn current_database(&mut self) -> Option<String> {
        if self.current_database.is_none() {
            if let Some(Ok(Some(raw))) = self
                .conn
                .run(|session| Box::pin(queries::fetch_identity(session)))
                .await
            {
                self.current_database = raw.database;
            }
        }
        self.current_database.clone()
    }

    /// Whether `database` names the database the primary session is on.
    async fn is_current(&mut self, database: Option<&str>) -> bool {
        match database {
            None => true,
            Some(name) => self.current_database().await.as_deref() == Some(name),
        }
    }
}

#[async_trait]
impl<C> Backend for PostgresBackend<C>
where
    C: Connector,
    C::Session: SqlSession,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities::postgres()
    }

    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    fn cli_name(&self) -> &'static str {
        "psql"
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
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_identity(session)))
            .await
        {
            Some(Ok(Some(raw))) => {
                self.current_database = raw.database.clone();
                Outcome::Live(mapper::map_identity(raw))
            }
            _ => Outcome::Absent,
        }
    }

    async fn usage(&mut self) -> Outcome<String> {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_usage(session)))
            .await
        {
            Some(Ok(Some(size))) => Outcome::Live(size),
            _ => Outcome::Absent,
        }
    }

    async fn databases(&mut self) -> Outcome<Vec<DatabaseSummary>> {
        let current = self.current_database().await;
        let Some(Ok(raw)) = self
            .conn
            .run(|session| Box::pin(queries::list_databases(session)))
            .await
        else {
            return Outcome::Absent;
        };

        let mut databases = Vec::with_capacity(raw.len());
        for database in raw {
            let is_current = current.as_deref() == Some(database.name.as_str());
            if mapper::is_system_database(&database.name) && !is_current {
                continue;
            }
            let table_count = if is_current {
                match self
                    .conn
                    .run(|session| Box::pin(queries::count_tables(session)))
                    .await
                {
                    Some(Ok(count)) => Some(count),
                    _ => None,
                }
            } else {
                self.conn
                    .run_scoped(&database.name, |session| {
                        Box::pin(queries::count_tables(session))
                    })
                    .await
            };
            databases.push(mapper::map_database(database, table_count));
        }
        Outcome::Live(databases)
    }

    async fn tables(&mut self, database: &str) -> Outcome<Vec<TableSummary>> {
        let raw = if self.is_current(Some(database)).await {
            match self
                .conn
                .run(|session| Box::pin(queries::list_tables(session)))
                .await
            {
                Some(Ok(raw)) => Some(raw),
                _ => None,
            }
        } else {
            self.conn
                .run_scoped(database, |session| Box::pin(queries::list_tables(session)))
                .await
        };
        Outcome::from_option(raw.map(mapper::map_tables))
    }

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting> {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_connections(session)))
            .await
        {
            Some(Ok(Some(raw))) => Outcome::Live(mapper::map_connections(raw)),
            _ => Outcome::Absent,
        }
    }

    async fn privilege(&mut self) -> Outcome<AccessLevel> {
        let write_probe = self.conn.settings().privilege.write_probe;
        match self
            .conn
            .run(|session| Box::pin(run_ladder(session, &PgLadder, &PostgresCodes, write_probe)))
            .await
        {
            Some(Ok(level)) => Outcome::Live(level),
            _ => Outcome::Absent,
        }
    }

    async fn row_estimate(&mut self, table: &str, database: Option<&str>) -> Outcome<RowEstimate> {
        let table = table.to_string();
        let other_database = match database {
            Some(name) => {
                let current = self.is_current(Some(name)).await;
                (!current).then_some(name)
            }
            None => None,
        };
        let estimate = match other_database {
            Some(name) => self
                .conn
                .run_scoped(name, move |session| {
                    Box::pin(async move { queries::row_estimate(session, &table).await })
                })
                .await
                .flatten(),
            None => match self
                .conn
                .run(move |session| {
                    Box::pin(async move { queries::row_estimate(session, &table).await })
                })
                .await
            {
                Some(Ok(estimate)) => estimate,
                _ => None,
            },
        };
        Outcome::from_option(estimate.map(|rows| RowEstimate::complete(rows.max(0) as u64)))
    }

    async fn replication(&mut self) -> ReplicationStatus {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_replication(session)))
            .await
        {
            Some(Ok(Some(raw))) => mapper::map_replication(&raw),
            _ => ReplicationStatus::Unknown,
        }
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}

struct PgLadder;

#[async_trait]
impl<S: SqlSession> PrivilegeLadder<S> for PgLadder {
    async fn introspect(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        let role = queries::fetch_role(session).await?;
        Ok(role.as_ref().and_then(mapper::classify_role))
    }

    async fn admin_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.query("SELECT COUNT(*) FROM pg_shadow", &[]).await?;
        Ok(Some(AccessLevel::new(
            AccessTier::PowerUser,
            "Power user (access to system catalogs)",
        )))
    }

    async fn write_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session
            .execute(&format!("CREATE TABLE {} (id int)", queries::ACCESS_CHECK_TABLE))
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
        Ok(Some(AccessLevel::new(
            AccessTier::ReadWrite,
            "Regular user (table management)",
        )))
    }

    async fn read_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.query("SELECT current_database()", &[]).await?;
        Ok(Some(AccessLevel::new(AccessTier::ReadOnly, "Read-only user")))
    }
}
