use std::time::Duration;

use async_trait::async_trait;

use uriprobe_core::{
    AccessLevel, AccessTier, BackendError, Capabilities, ConnectionAccounting, DatabaseSummary,
    Endpoint, ErrorRecord, Identity, Outcome, ProbeSettings, RedisCodes, ReplicationStatus,
    RowEstimate, TableSummary,
};

use crate::adapter::Backend;
use crate::lifecycle::ConnectionManager;
use crate::probe::{PrivilegeLadder, run_ladder};
use crate::session::{Connector, KvSession};

mod client;
mod mapper;
mod queries;

pub use client::{DEFAULT_PORT, RedisConnector, RedisSession, encode_command, read_reply};
pub use mapper::Info;

pub fn handles_scheme(scheme: &str) -> bool {
    matches!(scheme, "redis" | "rediss")
}

/// Redis backend. `INFO` is read once and shared by the accessors that
/// describe the server; replication re-reads its own section.
pub struct RedisBackend<C = RedisConnector>
where
    C: Connector,
    C::Session: KvSession,
{
    conn: ConnectionManager<C>,
    info: Option<Info>,
}

impl RedisBackend<RedisConnector> {
    pub fn new(endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self::with_connector(RedisConnector, endpoint, settings)
    }
}

impl<C> RedisBackend<C>
where
    C: Connector,
    C::Session: KvSession,
{
    pub fn with_connector(connector: C, endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self {
            conn: ConnectionManager::new(connector, endpoint, settings.clone(), Box::new(RedisCodes)),
            info: None,
        }
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.conn
    }

    async fn info(&mut self) -> Option<&Info> {
        if self.info.is_none() {
            if let Some(Ok(info)) = self
                .conn
                .run(|session| Box::pin(queries::fetch_info(session, None)))
                .await
            {
                self.info = Some(info);
            }
        }
        self.info.as_ref()
    }

    fn database_label(&self) -> String {
        format!("db{}", self.conn.endpoint().database().unwrap_or("0"))
    }
}

#[async_trait]
impl<C> Backend for RedisBackend<C>
where
    C: Connector,
    C::Session: KvSession,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities::redis()
    }

    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    fn cli_name(&self) -> &'static str {
        "redis-cli"
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
        let database = Some(self.database_label());
        let user = self.conn.endpoint().user().map(str::to_string);
        let identity = self
            .info()
            .await
            .and_then(|info| mapper::map_identity(info, database, user));
        Outcome::from_option(identity)
    }

    async fn usage(&mut self) -> Outcome<String> {
        Outcome::from_option(self.info().await.and_then(mapper::map_usage))
    }

    async fn databases(&mut self) -> Outcome<Vec<DatabaseSummary>> {
        Outcome::from_option(self.info().await.map(mapper::map_keyspace))
    }

    async fn tables(&mut self, _database: &str) -> Outcome<Vec<TableSummary>> {
        Outcome::Absent
    }

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting> {
        Outcome::from_option(self.info().await.and_then(mapper::map_clients))
    }

    async fn privilege(&mut self) -> Outcome<AccessLevel> {
        let write_probe = self.conn.settings().privilege.write_probe;
        match self
            .conn
            .run(|session| Box::pin(run_ladder(session, &RedisLadder, &RedisCodes, write_probe)))
            .await
        {
            Some(Ok(level)) => Outcome::Live(level),
            _ => Outcome::Absent,
        }
    }

    /// Key count for the `table` pattern (`*` when empty), by bounded scan.
    async fn row_estimate(&mut self, table: &str, database: Option<&str>) -> Outcome<RowEstimate> {
        let pattern = if table.is_empty() { "*" } else { table }.to_string();
        let scan = self.conn.settings().scan;
        let other_database = database.filter(|db| Some(*db) != self.conn.endpoint().database());

        let estimate = match other_database {
            Some(database) => {
                // Scoped sessions are closed right after use, so a cut-off page is harmless.
                self.conn
                    .run_scoped(database, move |session| {
                        Box::pin(async move {
                            let cap = scan.time_cap();
                            queries::scan_count(session, &pattern, scan.batch, cap).await
                        })
                    })
                    .await
            }
            None => {
                let result = self
                    .conn
                    .run(move |session| {
                        Box::pin(async move {
                            let cap = scan.time_cap();
                            queries::scan_count(session, &pattern, scan.batch, cap).await
                        })
                    })
                    .await;
                match result {
                    Some(Ok(estimate)) => {
                        if estimate.timed_out {
                            self.conn.discard();
                        }
                        Some(estimate)
                    }
                    _ => None,
                }
            }
        };
        match estimate {
            Some(estimate) if estimate.timed_out => Outcome::Degraded(estimate),
            other => Outcome::from_option(other),
        }
    }

    async fn replication(&mut self) -> ReplicationStatus {
        match self
            .conn
            .run(|session| Box::pin(queries::fetch_info(session, Some("replication"))))
            .await
        {
            Some(Ok(info)) => mapper::map_replication(&info),
            _ => ReplicationStatus::Unknown,
        }
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}

struct RedisLadder;

#[async_trait]
impl<S: KvSession> PrivilegeLadder<S> for RedisLadder {
    async fn introspect(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        let Some(name) = queries::whoami(session).await? else {
            return Ok(None);
        };
        let reply = queries::acl_user(session, &name).await?;
        Ok(mapper::classify_acl(reply))
    }

    async fn admin_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.command(&["CONFIG", "GET", "maxmemory"]).await?;
        Ok(Some(AccessLevel::new(
            AccessTier::Administrator,
            "Administrator (CONFIG access)",
        )))
    }

    /// Only a key this probe created is deleted; an existing one means inconclusive.
    async fn write_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        let reply = session
            .command(&["SET", queries::ACCESS_CHECK_KEY, "1", "NX", "EX", "60"])
            .await?;
        if !reply.is_ok() {
            return Ok(None);
        }
        if let Err(err) = session.command(&["DEL", queries::ACCESS_CHECK_KEY]).await {
            tracing::warn!(
                event = "access_check_cleanup_failed",
                key = queries::ACCESS_CHECK_KEY,
                error = %err,
            );
        }
        Ok(Some(AccessLevel::new(AccessTier::ReadWrite, "Read-write access")))
    }

    async fn read_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.command(&["DBSIZE"]).await?;
        Ok(Some(AccessLevel::new(AccessTier::ReadOnly, "Read-only access")))
    }
}
