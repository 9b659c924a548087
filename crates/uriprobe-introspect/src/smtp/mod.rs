use std::time::Duration;

use async_trait::async_trait;

use uriprobe_core::{
    AccessLevel, AccessTier, BackendError, Capabilities, ConnectionAccounting, DatabaseSummary,
    Endpoint, ErrorRecord, Identity, Outcome, ProbeSettings, ReplicationStatus, RowEstimate,
    SmtpCodes, TableSummary,
};

use crate::adapter::Backend;
use crate::lifecycle::ConnectionManager;
use crate::probe::{PrivilegeLadder, run_ladder};
use crate::session::{Connector, MailSession};

mod client;

pub use client::{SmtpConnector, SmtpSession, default_port, read_mail_reply};

const PROBE_SENDER: &str = "uriprobe@localhost";

pub fn handles_scheme(scheme: &str) -> bool {
    matches!(scheme, "smtp" | "smtps")
}

/// SMTP backend. Mail servers expose no catalog, so most accessors are absent.
pub struct SmtpBackend<C = SmtpConnector>
where
    C: Connector,
    C::Session: MailSession,
{
    conn: ConnectionManager<C>,
}

impl SmtpBackend<SmtpConnector> {
    pub fn new(endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self::with_connector(SmtpConnector, endpoint, settings)
    }
}

impl<C> SmtpBackend<C>
where
    C: Connector,
    C::Session: MailSession,
{
    pub fn with_connector(connector: C, endpoint: Endpoint, settings: &ProbeSettings) -> Self {
        Self {
            conn: ConnectionManager::new(connector, endpoint, settings.clone(), Box::new(SmtpCodes)),
        }
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.conn
    }
}

#[async_trait]
impl<C> Backend for SmtpBackend<C>
where
    C: Connector,
    C::Session: MailSession,
{
    fn capabilities(&self) -> Capabilities {
        Capabilities::smtp()
    }

    fn endpoint(&self) -> &Endpoint {
        self.conn.endpoint()
    }

    fn cli_name(&self) -> &'static str {
        "telnet"
    }

    fn default_port(&self) -> u16 {
        default_port(self.conn.endpoint().scheme())
    }

    fn connect_timeout(&self) -> Duration {
        self.conn.settings().timeouts.connect()
    }

    fn connection_error(&self) -> Option<&ErrorRecord> {
        self.conn.last_error()
    }

    async fn identity(&mut self) -> Outcome<Identity> {
        let endpoint = self.conn.endpoint();
        let version = format!(
            "SMTP server at {}:{}",
            endpoint.host_or_localhost(),
            endpoint.port_or(default_port(endpoint.scheme()))
        );
        let user = endpoint.user().map(str::to_string);
        // Identity needs a live greeting, not just the URI.
        if self.conn.acquire().await.is_none() {
            return Outcome::Absent;
        }
        Outcome::Live(Identity {
            version,
            database: None,
            user,
        })
    }

    /// The greeting banner stands in for a usage line.
    async fn usage(&mut self) -> Outcome<String> {
        let banner = self
            .conn
            .acquire()
            .await
            .map(|session| session.greeting().to_string())
            .filter(|greeting| !greeting.is_empty());
        Outcome::from_option(banner)
    }

    async fn databases(&mut self) -> Outcome<Vec<DatabaseSummary>> {
        Outcome::Absent
    }

    async fn tables(&mut self, _database: &str) -> Outcome<Vec<TableSummary>> {
        Outcome::Absent
    }

    async fn connection_accounting(&mut self) -> Outcome<ConnectionAccounting> {
        Outcome::Absent
    }

    async fn privilege(&mut self) -> Outcome<AccessLevel> {
        let ladder = SmtpLadder {
            authenticated: self.conn.endpoint().password().is_some(),
        };
        let write_probe = self.conn.settings().privilege.write_probe;
        match self
            .conn
            .run(move |session| {
                Box::pin(async move {
                    run_ladder(session, &ladder, &SmtpCodes, write_probe).await
                })
            })
            .await
        {
            Some(Ok(level)) => Outcome::Live(level),
            _ => Outcome::Absent,
        }
    }

    async fn row_estimate(&mut self, _table: &str, _database: Option<&str>) -> Outcome<RowEstimate> {
        Outcome::Absent
    }

    async fn replication(&mut self) -> ReplicationStatus {
        ReplicationStatus::Unknown
    }

    async fn close(&mut self) {
        self.conn.close().await;
    }
}

struct SmtpLadder {
    authenticated: bool,
}

#[async_trait]
impl<S: MailSession> PrivilegeLadder<S> for SmtpLadder {
    async fn introspect(&self, _session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        Ok(None)
    }

    async fn admin_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.command("VRFY postmaster").await?;
        Ok(Some(AccessLevel::new(
            AccessTier::Administrator,
            "Administrator (VRFY command allowed)",
        )))
    }

    /// Opens a transaction and resets it before any recipient is named.
    async fn write_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.command(&format!("MAIL FROM:<{PROBE_SENDER}>")).await?;
        if let Err(err) = session.command("RSET").await {
            tracing::warn!(event = "access_check_cleanup_failed", command = "RSET", error = %err);
        }
        let label = if self.authenticated {
            "Authenticated user (send mail)"
        } else {
            "Open submission (send mail without authentication)"
        };
        Ok(Some(AccessLevel::new(AccessTier::ReadWrite, label)))
    }

    async fn read_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError> {
        session.command("NOOP").await?;
        Ok(Some(AccessLevel::new(
            AccessTier::ReadOnly,
            "Connected (no send permission)",
        )))
    }
}
