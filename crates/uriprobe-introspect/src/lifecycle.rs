//! Connection lifecycle for a single adapter instance.
//!
//! The manager owns at most one primary session. It connects lazily,
//! reuses the handle while it answers pings, retries retriable failures
//! with exponential backoff and records the last classified error so that
//! accessors can explain why a connection is absent.

use std::future::Future;
use std::mem;
use std::pin::Pin;

use uriprobe_core::{BackendError, Endpoint, ErrorClassifier, ErrorRecord, ProbeSettings};

use crate::session::{Connector, Session};

/// Boxed future borrowing a session for the duration of one operation.
pub type SessionFuture<'s, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 's>>;

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unconnected,
    Connecting,
    Connected,
    Failed,
    Closed,
}

enum State<S> {
    Unconnected,
    Connecting,
    Connected(S),
    Failed(ErrorRecord),
    Closed,
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    endpoint: Endpoint,
    settings: ProbeSettings,
    classifier: Box<dyn ErrorClassifier>,
    state: State<C::Session>,
    last_error: Option<ErrorRecord>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        endpoint: Endpoint,
        settings: ProbeSettings,
        classifier: Box<dyn ErrorClassifier>,
    ) -> Self {
        Self {
            connector,
            endpoint,
            settings,
            classifier,
            state: State::Unconnected,
            last_error: None,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            State::Unconnected => Phase::Unconnected,
            State::Connecting => Phase::Connecting,
            State::Connected(_) => Phase::Connected,
            State::Failed(_) => Phase::Failed,
            State::Closed => Phase::Closed,
        }
    }

    /// The most recent classified connection failure, kept after the phase moves on.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    pub fn classify(&self, err: &BackendError) -> ErrorRecord {
        self.classifier.record(err)
    }

    /// Return a live session, connecting if needed.
    ///
    /// `None` is a normal outcome: the endpoint is closed, a fatal error was
    /// recorded earlier, or every attempt failed.
    pub async fn acquire(&mut self) -> Option<&mut C::Session> {
        match mem::replace(&mut self.state, State::Unconnected) {
            State::Closed => {
                self.state = State::Closed;
                return None;
            }
            State::Failed(record) if !record.retriable => {
                self.state = State::Failed(record);
                return None;
            }
            State::Connected(mut session) => match session.ping().await {
                Ok(()) => self.state = State::Connected(session),
                Err(err) => {
                    let record = self.classifier.record(&err);
                    tracing::debug!(
                        event = "session_stale",
                        endpoint = %self.endpoint,
                        category = ?record.category,
                        message = %record.message,
                    );
                    close_quietly(session, &self.endpoint).await;
                }
            },
            // A cancelled connect leaves `Connecting` behind; start over.
            State::Unconnected | State::Connecting | State::Failed(_) => {}
        }

        if !matches!(self.state, State::Connected(_)) {
            self.connect().await;
        }

        match &mut self.state {
            State::Connected(session) => Some(session),
            _ => None,
        }
    }

    async fn connect(&mut self) {
        self.state = State::Connecting;
        let policy = self.settings.retry;
        let mut failures = 0u32;

        loop {
            tracing::debug!(
                event = "connect_attempt",
                endpoint = %self.endpoint,
                attempt = failures + 1,
                max_attempts = policy.max_attempts,
            );

            let err = match self.connector.connect(&self.endpoint, &self.settings).await {
                Ok(mut session) => match session.validate().await {
                    Ok(()) => {
                        tracing::debug!(event = "connected", endpoint = %self.endpoint);
                        self.last_error = None;
                        self.state = State::Connected(session);
                        return;
                    }
                    Err(err) => {
                        close_quietly(session, &self.endpoint).await;
                        err
                    }
                },
                Err(err) => err,
            };

            let record = self.classifier.record(&err);
            failures += 1;
            tracing::debug!(
                event = "connect_failed",
                endpoint = %self.endpoint,
                attempt = failures,
                category = ?record.category,
                code = record.code.as_deref().unwrap_or(""),
                retriable = record.retriable,
                message = %record.message,
            );

            if !record.retriable || !policy.allows_retry(failures) {
                self.last_error = Some(record.clone());
                self.state = State::Failed(record);
                return;
            }

            let delay = policy.delay_for_attempt(failures - 1);
            tracing::debug!(
                event = "retry_backoff",
                endpoint = %self.endpoint,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Run `op` against the primary session.
    ///
    /// `None` means no connection could be acquired. A failed operation is
    /// classified through [`Self::note_failure`] and returned as its record.
    pub async fn run<T, F>(&mut self, op: F) -> Option<Result<T, ErrorRecord>>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut C::Session) -> SessionFuture<'s, T> + Send,
    {
        let session = self.acquire().await?;
        let result = op(session).await;
        Some(match result {
            Ok(value) => Ok(value),
            Err(err) => Err(self.note_failure(&err).await),
        })
    }

    /// Run `op` on a temporary session scoped to `database`, then close it.
    pub async fn run_scoped<T, F>(&mut self, database: &str, op: F) -> Option<T>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut C::Session) -> SessionFuture<'s, T> + Send,
    {
        let mut session = self.open_scoped(database).await?;
        let result = op(&mut session).await;
        close_quietly(session, &self.endpoint).await;
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                let record = self.classifier.record(&err);
                tracing::debug!(
                    event = "scoped_operation_failed",
                    database,
                    category = ?record.category,
                    message = %record.message,
                );
                None
            }
        }
    }

    /// Classify a failure raised by an operation on the current session.
    ///
    /// Connection-level categories drop the handle so the next call
    /// reconnects.
    pub async fn note_failure(&mut self, err: &BackendError) -> ErrorRecord {
        let record = self.classifier.record(err);
        tracing::debug!(
            event = "operation_failed",
            endpoint = %self.endpoint,
            category = ?record.category,
            code = record.code.as_deref().unwrap_or(""),
            message = %record.message,
        );
        if record.category.severs_session() && matches!(self.state, State::Connected(_)) {
            if let State::Connected(session) = mem::replace(&mut self.state, State::Unconnected) {
                close_quietly(session, &self.endpoint).await;
            }
        }
        record
    }

    /// Drop the primary handle without a shutdown exchange.
    ///
    /// Used after an abandoned operation, when the stream may hold a
    /// half-read reply.
    pub fn discard(&mut self) {
        if matches!(self.state, State::Connected(_) | State::Connecting) {
            tracing::debug!(event = "session_discarded", endpoint = %self.endpoint);
            self.state = State::Unconnected;
        }
    }

    /// Open a separate, single-attempt session scoped to another database.
    ///
    /// The caller owns the returned session and must close it.
    pub async fn open_scoped(&mut self, database: &str) -> Option<C::Session> {
        let scoped = self.endpoint.with_database(database);
        let result = match self.connector.connect(&scoped, &self.settings).await {
            Ok(mut session) => match session.validate().await {
                Ok(()) => Ok(session),
                Err(err) => {
                    close_quietly(session, &scoped).await;
                    Err(err)
                }
            },
            Err(err) => Err(err),
        };
        match result {
            Ok(session) => Some(session),
            Err(err) => {
                let record = self.classifier.record(&err);
                tracing::debug!(
                    event = "scoped_connect_failed",
                    endpoint = %scoped,
                    category = ?record.category,
                    message = %record.message,
                );
                None
            }
        }
    }

    /// Shut the primary session down. Terminal; errors are logged and dropped.
    pub async fn close(&mut self) {
        if let State::Connected(session) = mem::replace(&mut self.state, State::Closed) {
            close_quietly(session, &self.endpoint).await;
        }
    }
}

pub(crate) async fn close_quietly<S: Session>(session: S, endpoint: &Endpoint) {
    if let Err(err) = session.close().await {
        tracing::debug!(event = "close_failed", endpoint = %endpoint, error = %err);
    }
}
