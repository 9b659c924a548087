#![allow(dead_code)]

//! Scripted collaborators: connectors and sessions that answer from a
//! rule table and record every statement they receive.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use uriprobe_core::{BackendError, Endpoint, ProbeSettings};
use uriprobe_introspect::{Connector, KvSession, MailReply, MailSession, Reply, Row, Session, SqlSession};

/// Shared, ordered record of everything the doubles were asked to do.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, needle: &str) -> usize {
        self.entries().iter().filter(|entry| entry.contains(needle)).count()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.entries().iter().position(|entry| entry.contains(needle))
    }
}

pub fn refused() -> BackendError {
    BackendError::Io {
        kind: std::io::ErrorKind::ConnectionRefused,
        message: "connection refused".to_string(),
    }
}

pub fn settings() -> ProbeSettings {
    ProbeSettings::default()
}

pub fn endpoint(raw: &str) -> Endpoint {
    Endpoint::parse(raw).unwrap()
}

/// Connector that fails according to a plan, then builds sessions from a factory.
pub struct ScriptedConnector<S> {
    failures: Arc<Mutex<VecDeque<BackendError>>>,
    always_fail: Option<BackendError>,
    factory: Arc<dyn Fn(&Endpoint) -> S + Send + Sync>,
    connects: Arc<AtomicUsize>,
    journal: Journal,
}

impl<S: Session> ScriptedConnector<S> {
    pub fn new(journal: Journal, factory: impl Fn(&Endpoint) -> S + Send + Sync + 'static) -> Self {
        Self {
            failures: Arc::default(),
            always_fail: None,
            factory: Arc::new(factory),
            connects: Arc::default(),
            journal,
        }
    }

    /// Fail the next connects with these errors, in order.
    pub fn failing_first(self, errors: Vec<BackendError>) -> Self {
        *self.failures.lock().unwrap() = errors.into();
        self
    }

    pub fn always_failing(mut self, error: BackendError) -> Self {
        self.always_fail = Some(error);
        self
    }

    /// Count attempts into an externally owned counter.
    pub fn with_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.connects = counter;
        self
    }

    pub fn connect_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.connects)
    }
}

#[async_trait]
impl<S: Session> Connector for ScriptedConnector<S> {
    type Session = S;

    async fn connect(&self, endpoint: &Endpoint, _settings: &ProbeSettings) -> Result<S, BackendError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("connect {}", endpoint.database().unwrap_or("")));
        if let Some(err) = &self.always_fail {
            return Err(err.clone());
        }
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok((self.factory)(endpoint))
    }
}

type SqlRule = (String, Result<Vec<Row>, BackendError>);

/// SQL session answering the first rule whose pattern occurs in the statement.
/// Unmatched statements succeed with no rows.
#[derive(Clone, Default)]
pub struct SqlScript {
    rules: Arc<Mutex<Vec<SqlRule>>>,
}

impl SqlScript {
    pub fn rows(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.rules.lock().unwrap().push((pattern.to_string(), Ok(rows)));
        self
    }

    pub fn fail(self, pattern: &str, err: BackendError) -> Self {
        self.rules.lock().unwrap().push((pattern.to_string(), Err(err)));
        self
    }

    fn answer(&self, sql: &str) -> Result<Vec<Row>, BackendError> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct ScriptedSql {
    script: SqlScript,
    journal: Journal,
}

impl ScriptedSql {
    pub fn new(script: SqlScript, journal: Journal) -> Self {
        Self { script, journal }
    }
}

#[async_trait]
impl Session for ScriptedSql {
    async fn ping(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(self) -> Result<(), BackendError> {
        self.journal.push("close");
        Ok(())
    }
}

#[async_trait]
impl SqlSession for ScriptedSql {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, BackendError> {
        self.journal.push(format!("query {} {:?}", sql.trim(), params));
        self.script.answer(sql)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, BackendError> {
        self.journal.push(format!("execute {}", sql.trim()));
        self.script.answer(sql).map(|_| 0)
    }
}

pub fn sql_connector(script: SqlScript, journal: Journal) -> ScriptedConnector<ScriptedSql> {
    let session_journal = journal.clone();
    ScriptedConnector::new(journal, move |_| {
        ScriptedSql::new(script.clone(), session_journal.clone())
    })
}

/// Paged `SCAN` behaviour: `pages` pages of `keys_per_page` keys, each
/// taking `delay` to arrive.
#[derive(Clone, Copy)]
pub struct ScanPlan {
    pub pages: usize,
    pub keys_per_page: usize,
    pub delay: Duration,
}

type KvRule = (String, Result<Reply, BackendError>);

/// Key-value session keyed by the space-joined command prefix.
/// Unmatched commands reply `+OK`.
#[derive(Clone, Default)]
pub struct KvScript {
    rules: Arc<Mutex<Vec<KvRule>>>,
    scan: Option<ScanPlan>,
}

impl KvScript {
    pub fn reply(self, prefix: &str, reply: Reply) -> Self {
        self.rules.lock().unwrap().push((prefix.to_string(), Ok(reply)));
        self
    }

    pub fn fail(self, prefix: &str, err: BackendError) -> Self {
        self.rules.lock().unwrap().push((prefix.to_string(), Err(err)));
        self
    }

    pub fn scan(mut self, plan: ScanPlan) -> Self {
        self.scan = Some(plan);
        self
    }

    fn answer(&self, line: &str) -> Result<Reply, BackendError> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| Ok(Reply::Status("OK".to_string())))
    }
}

pub struct ScriptedKv {
    script: KvScript,
    journal: Journal,
}

impl ScriptedKv {
    pub fn new(script: KvScript, journal: Journal) -> Self {
        Self { script, journal }
    }
}

#[async_trait]
impl Session for ScriptedKv {
    async fn ping(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(self) -> Result<(), BackendError> {
        self.journal.push("close");
        Ok(())
    }
}

#[async_trait]
impl KvSession for ScriptedKv {
    async fn command(&mut self, args: &[&str]) -> Result<Reply, BackendError> {
        let line = args.join(" ");
        self.journal.push(line.clone());
        if let (Some(plan), Some(&"SCAN")) = (self.script.scan, args.first()) {
            tokio::time::sleep(plan.delay).await;
            let page: usize = args.get(1).and_then(|cursor| cursor.parse().ok()).unwrap_or(0);
            let next = if page + 1 >= plan.pages { 0 } else { page + 1 };
            let keys = (0..plan.keys_per_page)
                .map(|n| Reply::Bulk(format!("key:{page}:{n}")))
                .collect();
            return Ok(Reply::Array(vec![
                Reply::Bulk(next.to_string()),
                Reply::Array(keys),
            ]));
        }
        self.script.answer(&line)
    }
}

pub fn kv_connector(script: KvScript, journal: Journal) -> ScriptedConnector<ScriptedKv> {
    let session_journal = journal.clone();
    ScriptedConnector::new(journal, move |_| {
        ScriptedKv::new(script.clone(), session_journal.clone())
    })
}

type MailRule = (String, Result<MailReply, BackendError>);

/// Mail session keyed by command prefix. Unmatched commands reply `250 OK`.
#[derive(Clone, Default)]
pub struct MailScript {
    rules: Arc<Mutex<Vec<MailRule>>>,
}

impl MailScript {
    pub fn fail(self, prefix: &str, code: u16) -> Self {
        self.rules.lock().unwrap().push((
            prefix.to_string(),
            Err(BackendError::server(code, "rejected")),
        ));
        self
    }

    fn answer(&self, line: &str) -> Result<MailReply, BackendError> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| {
                Ok(MailReply {
                    code: 250,
                    lines: vec!["OK".to_string()],
                })
            })
    }
}

pub struct ScriptedMail {
    script: MailScript,
    journal: Journal,
}

#[async_trait]
impl Session for ScriptedMail {
    async fn ping(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(self) -> Result<(), BackendError> {
        self.journal.push("close");
        Ok(())
    }
}

#[async_trait]
impl MailSession for ScriptedMail {
    fn greeting(&self) -> &str {
        "mail.example.com ESMTP ready"
    }

    fn extensions(&self) -> &[String] {
        &[]
    }

    async fn command(&mut self, line: &str) -> Result<MailReply, BackendError> {
        self.journal.push(line);
        self.script.answer(line)
    }
}

pub fn mail_connector(script: MailScript, journal: Journal) -> ScriptedConnector<ScriptedMail> {
    let session_journal = journal.clone();
    ScriptedConnector::new(journal, move |_| ScriptedMail {
        script: script.clone(),
        journal: session_journal.clone(),
    })
}
