//! Collaborator contracts for the wire clients.
//!
//! Adapters only ever talk to a backend through these traits, which keeps
//! the probing logic testable against scripted sessions.

use async_trait::async_trait;

use uriprobe_core::{BackendError, Endpoint, ProbeSettings};

/// Loosely typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(flag) => Some(flag.to_string()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Text(text) => Some(text.clone()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Null => None,
            Self::Bool(flag) => Some(i64::from(*flag)),
            Self::Int(value) => Some(*value),
            Self::Float(value) => Some(*value as i64),
            Self::Text(text) => {
                let trimmed = text.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().map(|value| value as i64))
            }
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Null => None,
            Self::Bool(flag) => Some(*flag),
            Self::Int(value) => Some(*value != 0),
            Self::Float(value) => Some(*value != 0.0),
            Self::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "y" | "yes" | "on" | "1" => Some(true),
                "f" | "false" | "n" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One result row, addressed by column name (case-insensitive) or position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn at(&self, index: usize) -> Option<&Value> {
        self.columns.get(index).map(|(_, value)| value)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(Value::as_text)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_flag)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// RESP reply tree. Error replies never appear here; they surface as
/// [`BackendError::Server`] with the error prefix as code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Nil,
    Status(String),
    Integer(i64),
    Bulk(String),
    Array(Vec<Reply>),
}

impl Reply {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Status(text) | Self::Bulk(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Status(text) | Self::Bulk(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn into_array(self) -> Vec<Reply> {
        match self {
            Self::Array(items) => items,
            Self::Nil => Vec::new(),
            other => vec![other],
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Status(text) if text.eq_ignore_ascii_case("OK"))
    }
}

/// Reply to one SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl MailReply {
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// A live session owned by exactly one connection manager.
#[async_trait]
pub trait Session: Send + Sized + 'static {
    /// Lightweight liveness check used before reusing the handle.
    async fn ping(&mut self) -> Result<(), BackendError>;

    /// Cheap validation query run once right after connecting.
    async fn validate(&mut self) -> Result<(), BackendError> {
        self.ping().await
    }

    async fn close(self) -> Result<(), BackendError>;
}

#[async_trait]
pub trait SqlSession: Session {
    async fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>, BackendError>;

    async fn execute(&mut self, sql: &str) -> Result<u64, BackendError>;

    async fn query_one(&mut self, sql: &str, params: &[&str]) -> Result<Option<Row>, BackendError> {
        Ok(self.query(sql, params).await?.into_iter().next())
    }
}

#[async_trait]
pub trait KvSession: Session {
    async fn command(&mut self, args: &[&str]) -> Result<Reply, BackendError>;
}

#[async_trait]
pub trait MailSession: Session {
    fn greeting(&self) -> &str;

    /// EHLO keywords advertised by the server, upper-cased.
    fn extensions(&self) -> &[String];

    /// Send one command line. Replies with code 400 and above are errors.
    async fn command(&mut self, line: &str) -> Result<MailReply, BackendError>;
}

/// Opens sessions for one backend family.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        settings: &ProbeSettings,
    ) -> Result<Self::Session, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lookup_is_case_insensitive() {
        let row = Row::from_pairs([("Variable_name", "log_bin"), ("Value", "ON")]);
        assert_eq!(row.text("value").as_deref(), Some("ON"));
        assert_eq!(row.flag("VALUE"), Some(true));
        assert_eq!(row.int("missing"), None);
    }

    #[test]
    fn lenient_numeric_text() {
        assert_eq!(Value::from("42").as_int(), Some(42));
        assert_eq!(Value::from(" 12.9 ").as_int(), Some(12));
        assert_eq!(Value::Null.as_int(), None);
        assert_eq!(Value::from("t").as_flag(), Some(true));
    }

    #[test]
    fn reply_helpers() {
        assert!(Reply::Status("OK".into()).is_ok());
        assert!(!Reply::Nil.is_ok());
        assert_eq!(Reply::Bulk("17".into()).as_int(), Some(17));
        assert_eq!(Reply::Nil.into_array(), Vec::<Reply>::new());
    }
}
