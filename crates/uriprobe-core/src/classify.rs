//! Error classification.
//!
//! Every backend family reports failures in its own vocabulary (SQLSTATE,
//! MySQL error numbers, Redis error prefixes, SMTP reply codes). The
//! classifiers here fold those into one shared set of categories so the
//! retry decision and downstream reporting stay uniform:
//! - retriable: network and transient server conditions
//! - fatal: authentication, permission and unknown-database failures
//! - anything unmapped is a non-retriable general error

use std::fmt;
use std::io;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic category shared by all backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    AuthenticationFailure,
    UnknownDatabase,
    ConnectionLimitExceeded,
    NetworkUnreachable,
    UnknownHost,
    ServerRestarting,
    ConnectionLost,
    PermissionDenied,
    GeneralError,
}

impl ErrorCategory {
    /// Whether a fresh connection attempt may succeed after a short wait.
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable
                | Self::ServerRestarting
                | Self::ConnectionLost
                | Self::ConnectionLimitExceeded
        )
    }

    /// Whether the category means the session itself is gone.
    #[inline]
    pub const fn severs_session(self) -> bool {
        matches!(
            self,
            Self::NetworkUnreachable | Self::ServerRestarting | Self::ConnectionLost
        )
    }

    /// Short human-readable label, embedded in degraded results.
    pub fn describe(self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "access denied (auth failure)",
            Self::UnknownDatabase => "unknown database",
            Self::ConnectionLimitExceeded => "connection limit exceeded",
            Self::NetworkUnreachable => "server unavailable or network error",
            Self::UnknownHost => "unknown host",
            Self::ServerRestarting => "server restarting or gone away",
            Self::ConnectionLost => "connection lost",
            Self::PermissionDenied => "permission denied",
            Self::GeneralError => "general error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Raw failure reported by a wire collaborator, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The server answered with an error code.
    #[error("server error {code}: {message}")]
    Server { code: String, message: String },
    /// Socket-level failure.
    #[error("i/o error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },
    /// The host name could not be resolved.
    #[error("cannot resolve host: {0}")]
    Resolve(String),
    /// A connect or read deadline elapsed.
    #[error("timed out: {0}")]
    Timeout(String),
    /// The peer spoke something we could not understand.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    pub fn server(code: impl ToString, message: impl Into<String>) -> Self {
        Self::Server {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Convert a socket error, recognising name-resolution failures.
    pub fn from_io(err: &io::Error) -> Self {
        let message = err.to_string();
        if is_resolution_failure(&message) {
            return Self::Resolve(message);
        }
        Self::Io {
            kind: err.kind(),
            message,
        }
    }

    /// Backend-specific code, when the server reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Server { message, .. } | Self::Io { message, .. } => message.clone(),
            Self::Resolve(message) | Self::Timeout(message) | Self::Protocol(message) => {
                message.clone()
            }
        }
    }
}

fn is_resolution_failure(message: &str) -> bool {
    let lowered = message.to_lowercase();
    [
        "failed to lookup address",
        "name or service not known",
        "nodename nor servname",
        "no such host is known",
        "temporary failure in name resolution",
        "no address associated with hostname",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}

/// Classified outcome of a failed backend operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorRecord {
    pub message: String,
    pub category: ErrorCategory,
    pub code: Option<String>,
    pub retriable: bool,
}

impl ErrorRecord {
    pub fn new(category: ErrorCategory, message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            message: message.into(),
            category,
            code,
            retriable: category.is_retriable(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{code}]: {}", self.category, self.message),
            None => write!(f, "{}: {}", self.category, self.message),
        }
    }
}

/// Maps backend errors of one family onto [`ErrorCategory`].
pub trait ErrorClassifier: Send + Sync {
    /// Look up a server-reported code. `None` means the code is not in the table.
    fn classify_code(&self, code: &str, message: &str) -> Option<ErrorCategory>;

    fn classify(&self, err: &BackendError) -> ErrorCategory {
        match err {
            BackendError::Server { code, message } => self
                .classify_code(code, message)
                .unwrap_or(ErrorCategory::GeneralError),
            BackendError::Io { kind, .. } => transport_category(*kind),
            BackendError::Resolve(_) => ErrorCategory::UnknownHost,
            BackendError::Timeout(_) => ErrorCategory::NetworkUnreachable,
            BackendError::Protocol(_) => ErrorCategory::GeneralError,
        }
    }

    fn record(&self, err: &BackendError) -> ErrorRecord {
        ErrorRecord::new(
            self.classify(err),
            err.message(),
            err.code().map(str::to_string),
        )
    }
}

fn transport_category(kind: io::ErrorKind) -> ErrorCategory {
    use io::ErrorKind;
    match kind {
        ErrorKind::ConnectionRefused
        | ErrorKind::TimedOut
        | ErrorKind::AddrNotAvailable
        | ErrorKind::HostUnreachable
        | ErrorKind::NetworkUnreachable => ErrorCategory::NetworkUnreachable,
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof => ErrorCategory::ConnectionLost,
        _ => ErrorCategory::GeneralError,
    }
}

/// SQLSTATE table for PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCodes;

impl ErrorClassifier for PostgresCodes {
    fn classify_code(&self, code: &str, _message: &str) -> Option<ErrorCategory> {
        let category = match code {
            "28P01" | "28000" => ErrorCategory::AuthenticationFailure,
            "3D000" => ErrorCategory::UnknownDatabase,
            "53300" => ErrorCategory::ConnectionLimitExceeded,
            "57P01" | "57P02" | "57P03" => ErrorCategory::ServerRestarting,
            "08001" => ErrorCategory::NetworkUnreachable,
            "08000" | "08003" | "08004" | "08006" => ErrorCategory::ConnectionLost,
            "42501" => ErrorCategory::PermissionDenied,
            _ => return None,
        };
        Some(category)
    }
}

/// Error-number table for MySQL and MariaDB (server and client codes).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlCodes;

impl ErrorClassifier for MySqlCodes {
    fn classify_code(&self, code: &str, _message: &str) -> Option<ErrorCategory> {
        let category = match code.parse::<u32>().ok()? {
            1040 | 1203 | 1226 => ErrorCategory::ConnectionLimitExceeded,
            1045 | 1698 => ErrorCategory::AuthenticationFailure,
            1049 => ErrorCategory::UnknownDatabase,
            1044 | 1142 | 1143 | 1227 => ErrorCategory::PermissionDenied,
            1053 | 2006 => ErrorCategory::ServerRestarting,
            2003 => ErrorCategory::NetworkUnreachable,
            2005 => ErrorCategory::UnknownHost,
            2013 => ErrorCategory::ConnectionLost,
            _ => return None,
        };
        Some(category)
    }
}

/// Error-prefix table for Redis.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisCodes;

impl ErrorClassifier for RedisCodes {
    fn classify_code(&self, code: &str, message: &str) -> Option<ErrorCategory> {
        let lowered = message.to_lowercase();
        let category = match code {
            "NOAUTH" | "WRONGPASS" => ErrorCategory::AuthenticationFailure,
            "NOPERM" | "READONLY" => ErrorCategory::PermissionDenied,
            "LOADING" | "MASTERDOWN" => ErrorCategory::ServerRestarting,
            "ERR" if lowered.contains("max number of clients") => {
                ErrorCategory::ConnectionLimitExceeded
            }
            "ERR" if lowered.contains("db index") => ErrorCategory::UnknownDatabase,
            "ERR" if lowered.contains("invalid password") || lowered.contains("auth") => {
                ErrorCategory::AuthenticationFailure
            }
            _ => return None,
        };
        Some(category)
    }
}

/// Reply-code table for SMTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpCodes;

impl ErrorClassifier for SmtpCodes {
    fn classify_code(&self, code: &str, message: &str) -> Option<ErrorCategory> {
        let category = match code {
            "530" | "534" | "535" | "538" => ErrorCategory::AuthenticationFailure,
            "421" if message.to_lowercase().contains("too many") => {
                ErrorCategory::ConnectionLimitExceeded
            }
            "421" => ErrorCategory::ServerRestarting,
            "502" | "550" | "553" | "554" => ErrorCategory::PermissionDenied,
            _ => return None,
        };
        Some(category)
    }
}
