//! Glue shared by the sqlx-backed sessions.

use std::future::Future;
use std::time::Duration;

use sqlx::error::DatabaseError;

use uriprobe_core::BackendError;

/// Convert a sqlx error, using `code_of` to extract the backend-specific code.
pub(crate) fn from_sqlx<F>(err: sqlx::Error, code_of: F) -> BackendError
where
    F: FnOnce(&dyn DatabaseError) -> Option<String>,
{
    match err {
        sqlx::Error::Database(db) => {
            let code = code_of(db.as_ref()).unwrap_or_default();
            BackendError::server(code, db.message())
        }
        sqlx::Error::Io(io) => BackendError::from_io(&io),
        sqlx::Error::PoolTimedOut => BackendError::Timeout("pool timed out".to_string()),
        other => BackendError::Protocol(other.to_string()),
    }
}

/// Bound one sqlx call by `limit`.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    what: &str,
    fut: F,
    convert: impl FnOnce(sqlx::Error) -> BackendError,
) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(convert),
        Err(_) => Err(BackendError::Timeout(what.to_string())),
    }
}
