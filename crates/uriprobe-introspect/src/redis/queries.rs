use std::time::Duration;

use tokio::time::{Instant, timeout_at};

use uriprobe_core::{BackendError, RowEstimate};

use crate::session::{KvSession, Reply};

use super::mapper::{self, Info};

pub const ACCESS_CHECK_KEY: &str = "__uriprobe_access_check";

pub async fn fetch_info<S: KvSession>(session: &mut S, section: Option<&str>) -> Result<Info, BackendError> {
    let reply = match section {
        Some(section) => session.command(&["INFO", section]).await?,
        None => session.command(&["INFO"]).await?,
    };
    let text = reply
        .as_text()
        .ok_or_else(|| BackendError::Protocol("INFO returned no text".to_string()))?;
    Ok(mapper::parse_info(text))
}

/// Count keys matching `pattern` with incremental `SCAN` pages until the
/// cursor wraps or `cap` has elapsed since the first page was sent.
///
/// On timeout the count gathered so far comes back marked partial. The
/// abandoned page may still be in flight, so the caller must not reuse
/// the session afterwards.
pub async fn scan_count<S: KvSession>(
    session: &mut S,
    pattern: &str,
    batch: u32,
    cap: Duration,
) -> Result<RowEstimate, BackendError> {
    let deadline = Instant::now() + cap;
    let batch = batch.max(1).to_string();
    let mut cursor = "0".to_string();
    let mut rows: u64 = 0;
    loop {
        let page = timeout_at(
            deadline,
            session.command(&["SCAN", &cursor, "MATCH", pattern, "COUNT", &batch]),
        )
        .await;
        let Ok(reply) = page else {
            tracing::debug!(event = "scan_time_cap_reached", rows, pattern);
            return Ok(RowEstimate::partial(rows));
        };
        let mut parts = reply?.into_array().into_iter();
        let next = parts
            .next()
            .and_then(|part| part.as_text().map(str::to_string))
            .ok_or_else(|| BackendError::Protocol("SCAN reply without cursor".to_string()))?;
        let keys = parts.next().map(Reply::into_array).unwrap_or_default();
        rows += keys.len() as u64;
        if next == "0" {
            return Ok(RowEstimate::complete(rows));
        }
        cursor = next;
    }
}

/// Name of the authenticated ACL user, when the server has ACLs.
pub async fn whoami<S: KvSession>(session: &mut S) -> Result<Option<String>, BackendError> {
    let reply = session.command(&["ACL", "WHOAMI"]).await?;
    Ok(reply.as_text().map(str::to_string))
}

pub async fn acl_user<S: KvSession>(session: &mut S, name: &str) -> Result<Reply, BackendError> {
    session.command(&["ACL", "GETUSER", name]).await
}
