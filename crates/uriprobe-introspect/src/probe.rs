//! Progressive privilege probing.
//!
//! The ladder walks from the most to the least privileged check and stops
//! at the first conclusive one. A refused step is a signal, not an
//! error: it is logged at debug level and the next rung is tried. A step
//! that loses the session ends the walk, since every later rung would
//! fail the same way.

use async_trait::async_trait;

use uriprobe_core::{AccessLevel, AccessTier, BackendError, ErrorClassifier};

/// Label used when the write rung is disabled and the read rung succeeds.
pub const WRITE_PROBE_SKIPPED: &str = "Read access (write probe skipped)";

/// Backend-specific rungs of the privilege ladder.
///
/// Each rung returns `Ok(Some(level))` when conclusive, `Ok(None)` when it
/// ran but proved nothing, and `Err` when the backend refused it.
#[async_trait]
pub trait PrivilegeLadder<S: Send>: Send + Sync {
    /// Read the native grant or role representation and classify it.
    async fn introspect(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError>;

    /// Attempt an operation only administrators may perform.
    async fn admin_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError>;

    /// Create a disposable object and remove it again.
    ///
    /// The removal must be issued only when the creation succeeded, and
    /// before returning.
    async fn write_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError>;

    /// The cheapest read-only operation.
    async fn read_probe(&self, session: &mut S) -> Result<Option<AccessLevel>, BackendError>;

    fn limited(&self) -> AccessLevel {
        AccessLevel::limited()
    }
}

#[derive(Debug, Clone, Copy)]
enum Rung {
    Introspect,
    Admin,
    Write,
    Read,
}

/// Walk the ladder and return the first conclusive level.
///
/// Fails only when a rung error classifies as a lost session; the caller
/// hands that error to the connection manager.
pub async fn run_ladder<S, L>(
    session: &mut S,
    ladder: &L,
    classifier: &dyn ErrorClassifier,
    write_probe: bool,
) -> Result<AccessLevel, BackendError>
where
    S: Send,
    L: PrivilegeLadder<S> + ?Sized,
{
    let rungs: &[Rung] = if write_probe {
        &[Rung::Introspect, Rung::Admin, Rung::Write, Rung::Read]
    } else {
        &[Rung::Introspect, Rung::Admin, Rung::Read]
    };

    for rung in rungs {
        let result = match rung {
            Rung::Introspect => ladder.introspect(session).await,
            Rung::Admin => ladder.admin_probe(session).await,
            Rung::Write => ladder.write_probe(session).await,
            Rung::Read => ladder.read_probe(session).await,
        };
        match result {
            Ok(Some(level)) => {
                tracing::debug!(event = "privilege_step", step = ?rung, outcome = %level);
                if !write_probe && matches!(rung, Rung::Read) {
                    return Ok(AccessLevel::new(AccessTier::ReadOnly, WRITE_PROBE_SKIPPED));
                }
                return Ok(level);
            }
            Ok(None) => {
                tracing::debug!(event = "privilege_step", step = ?rung, outcome = "inconclusive");
            }
            Err(err) if classifier.classify(&err).severs_session() => {
                tracing::debug!(event = "privilege_step", step = ?rung, outcome = "session_lost", error = %err);
                return Err(err);
            }
            Err(err) => {
                tracing::debug!(event = "privilege_step", step = ?rung, outcome = "refused", error = %err);
            }
        }
    }

    Ok(ladder.limited())
}
