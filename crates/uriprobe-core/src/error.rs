use thiserror::Error;

/// Core error type shared across uriprobe crates.
///
/// Backend failures are not represented here: they are classified into
/// [`crate::ErrorRecord`] values and travel alongside the adapter instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The input is not a well-formed URI. No backend was contacted.
    #[error("invalid URI: {0}")]
    InvalidUri(String),
    /// The URI is well formed but no registered adapter claims its scheme.
    #[error("no adapter registered for scheme `{0}`")]
    NoMatchingAdapter(String),
    /// Settings could not be read or parsed.
    #[error("settings error: {0}")]
    Settings(String),
}

/// Convenience alias for results returned by uriprobe crates.
pub type Result<T> = std::result::Result<T, Error>;
