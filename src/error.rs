// Typed errors surfaced by the media cache and the breathing driver.

use thiserror::Error;

/// Failure resolving a media asset to a local file.
///
/// `Clone` because every caller attached to a coalesced download receives the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("invalid media asset: {0}")]
    InvalidAsset(String),

    #[error("no network connectivity")]
    NoConnectivity,

    #[error("download of {key} failed after {attempts} attempts: {reason}")]
    DownloadFailed {
        key: String,
        attempts: u32,
        reason: String,
    },

    #[error("cache i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e.to_string())
    }
}

/// Rejected breathing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("{field} must be at least {min} (got {value})")]
    OutOfRange {
        field: &'static str,
        min: u32,
        value: u32,
    },
}
