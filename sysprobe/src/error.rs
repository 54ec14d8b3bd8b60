//! Error types for metric sources.

use thiserror::Error;

/// Errors raised while sampling a source.
///
/// None of these escape [`MetricSource::collect`](crate::MetricSource::collect):
/// enumeration failures degrade to an empty target set and per-target usage
/// failures are logged and skipped.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The mounted filesystem table could not be read.
    #[error("Failed to enumerate partitions: {0}")]
    Enumerate(String),

    /// Usage of a single mount point could not be queried.
    #[error("{message}")]
    Usage { path: String, message: String },

    /// The blocking usage query task did not finish.
    #[error("Usage query for '{0}' was interrupted")]
    Interrupted(String),
}

impl SourceError {
    /// Create a usage error for a mount point.
    pub fn usage(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Usage {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(target_os = "linux")]
impl From<procfs::ProcError> for SourceError {
    fn from(err: procfs::ProcError) -> Self {
        Self::Enumerate(err.to_string())
    }
}
