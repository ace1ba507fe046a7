//! Error taxonomy for leak detection

use crate::report::LeakReport;

/// Errors produced by detectors and dump sources
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Tasks beyond the baseline survived every settle retry
    #[error("{0}")]
    LeakDetected(LeakReport),

    /// The host cannot provide a task dump at all (e.g. no `/proc`)
    #[error("task dump source '{source_name}' unavailable: {reason}")]
    SourceUnavailable {
        source_name: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The leak report, if this error is a detected leak
    pub fn report(&self) -> Option<&LeakReport> {
        match self {
            Error::LeakDetected(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_leak(&self) -> bool {
        matches!(self, Error::LeakDetected(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
