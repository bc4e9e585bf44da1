//! Error taxonomy for the analysis pipeline
//!
//! Malformed input aborts the load of the offending source. Configuration
//! problems are raised before any log is read. An analysis that simply
//! finds nothing is not an error; see [`crate::AnalysisResults::uncovered_pairs`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the analysis library
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A log line could not be turned into a decoding step record
    #[error("malformed log {source_name} at line {line}: {message}")]
    MalformedLog {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Invalid threshold, label, or pair requested by the caller
    #[error("invalid configuration: {message}")]
    Configuration { message: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The chart payload could not be serialized for the sink
    #[error("sink error while {context}: {source}")]
    Sink {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl AnalysisError {
    pub(crate) fn malformed(
        source_name: impl Into<String>,
        line: usize,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::MalformedLog {
            source_name: source_name.into(),
            line,
            message: message.to_string(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn sink(context: &'static str, source: serde_json::Error) -> Self {
        Self::Sink { context, source }
    }

    /// True for errors raised before any data was touched
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, AnalysisError>;
