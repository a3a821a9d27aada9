//! Error types for the caseload pipeline.

use thiserror::Error;

/// Errors produced while turning a raw record into a [`NormalizedRecord`].
///
/// [`NormalizedRecord`]: crate::types::NormalizedRecord
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichError {
    /// The country or region name has no entry in the reference table.
    #[error("no subdivision named '{region}' for country '{country}'")]
    LookupFailed { country: String, region: String },

    /// A field is missing, has the wrong JSON type, or does not parse.
    #[error("field '{field}': {reason}")]
    ParseFailed { field: &'static str, reason: String },
}

impl EnrichError {
    pub(crate) fn parse(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ParseFailed {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors returned by a [`Backend`](crate::backend::Backend).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Connection refused, DNS failure, broken body, etc.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request did not complete within the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The document or response could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Returns `true` if the failure is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Serialization(_) | Self::Other(_) => false,
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A single record that could not be indexed.
#[derive(Debug, Clone, Error)]
#[error("batch {batch_id}, record {position}: {source}")]
pub struct RecordIndexError {
    pub batch_id: u64,
    /// Position of the record inside its batch (0-based).
    pub position: usize,
    #[source]
    pub source: BackendError,
}

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input file could not be read or is not a JSON array.
    #[error("input error ({path}): {reason}")]
    Input { path: String, reason: String },

    /// A record failed enrichment; the whole load is aborted.
    #[error("record {index}: {source}")]
    Enrichment {
        index: usize,
        #[source]
        source: EnrichError,
    },

    /// The startup health check failed.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(#[source] BackendError),

    /// At least one record could not be indexed (only raised on request).
    #[error("{failed} record(s) failed to index; first: {first}")]
    RecordIndex {
        failed: usize,
        first: RecordIndexError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// Every worker is gone before the expected number of batches was reported.
    #[error("workers exited after {received} of {expected} batches")]
    WorkersExited { received: usize, expected: usize },

    #[error("pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Returns `true` if the error happened before any batch was dispatched.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Input { .. }
                | Self::Enrichment { .. }
                | Self::BackendUnavailable(_)
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BackendError::Http("refused".into()).is_retryable());
        assert!(BackendError::Timeout { ms: 10 }.is_retryable());
        assert!(BackendError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(BackendError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!BackendError::Status { status: 400, body: String::new() }.is_retryable());
        assert!(!BackendError::Serialization("bad".into()).is_retryable());
    }

    #[test]
    fn record_index_error_display() {
        let e = RecordIndexError {
            batch_id: 3,
            position: 7,
            source: BackendError::Timeout { ms: 250 },
        };
        assert_eq!(e.to_string(), "batch 3, record 7: request timed out after 250ms");
    }
}
