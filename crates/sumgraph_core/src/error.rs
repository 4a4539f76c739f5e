//! Pipeline-level error envelope.
//!
//! Component errors are wrapped unchanged; [`PipelineError::kind`] projects
//! them onto the categories callers present to users.

use crate::aggregate::AggregateError;
use crate::artifact::ArtifactError;
use crate::store::StoreError;
use crate::table::SourceError;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing credentials or environment values.
    Configuration,
    /// Network or file read failure while loading a table.
    SourceAccess,
    /// Table structure could not be parsed.
    Format,
    /// Date bounds could not be parsed.
    InvalidRange,
    /// No row carries a valid date.
    EmptyRange,
    /// External generation failed or returned nothing usable.
    ArtifactGeneration,
    /// Correlation store could not complete the request.
    StoreUnavailable,
    /// Operation not allowed in the current pipeline state.
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::SourceAccess => "source_access",
            Self::Format => "format",
            Self::InvalidRange => "invalid_range",
            Self::EmptyRange => "empty_range",
            Self::ArtifactGeneration => "artifact_generation",
            Self::StoreUnavailable => "store_unavailable",
            Self::InvalidState => "invalid_state",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("invalid date `{0}`; expected YYYY-MM-DD")]
    InvalidRange(String),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sum {0} exceeds the exactly storable range of +/-2^53")]
    SumOutOfRange(i64),
    #[error("`{operation}` is not allowed in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Source(SourceError::Configuration(_))
            | Self::Artifact(ArtifactError::Configuration(_))
            | Self::Store(StoreError::Configuration(_)) => ErrorKind::Configuration,
            Self::Source(SourceError::Format(_)) => ErrorKind::Format,
            Self::Source(_) => ErrorKind::SourceAccess,
            Self::InvalidRange(_) | Self::SumOutOfRange(_) => ErrorKind::InvalidRange,
            Self::Aggregate(AggregateError::EmptyRange) => ErrorKind::EmptyRange,
            Self::Artifact(_) => ErrorKind::ArtifactGeneration,
            Self::Store(_) => ErrorKind::StoreUnavailable,
            Self::InvalidTransition { .. } => ErrorKind::InvalidState,
        }
    }
}
