//! Error taxonomy for query construction and execution.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

use crate::predicate::Predicate;
use crate::value::ValueKind;
use crate::VertexId;

/// Errors raised while building or executing a multi-vertex query.
///
/// Structural errors (`FrozenSpec`, `EmptyAnchorSet`, clause validation) are
/// returned before the backend is contacted. Per-anchor errors
/// (`BackendUnavailable`, evaluation-time `TypeMismatch` / `NotComparable`)
/// are stored in that anchor's result slot, which is why this type is `Clone`.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("query specification is frozen: execution has already started")]
    FrozenSpec,

    #[error("no anchor vertices were supplied")]
    EmptyAnchorSet,

    #[error("predicate {predicate} cannot be applied to a {found} value")]
    TypeMismatch {
        predicate: Predicate,
        found: ValueKind,
    },

    #[error("values of kind {left} and {right} have no natural ordering")]
    NotComparable { left: ValueKind, right: ValueKind },

    #[error("interval start {start} is greater than end {end}")]
    InvalidInterval { start: String, end: String },

    #[error("invalid pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("unknown schema element `{name}`: {reason}")]
    UnknownSchemaElement { name: String, reason: String },

    #[error("backend unavailable for anchor {anchor}: {source}")]
    BackendUnavailable {
        anchor: VertexId,
        #[source]
        source: BackendError,
    },

    #[error("execution for anchor {anchor} was cancelled")]
    Cancelled { anchor: VertexId },
}

impl QueryError {
    pub(crate) fn unknown_schema(name: impl Into<String>, reason: impl Into<String>) -> Self {
        QueryError::UnknownSchemaElement {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to a single anchor rather than the query.
    pub fn is_per_anchor(&self) -> bool {
        matches!(
            self,
            QueryError::BackendUnavailable { .. }
                | QueryError::Cancelled { .. }
                | QueryError::TypeMismatch { .. }
                | QueryError::NotComparable { .. }
        )
    }
}

/// Failure reported by an [`AdjacencyLookup`](crate::AdjacencyLookup)
/// implementation. Surfaced unchanged in the anchor's slot.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Arc<dyn StdError + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Arc::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
