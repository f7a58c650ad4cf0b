use std::fmt;

use thiserror::Error;

use crate::llm::LlmError;
use crate::reconcile::{AppliedAction, UnresolvedReference};

/// Errors from store and embedder operations (used by trait definitions in factbank-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// The collaborator call a reconciliation step was waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extraction,
    Embedding,
    Search,
    Decision,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Extraction => write!(f, "extraction"),
            Stage::Embedding => write!(f, "embedding"),
            Stage::Search => write!(f, "search"),
            Stage::Decision => write!(f, "decision"),
        }
    }
}

/// Errors from the memory reconciliation engine.
///
/// Failures before action application leave the store untouched. Failures
/// while applying actions carry the prefix of actions already committed;
/// those are not rolled back.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("fact extraction failed: {0}")]
    Extraction(#[source] LlmError),

    #[error("merge decision failed: {0}")]
    Decision(#[source] LlmError),

    #[error("embedding failed: {0}")]
    Embedding(#[source] RepositoryError),

    #[error("similarity store error: {0}")]
    Store(#[source] RepositoryError),

    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: Stage, after_ms: u64 },

    #[error(
        "action {action_index} references unknown {reference} ({} action(s) already applied)",
        .applied.len()
    )]
    ReferenceNotFound {
        reference: UnresolvedReference,
        action_index: usize,
        applied: Vec<AppliedAction>,
    },

    #[error(
        "action {action_index} failed after {} applied action(s): {source}",
        .applied.len()
    )]
    ApplyFailed {
        action_index: usize,
        applied: Vec<AppliedAction>,
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    /// Actions committed before the failure. Empty for pre-mutation failures.
    pub fn applied(&self) -> &[AppliedAction] {
        match self {
            ReconcileError::ReferenceNotFound { applied, .. }
            | ReconcileError::ApplyFailed { applied, .. } => applied,
            _ => &[],
        }
    }

    /// Whether the store may have been mutated before this error was raised.
    pub fn is_partial(&self) -> bool {
        !self.applied().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryId;
    use crate::reconcile::ActionKind;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_reference_not_found_reports_applied_prefix() {
        let err = ReconcileError::ReferenceNotFound {
            reference: UnresolvedReference::Temporary(7),
            action_index: 2,
            applied: vec![
                AppliedAction {
                    index: 0,
                    kind: ActionKind::Add,
                    memory_id: Some(MemoryId::from("a")),
                },
                AppliedAction {
                    index: 1,
                    kind: ActionKind::Add,
                    memory_id: Some(MemoryId::from("b")),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "action 2 references unknown temporary id 7 (2 action(s) already applied)"
        );
        assert_eq!(err.applied().len(), 2);
        assert!(err.is_partial());
    }

    #[test]
    fn test_pre_mutation_errors_have_no_applied_prefix() {
        let err = ReconcileError::Timeout {
            stage: Stage::Decision,
            after_ms: 500,
        };
        assert_eq!(err.to_string(), "decision timed out after 500ms");
        assert!(err.applied().is_empty());
        assert!(!err.is_partial());
    }

    #[test]
    fn test_apply_failed_wraps_source() {
        let err = ReconcileError::ApplyFailed {
            action_index: 0,
            applied: Vec::new(),
            source: Box::new(ReconcileError::Store(RepositoryError::Connection)),
        };
        assert!(err.to_string().contains("database connection error"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
