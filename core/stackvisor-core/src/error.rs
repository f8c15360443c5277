//! Error types for stackvisor-core operations.
//!
//! Expected runtime conditions (dead processes, timeouts, stale acks) are never
//! surfaced as errors; they are recovered inside the supervisor and logged.

use std::path::PathBuf;

use crate::types::{ActivityId, ActivityState, DisplayId, ProcessId, StackId, TaskId};

// ═══════════════════════════════════════════════════════════════════════════════
// Scheduler Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur while addressing or mutating the hierarchy.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    // ─────────────────────────────────────────────────────────────────────
    // Lookup Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Activity not found: {0}")]
    UnknownActivity(ActivityId),

    #[error("Task not found: {0}")]
    UnknownTask(TaskId),

    #[error("Stack not found: {0}")]
    UnknownStack(StackId),

    #[error("Display not found: {0}")]
    UnknownDisplay(DisplayId),

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Illegal lifecycle transition for {activity}: {from} -> {to}")]
    InvalidTransition {
        activity: ActivityId,
        from: ActivityState,
        to: ActivityState,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration read failed: {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },
}

impl StackError {
    /// Errors that signal a scheduler bug rather than a bad request.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            StackError::InvalidTransition { .. } | StackError::InvariantViolation(_)
        )
    }
}

/// Convenience type alias for Results using StackError.
pub type Result<T> = std::result::Result<T, StackError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure reported by the transaction delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Client process {0} is dead")]
    ProcessDead(ProcessId),

    #[error("Transaction rejected by client: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_states() {
        let err = StackError::InvalidTransition {
            activity: ActivityId(3),
            from: ActivityState::Destroyed,
            to: ActivityState::Resumed,
        };
        assert_eq!(
            err.to_string(),
            "Illegal lifecycle transition for a3: destroyed -> resumed"
        );
    }

    #[test]
    fn only_lifecycle_errors_are_defects() {
        assert!(StackError::InvariantViolation("two resumed".into()).is_defect());
        assert!(!StackError::UnknownStack(StackId(1)).is_defect());
        assert!(!StackError::HomeDirNotFound.is_defect());
    }

    #[test]
    fn delivery_error_mentions_process() {
        let err = DeliveryError::ProcessDead(ProcessId(99));
        assert!(err.to_string().contains("pid99"));
    }
}
