//! Typed error hierarchy for the quire pipeline.
//!
//! Four enums cover the subsystems:
//! - `WorkflowError`: stage ordering and workflow lifecycle failures
//! - `GenerationError`: generation backend failures
//! - `IssueError`: invalid issue status transitions
//! - `PipelineError`: stage runs and fix batches driven by the pipeline
//!
//! `Cancelled` is shared by all of them: it is the one signal that aborts a
//! stage run and is never retried.

use thiserror::Error;

use crate::stage::Stage;

/// Cooperative cancellation observed for a context id (a manuscript id).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Operation cancelled for {context_id}")]
pub struct Cancelled {
    pub context_id: String,
}

impl Cancelled {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }
}

/// Errors from the stage state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Workflow not started for manuscript {manuscript_id}")]
    NotStarted { manuscript_id: String },

    #[error("Workflow already started for manuscript {manuscript_id}")]
    AlreadyStarted { manuscript_id: String },

    #[error("Invalid stage: {name}")]
    InvalidStage { name: String },

    #[error("Cannot run {stage}. Must complete {blocking} first.")]
    OutOfOrder { stage: Stage, blocking: Stage },

    #[error("Stage {stage} cannot move from {from} to {to}")]
    InvalidTransition {
        stage: Stage,
        from: String,
        to: String,
    },
}

impl WorkflowError {
    /// Human-readable reason, suitable for a rejection message.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Errors from a generation backend call.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Network hiccups, rate limits, non-zero exits: worth another attempt.
    #[error("Transient backend failure: {0}")]
    Transient(String),

    /// Authentication, bad requests, missing binaries: retrying will not help.
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Backend failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl GenerationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Errors from issue status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IssueError {
    #[error("Issue {id} not found in {stage}")]
    NotFound { id: u64, stage: Stage },

    #[error("Issue {id} is already applied and cannot be {action}")]
    AlreadyApplied { id: u64, action: &'static str },
}

/// Errors from the pipeline (stage runs and fix batches).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
