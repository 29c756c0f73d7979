//! Typed error hierarchy for the Storyloom engine.
//!
//! Two top-level enums cover the two subsystems:
//! - `GatewayError` — LLM gateway transport and API failures
//! - `WorkflowError` — orchestrator precondition and state-machine violations
//!
//! Content rejection (a FAIL verdict from the reviewer) is deliberately NOT
//! an error: it is expected control flow inside the revision loop.

use thiserror::Error;

/// Errors from the LLM gateway collaborator.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("LLM credentials not configured (set {env_var} or [llm].api_key_env in loom.toml)")]
    MissingCredentials { env_var: String },

    #[error("Request to LLM gateway failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("LLM gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("LLM gateway returned an empty completion")]
    EmptyResponse,

    #[error("Generation cancelled before completion")]
    Cancelled,
}

/// Errors from the workflow orchestrator state machine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow has no steps")]
    NoSteps,

    #[error("Story guidance must not be empty")]
    EmptyGuidance,

    #[error("LLM gateway is not configured")]
    GatewayNotConfigured,

    #[error("Cannot {operation} while the workflow is {status}")]
    WrongStatus { operation: String, status: String },

    #[error("Step {index} has not completed; continue is only valid after completion")]
    StepNotCompleted { index: usize },

    #[error("Step {index} has no execution log to retry")]
    NothingToRetry { index: usize },

    #[error("Step index {index} is out of range (workflow has {len} steps)")]
    StepOutOfRange { index: usize, len: usize },

    #[error("Unknown agent id: {id}")]
    UnknownAgent { id: String },

    #[error("Cannot swap step {index} {direction}: no neighbor in that direction")]
    InvalidReorder { index: usize, direction: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Shorthand for a wrong-status rejection.
    pub fn wrong_status(operation: &str, status: impl std::fmt::Display) -> Self {
        Self::WrongStatus {
            operation: operation.to_string(),
            status: status.to_string(),
        }
    }
}
