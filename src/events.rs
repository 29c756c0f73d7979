//! Best-effort lifecycle notifications for external task trackers.
//!
//! The orchestrator reports step lifecycle events through an optional
//! `EventSink`. Sinks are infallible by construction — the engine must
//! function identically whether or not a tracker is attached, so a sink
//! that needs to fail should swallow its own errors.

use crate::session::StepStatus;

/// Lifecycle event for one step of a workflow run.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    /// A step began executing.
    Started { step_id: String, step_index: usize },
    /// A generation or review round finished inside a step.
    Progress {
        step_id: String,
        round: u32,
        status: StepStatus,
    },
    /// A step completed and the workflow paused for confirmation.
    Completed { step_id: String, step_index: usize },
    /// A step failed; the workflow paused for an explicit retry.
    Failed { step_id: String, error: String },
}

/// Observer for workflow lifecycle events.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &WorkflowEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::Started { step_id, step_index } => {
                tracing::info!(step = %step_id, index = step_index, "step started");
            }
            WorkflowEvent::Progress { step_id, round, status } => {
                tracing::debug!(step = %step_id, round, status = %status, "step progress");
            }
            WorkflowEvent::Completed { step_id, step_index } => {
                tracing::info!(step = %step_id, index = step_index, "step completed");
            }
            WorkflowEvent::Failed { step_id, error } => {
                tracing::warn!(step = %step_id, error = %error, "step failed");
            }
        }
    }
}
