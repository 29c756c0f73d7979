//! Shared execution state for one workflow run.
//!
//! `WorkflowSession` is an explicit value object passed to the orchestrator
//! and the persistence host — there are no ambient singletons. The
//! orchestrator is its sole mutator while a step is in flight; hosts only
//! touch outputs and segments of completed, non-running steps.

use crate::reviewer::ReviewVerdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle of a whole workflow run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle of a single step execution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Generating,
    Revising,
    Reviewing,
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Generating => "generating",
            StepStatus::Revising => "revising",
            StepStatus::Reviewing => "reviewing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One generation round inside a step execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepAttempt {
    /// 1-based round number
    pub round: u32,
    /// Generated output for this round
    pub output: String,
    /// Reviewer feedback, when the step has a reviewer gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critique: Option<String>,
    /// Reviewer verdict, when the step has a reviewer gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ReviewVerdict>,
}

impl StepAttempt {
    pub fn new(round: u32, output: &str) -> Self {
        Self {
            round,
            output: output.to_string(),
            critique: None,
            verdict: None,
        }
    }
}

/// Re-creatable execution record for one step.
///
/// Created fresh at the start of each step execution (discarding any prior
/// log for that step), mutated in place across rounds, and dropped only on
/// workflow reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StepExecutionLog {
    pub status: StepStatus,
    /// Accumulated output text (the latest round's output)
    #[serde(default)]
    pub output: String,
    /// Ordered rounds; the same-round slot is overwritten on re-entry
    #[serde(default)]
    pub attempts: Vec<StepAttempt>,
    /// Error message when status is Failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepExecutionLog {
    /// Record an attempt, overwriting the slot if the round was re-entered.
    pub fn record_attempt(&mut self, attempt: StepAttempt) {
        self.output = attempt.output.clone();
        match self.attempts.iter_mut().find(|a| a.round == attempt.round) {
            Some(slot) => *slot = attempt,
            None => self.attempts.push(attempt),
        }
    }

    /// Attach a review outcome to the round's attempt.
    pub fn record_review(&mut self, round: u32, critique: &str, verdict: ReviewVerdict) {
        if let Some(slot) = self.attempts.iter_mut().find(|a| a.round == round) {
            slot.critique = Some(critique.to_string());
            slot.verdict = Some(verdict);
        }
    }

    pub fn last_attempt(&self) -> Option<&StepAttempt> {
        self.attempts.last()
    }
}

/// A unit of accepted story content; the target of `apply_result`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorySegment {
    pub id: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StorySegment {
    pub fn new(title: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// The authoritative shared record for one workflow run.
///
/// Held for the lifetime of one world session, persisted alongside it, and
/// reset as a whole via [`WorkflowSession::reset`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSession {
    pub status: WorkflowStatus,
    /// Index of the step most recently driven; -1 before the run starts
    pub current_step_index: i32,
    /// Per-step execution logs, keyed by step id
    #[serde(default)]
    pub logs: HashMap<String, StepExecutionLog>,
    /// Accepted (possibly user-edited) output per step id
    #[serde(default)]
    pub step_outputs: HashMap<String, String>,
    /// Free-text directive seeding step 0's input
    #[serde(default)]
    pub story_guidance: String,
    /// Accumulated world-context digest included in every generation prompt
    #[serde(default)]
    pub world_digest: String,
    /// Accepted story content
    #[serde(default)]
    pub segments: Vec<StorySegment>,
    /// Index into `segments` that `apply_result` appends to
    #[serde(default)]
    pub active_segment: Option<usize>,
}

impl Default for WorkflowSession {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowSession {
    pub fn new() -> Self {
        Self {
            status: WorkflowStatus::Idle,
            current_step_index: -1,
            logs: HashMap::new(),
            step_outputs: HashMap::new(),
            story_guidance: String::new(),
            world_digest: String::new(),
            segments: Vec::new(),
            active_segment: None,
        }
    }

    /// Clear the run state while keeping story segments and the digest.
    /// Called at the start of a new run.
    pub fn clear_run(&mut self) {
        self.status = WorkflowStatus::Idle;
        self.current_step_index = -1;
        self.logs.clear();
        self.step_outputs.clear();
    }

    /// The single reset operation: drop everything, including segments,
    /// guidance, and digest.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn log(&self, step_id: &str) -> Option<&StepExecutionLog> {
        self.logs.get(step_id)
    }

    /// Content of the most recently created segment, if any. Used to seed
    /// step 0's input alongside the guidance.
    pub fn latest_segment_content(&self) -> Option<&str> {
        self.segments.last().map(|s| s.content.as_str())
    }

    /// Append accepted content to the active segment, creating a new one if
    /// none is selected. Returns the segment index written to.
    pub fn append_to_story(&mut self, title: &str, content: &str) -> usize {
        match self.active_segment.and_then(|i| self.segments.get_mut(i).map(|s| (i, s))) {
            Some((i, segment)) => {
                if !segment.content.is_empty() {
                    segment.content.push_str("\n\n");
                }
                segment.content.push_str(content);
                i
            }
            None => {
                self.segments.push(StorySegment::new(title, content));
                let idx = self.segments.len() - 1;
                self.active_segment = Some(idx);
                idx
            }
        }
    }
}
