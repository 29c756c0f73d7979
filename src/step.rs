//! Workflow step definitions.
//!
//! Steps form a strict total order: the vector index is the execution order.
//! Reordering swaps adjacent indices and never renumbers ids, so logs,
//! outputs, and artifacts keyed by step id survive a reorder.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output artifact type tag for a step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Markdown,
    Text,
    Code,
    Json,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::Markdown => "markdown",
            ArtifactKind::Text => "text",
            ArtifactKind::Code => "code",
            ArtifactKind::Json => "json",
        };
        write!(f, "{s}")
    }
}

/// Reviewer gate configuration for a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepValidation {
    /// Agent that grades the output (may equal the generating agent)
    pub reviewer_id: String,
    /// Free-text pass/fail criteria handed to the reviewer
    pub criteria: String,
    /// Maximum automatic revision rounds after the first generation.
    /// Zero means the single pass is still reviewed, but the verdict is
    /// advisory only and never triggers a revision.
    #[serde(default)]
    pub max_retries: u32,
}

impl StepValidation {
    pub fn new(reviewer_id: &str, criteria: &str, max_retries: u32) -> Self {
        Self {
            reviewer_id: reviewer_id.to_string(),
            criteria: criteria.to_string(),
            max_retries,
        }
    }
}

/// One ordered unit of work in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    /// Stable id; survives reordering
    pub id: String,
    /// Display name
    pub name: String,
    /// Agent persona that executes this step
    pub agent_id: String,
    /// Free-text instruction for the agent
    pub instruction: String,
    /// Optional reviewer gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<StepValidation>,
    /// Optional output artifact type tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_kind: Option<ArtifactKind>,
}

impl WorkflowStep {
    /// Create a step with a fresh id and no reviewer gate.
    pub fn new(name: &str, agent_id: &str, instruction: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            agent_id: agent_id.to_string(),
            instruction: instruction.to_string(),
            validation: None,
            artifact_kind: None,
        }
    }

    pub fn with_validation(mut self, validation: StepValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_artifact_kind(mut self, kind: ArtifactKind) -> Self {
        self.artifact_kind = Some(kind);
        self
    }

    /// Generation rounds this step may perform: one pass plus the revision
    /// budget when a reviewer gate is configured.
    pub fn max_rounds(&self) -> u32 {
        match &self.validation {
            Some(v) => v.max_retries + 1,
            None => 1,
        }
    }
}

/// Default three-step workflow used when a world has no steps configured yet.
pub fn default_workflow() -> Vec<WorkflowStep> {
    vec![
        WorkflowStep::new(
            "Concept",
            "concept-writer",
            "Develop a story concept from the guidance: premise, conflict, and themes.",
        )
        .with_artifact_kind(ArtifactKind::Markdown),
        WorkflowStep::new(
            "Outline",
            "outliner",
            "Turn the concept into a scene-by-scene outline.",
        )
        .with_validation(StepValidation::new(
            "story-editor",
            "Every scene names a viewpoint character and produces a concrete change. \
             The outline covers the full arc of the concept.",
            2,
        ))
        .with_artifact_kind(ArtifactKind::Markdown),
        WorkflowStep::new(
            "Prose",
            "prose-writer",
            "Write the full prose of the segment from the outline.",
        )
        .with_validation(StepValidation::new(
            "story-editor",
            "The prose follows the outline, keeps continuity with the world digest, \
             and contains no placeholder text.",
            1,
        ))
        .with_artifact_kind(ArtifactKind::Markdown),
    ]
}
