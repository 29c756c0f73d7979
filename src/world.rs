//! The persisted world document: everything a project needs to resume.
//!
//! One JSON file (`.loom/world.json`) holds the agent roster, the step
//! list, the full session (logs, outputs, story segments), and the
//! artifact store. Because every field of the session is serialized, a
//! process can exit at any step boundary and resume exactly where it
//! paused.

use crate::agent::{default_agents, AgentRoster};
use crate::artifact::ArtifactStore;
use crate::session::WorkflowSession;
use crate::step::{default_workflow, WorkflowStep};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Serialized project state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldFile {
    pub agents: AgentRoster,
    pub workflow: Vec<WorkflowStep>,
    pub session: WorkflowSession,
    #[serde(default)]
    pub artifacts: ArtifactStore,
    pub saved_at: DateTime<Utc>,
}

impl WorldFile {
    /// Fresh world with the stock agents and the stock three-step workflow.
    pub fn new() -> Self {
        Self {
            agents: AgentRoster::new(default_agents()),
            workflow: default_workflow(),
            session: WorkflowSession::new(),
            artifacts: ArtifactStore::new(),
            saved_at: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read world file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse world file {}", path.display()))
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.saved_at = Utc::now();
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize world to JSON")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write world file {}", path.display()))?;
        Ok(())
    }
}

impl Default for WorldFile {
    fn default() -> Self {
        Self::new()
    }
}
