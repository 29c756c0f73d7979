//! Generated-output artifacts and the append-only store that holds them.
//!
//! One artifact is created per successful step completion. Re-running a
//! step appends a new artifact; prior artifacts for that step stay
//! retrievable by id and are never superseded automatically. User edits
//! mutate `content` in place but never touch the linkage fields
//! (`source_step_id`, `created_at`).
//!
//! `SaveTracker` keeps the dirty/saving/saved autosave bookkeeping for
//! hosts that persist edits; it is a thin adapter outside the orchestrator's
//! state machine.

use crate::step::ArtifactKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// An immutable-until-edited unit of generated content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryArtifact {
    pub id: Uuid,
    pub title: String,
    pub kind: ArtifactKind,
    pub content: String,
    /// Back-reference to the producing step, not ownership: many artifacts
    /// may reference the same step across re-runs.
    pub source_step_id: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only collection of generated outputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactStore {
    artifacts: Vec<StoryArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new artifact and return its id. Never overwrites an
    /// existing artifact for the same step.
    pub fn create(
        &mut self,
        step_id: &str,
        step_name: &str,
        kind: ArtifactKind,
        content: &str,
    ) -> Uuid {
        let run = self.for_step(step_id).len() + 1;
        let title = if run == 1 {
            step_name.to_string()
        } else {
            format!("{step_name} (run {run})")
        };
        let artifact = StoryArtifact {
            id: Uuid::new_v4(),
            title,
            kind,
            content: content.to_string(),
            source_step_id: step_id.to_string(),
            created_at: Utc::now(),
        };
        let id = artifact.id;
        self.artifacts.push(artifact);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<&StoryArtifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    /// All artifacts produced by a step, oldest first.
    pub fn for_step(&self, step_id: &str) -> Vec<&StoryArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.source_step_id == step_id)
            .collect()
    }

    /// Replace an artifact's content. Last write wins; concurrent editors
    /// are not reconciled. Linkage fields are untouched. Returns false if
    /// the id is unknown.
    pub fn edit(&mut self, id: Uuid, new_content: &str) -> bool {
        match self.artifacts.iter_mut().find(|a| a.id == id) {
            Some(artifact) => {
                artifact.content = new_content.to_string();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoryArtifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn clear(&mut self) {
        self.artifacts.clear();
    }
}

/// Tri-state save indicator for a pending artifact edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Dirty,
    Saving,
    Saved,
}

#[derive(Debug)]
struct SaveEntry {
    state: SaveState,
    last_edit: Instant,
}

/// Debounced autosave bookkeeping: an edit marks the artifact dirty, and a
/// quiet period must elapse before the host commits it.
///
/// The tracker takes `Instant`s from the caller so the debounce window is
/// testable without sleeping.
#[derive(Debug)]
pub struct SaveTracker {
    quiet_period: Duration,
    entries: HashMap<Uuid, SaveEntry>,
}

impl SaveTracker {
    /// Quiet period the original UI used before committing an edit.
    pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            entries: HashMap::new(),
        }
    }

    /// Record an edit at `now`. Restarts the quiet period.
    pub fn mark_dirty(&mut self, id: Uuid, now: Instant) {
        self.entries.insert(
            id,
            SaveEntry {
                state: SaveState::Dirty,
                last_edit: now,
            },
        );
    }

    /// Dirty artifacts whose quiet period has elapsed at `now`. Each is
    /// moved to `Saving`; the host commits them and calls `mark_saved`.
    pub fn take_due(&mut self, now: Instant) -> Vec<Uuid> {
        let mut due = Vec::new();
        for (id, entry) in self.entries.iter_mut() {
            if entry.state == SaveState::Dirty
                && now.duration_since(entry.last_edit) >= self.quiet_period
            {
                entry.state = SaveState::Saving;
                due.push(*id);
            }
        }
        due
    }

    pub fn mark_saved(&mut self, id: Uuid) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.state = SaveState::Saved;
        }
    }

    /// Current state, or `Saved` for artifacts with no pending edit.
    pub fn state(&self, id: Uuid) -> SaveState {
        self.entries.get(&id).map(|e| e.state).unwrap_or(SaveState::Saved)
    }
}

impl Default for SaveTracker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_QUIET_PERIOD)
    }
}
