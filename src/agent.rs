//! Agent personas and the roster that holds them.
//!
//! A `StoryAgent` is a read-only input to step execution: a named persona
//! whose system prompt conditions LLM generation. Many steps may reference
//! the same agent, including as both executor and reviewer — self-review is
//! permitted and not validated against.

use serde::{Deserialize, Serialize};

/// A named persona used to condition LLM generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryAgent {
    /// Stable agent id (e.g., "concept-writer")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Role label shown in listings (e.g., "Concept Development")
    pub role: String,
    /// System prompt establishing the persona
    pub system_prompt: String,
    /// Display color hint for hosts that render agents
    #[serde(default)]
    pub color: String,
    /// Display icon hint (emoji or glyph name)
    #[serde(default)]
    pub icon: String,
}

impl StoryAgent {
    pub fn new(id: &str, name: &str, role: &str, system_prompt: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role: role.to_string(),
            system_prompt: system_prompt.to_string(),
            color: String::new(),
            icon: String::new(),
        }
    }
}

/// The set of agents available to a workflow, with lookup by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRoster {
    pub agents: Vec<StoryAgent>,
}

impl AgentRoster {
    pub fn new(agents: Vec<StoryAgent>) -> Self {
        Self { agents }
    }

    pub fn get(&self, id: &str) -> Option<&StoryAgent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoryAgent> {
        self.agents.iter()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Default roster used when a world has no agents configured yet.
pub fn default_agents() -> Vec<StoryAgent> {
    vec![
        StoryAgent {
            id: "concept-writer".into(),
            name: "Concept Writer".into(),
            role: "Concept Development".into(),
            system_prompt: "You develop story concepts: premise, central conflict, \
                            themes, and the emotional core. Write vivid, specific \
                            concepts grounded in the world's established facts."
                .into(),
            color: "#7c5cff".into(),
            icon: "✨".into(),
        },
        StoryAgent {
            id: "outliner".into(),
            name: "Outliner".into(),
            role: "Structure".into(),
            system_prompt: "You turn story concepts into scene-by-scene outlines. \
                            Every scene names its viewpoint character, setting, and \
                            the change it produces."
                .into(),
            color: "#2e9e6b".into(),
            icon: "🗂".into(),
        },
        StoryAgent {
            id: "prose-writer".into(),
            name: "Prose Writer".into(),
            role: "Drafting".into(),
            system_prompt: "You write polished narrative prose from an outline, \
                            keeping continuity with the world digest and the voice \
                            established in earlier segments."
                .into(),
            color: "#c2563a".into(),
            icon: "🖋".into(),
        },
        StoryAgent {
            id: "story-editor".into(),
            name: "Story Editor".into(),
            role: "Review".into(),
            system_prompt: "You are a critical story editor. Judge drafts strictly \
                            against the stated criteria and give concrete, actionable \
                            feedback on every failure."
                .into(),
            color: "#9a8a2d".into(),
            icon: "🔍".into(),
        },
    ]
}
