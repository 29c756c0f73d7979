//! Configuration for a storyloom project.
//!
//! Settings are read from `.loom/loom.toml` under the project directory.
//! Every field has a sensible default, so a missing file (or an empty one)
//! yields a working configuration. The API key itself never lives in the
//! file; `api_key_env` names the environment variable to read, and a
//! `.env` file in the project directory is honored via dotenvy.
//!
//! # Configuration File Format
//!
//! ```toml
//! [llm]
//! api_base = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! api_key_env = "LOOM_API_KEY"
//! temperature = 0.8
//! request_timeout_secs = 120
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the project directory holding config and state.
pub const LOOM_DIR: &str = ".loom";
/// Config file name inside [`LOOM_DIR`].
pub const CONFIG_FILE: &str = "loom.toml";
/// Persisted world document inside [`LOOM_DIR`].
pub const WORLD_FILE: &str = "world.json";

/// Settings for the chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Model identifier passed through to the API.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Sampling temperature; omitted from the request when unset.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "LOOM_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Top-level configuration loaded from `loom.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoomConfig {
    #[serde(default)]
    pub llm: LlmSettings,
}

impl LoomConfig {
    /// Load from `<project_dir>/.loom/loom.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(LOOM_DIR).join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Write the config to `<project_dir>/.loom/loom.toml`, creating the
    /// project directory if needed.
    pub fn save(&self, project_dir: &Path) -> Result<()> {
        let dir = project_dir.join(LOOM_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE);
        let raw = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, raw).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Resolved filesystem layout for one project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub project_dir: PathBuf,
    pub loom_dir: PathBuf,
    pub world_file: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let loom_dir = project_dir.join(LOOM_DIR);
        let world_file = loom_dir.join(WORLD_FILE);
        Ok(Self {
            project_dir,
            loom_dir,
            world_file,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.loom_dir)
            .with_context(|| format!("Failed to create {}", self.loom_dir.display()))?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.loom_dir.is_dir()
    }
}

/// Load `.env` from the project directory if present, then the process
/// environment as usual. Missing files are not an error.
pub fn load_dotenv(project_dir: &Path) {
    let path = project_dir.join(".env");
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}
