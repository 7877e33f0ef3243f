//! Client configuration at `~/.psh/config.toml` and browse state at
//! `~/.psh/state.toml`.
//!
//! The config file holds the `[transport]` and `[browse]` sections; CLI flags
//! override it. The state file is rewritten by `glob`, `new` and `browse` so
//! the next browse resumes where the last one stopped.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use psh_core::{BrowseSettings, PathStack, TransportConfig, TransportSettings};
use serde::{Deserialize, Serialize};
use tracing::debug;

const STATE_FILE: &str = "state.toml";

/// `~/.psh`, or `.psh` in the working directory when there is no home.
pub fn default_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".psh")
}

pub fn default_config_path() -> PathBuf {
    default_dir().join("config.toml")
}

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub browse: BrowseSettings,
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    #[cfg(test)]
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        write_file(path, &content)
    }
}

/// What every subcommand needs: resolved transport options, browse options,
/// and where the state file lives.
#[derive(Debug, Clone)]
pub struct Settings {
    pub transport: TransportConfig,
    pub browse: BrowseSettings,
    pub state_path: PathBuf,
}

impl Settings {
    pub fn new(config: &Config, config_path: &Path) -> Self {
        let dir = config_path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self {
            transport: config.transport.resolve(),
            browse: config.browse.clone(),
            state_path: dir.join(STATE_FILE),
        }
    }

    pub fn load_state(&self) -> State {
        // A broken state file only costs the resume position.
        State::load(&self.state_path).unwrap_or_else(|e| {
            tracing::warn!("{:#}", e);
            State::default()
        })
    }

    pub fn save_state(&self, state: &State) {
        if let Err(e) = state.save(&self.state_path) {
            tracing::warn!("{:#}", e);
        }
    }
}

/// Where browsing last stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Last server, `[user@]host`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Last glob patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glob: Option<String>,

    /// Browse stack on `server`.
    #[serde(default)]
    pub path: PathStack,
}

impl State {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read state at {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse state at {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize state")?;
        write_file(path, &content)?;
        debug!(path = %path.display(), "saved state");
        Ok(())
    }

    /// Record a position on `server`.
    pub fn visit(&mut self, server: &str, path: PathStack) {
        self.server = Some(server.to_string());
        self.path = path;
    }

    /// The saved stack, if it belongs to `server`.
    pub fn path_on(&self, server: &str) -> Option<&PathStack> {
        (self.server.as_deref() == Some(server)).then_some(&self.path)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}
