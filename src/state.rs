use crate::config::Config;
use crate::ports::AvailablePorts;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted between runs: the last profile that was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::state_dir()
            .or_else(dirs::config_dir)
            .map(|p| p.join("chrandr/chrandr.state"))
    }

    /// Uses `status_file` from the configuration, or the per-user default.
    pub fn for_config(config: &Config) -> Result<Self> {
        let path = config
            .general
            .status_file
            .clone()
            .or_else(Self::default_path)
            .context("Could not determine state file path")?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or broken state file only means there is nothing to restore.
    pub fn load(&self) -> SelectionState {
        if !self.path.exists() {
            debug!("No state file at {:?}", self.path);
            return SelectionState::default();
        }

        match self.read() {
            Ok(state) => {
                debug!("Last applied profile: {:?}", state.active);
                state
            }
            Err(e) => {
                warn!("Ignoring state file: {:#}", e);
                SelectionState::default()
            }
        }
    }

    fn read(&self) -> Result<SelectionState> {
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state: {:?}", self.path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse state: {:?}", self.path))
    }

    pub fn save(&self, active: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
        }

        let state = SelectionState {
            active: Some(active.to_string()),
        };
        let content = toml::to_string(&state)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write state: {:?}", self.path))?;

        info!("Active profile '{}' saved to {:?}", active, self.path);
        Ok(())
    }
}

/// Profile to highlight first: the last applied one if it still exists and
/// is eligible, otherwise `initial` if eligible.
pub fn initial_selection<'a>(
    config: &'a Config,
    state: &SelectionState,
    ports: &AvailablePorts,
) -> Option<&'a str> {
    let candidates = [state.active.as_deref(), config.general.initial.as_deref()];

    candidates
        .into_iter()
        .flatten()
        .filter_map(|id| config.profile(id))
        .find(|profile| profile.is_eligible(ports))
        .map(|profile| profile.id.as_str())
}
