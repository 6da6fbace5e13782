//! Configuration Management
//!
//! Handles persistent configuration storage for gcpr. Effective values
//! resolve CLI flag > config file > gcloud defaults.

use crate::gcp::auth;
use crate::gcp::client::{BasePaths, ProviderDefaults};
use crate::gcp::operation::PollSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "gcp-reconciler";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Project billed for quota on every request
    #[serde(default)]
    pub billing_project: Option<String>,
    #[serde(default)]
    pub compute_base_path: Option<String>,
    #[serde(default)]
    pub network_security_base_path: Option<String>,
    /// Where the CLI keeps state.json
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// First operation poll delay
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
}

/// `<config_dir>/gcp-reconciler`, falling back to `~/.gcp-reconciler`
pub fn app_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join(APP_DIR);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(format!(".{}", APP_DIR));
    }
    PathBuf::from(APP_DIR)
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> PathBuf {
        app_dir().join("config.json")
    }

    /// Load configuration from disk; a missing or unreadable file yields defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Overlay CLI flags; a `Some` flag wins over the file
    pub fn with_overrides(
        mut self,
        project: Option<String>,
        region: Option<String>,
        billing_project: Option<String>,
        state_dir: Option<PathBuf>,
    ) -> Self {
        self.project_id = project.or(self.project_id);
        self.region = region.or(self.region);
        self.billing_project = billing_project.or(self.billing_project);
        self.state_dir = state_dir.or(self.state_dir);
        self
    }

    /// Get effective project (config > gcloud default); invalid IDs are dropped
    pub fn effective_project(&self) -> Option<String> {
        self.project_id
            .clone()
            .filter(|p| auth::validate_project_id(p))
            .or_else(auth::get_default_project)
    }

    pub fn effective_region(&self) -> Option<String> {
        self.region.clone().or_else(auth::get_default_region)
    }

    pub fn effective_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(app_dir)
    }

    /// Defaults injected into every reconciler
    pub fn provider_defaults(&self) -> ProviderDefaults {
        ProviderDefaults {
            project: self.effective_project(),
            region: self.effective_region(),
            billing_project: self.billing_project.clone(),
        }
    }

    pub fn base_paths(&self) -> BasePaths {
        let mut paths = BasePaths::default();
        if let Some(compute) = &self.compute_base_path {
            paths.compute = compute.clone();
        }
        if let Some(network_security) = &self.network_security_base_path {
            paths.network_security = network_security.clone();
        }
        paths
    }

    pub fn poll_settings(&self) -> PollSettings {
        match self.poll_interval_ms {
            Some(ms) => PollSettings::with_initial_interval(Duration::from_millis(ms)),
            None => PollSettings::default(),
        }
    }
}
