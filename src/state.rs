//! CLI state file
//!
//! Manages `<state_dir>/state.json`, which remembers the last read attributes
//! (including fingerprints) of every resource gcpr created or imported, so a
//! later invocation can update or delete it. The reconciler itself never
//! touches this file.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const LOCK_FILE: &str = "state.lock";

/// Every tracked resource, keyed by ReconcilerID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub resources: BTreeMap<String, ResourceEntry>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl State {
    pub fn get(&self, id: &str) -> Option<&ResourceEntry> {
        self.resources.get(id)
    }

    pub fn set(&mut self, id: impl Into<String>, entry: ResourceEntry) {
        self.resources.insert(id.into(), entry);
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceEntry> {
        let removed = self.resources.remove(id);
        if removed.is_some() {
            self.updated_at = Utc::now();
        }
        removed
    }
}

/// Last known attributes of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Registry kind key
    pub kind: String,
    pub attributes: Value,
    pub updated_at: DateTime<Utc>,
}

impl ResourceEntry {
    pub fn new<S: Serialize>(kind: &str, spec: &S) -> Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            attributes: serde_json::to_value(spec).context("encoding resource attributes")?,
            updated_at: Utc::now(),
        })
    }

    /// Decode the stored attributes as the kind's spec type
    pub fn spec<S: DeserializeOwned>(&self) -> Result<S> {
        serde_json::from_value(self.attributes.clone())
            .with_context(|| format!("stored attributes are not a valid {}", self.kind))
    }
}

/// Reads and writes the state file in one directory
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Load the state; a missing file is an empty state
    pub async fn load(&self) -> Result<State> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, starting empty");
            return Ok(State::default());
        }

        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let state: State = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;

        if state.version > STATE_VERSION {
            bail!(
                "state file version {} is newer than supported version {}",
                state.version,
                STATE_VERSION
            );
        }

        tracing::debug!("Loaded state with {} resources", state.resources.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as `state.json.backup`
    pub async fn save(&self, state: &State) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;

        let path = self.state_path();
        if path.exists() {
            fs::copy(&path, self.backup_path())
                .await
                .context("backing up state file")?;
        }

        let content = serde_json::to_string_pretty(state)?;
        fs::write(&path, content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        tracing::debug!("Saved state with {} resources", state.resources.len());
        Ok(())
    }

    /// Take the lock file; locks older than an hour are considered stale
    pub async fn lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.dir).await?;
        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            match serde_json::from_str::<LockInfo>(&content) {
                Ok(info) if Utc::now().signed_duration_since(info.acquired_at).num_hours() < 1 => {
                    bail!(
                        "state is locked by pid {} since {}",
                        info.pid,
                        info.acquired_at
                    );
                },
                Ok(info) => tracing::warn!("Removing stale state lock held by pid {}", info.pid),
                Err(_) => tracing::warn!("Removing unreadable state lock"),
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        fs::write(&lock_path, serde_json::to_string(&info)?).await?;

        tracing::debug!("Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// Removes the lock file when released or dropped
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        if self.lock_path.exists() {
            fs::remove_file(&self.lock_path).await?;
            tracing::debug!("Released state lock");
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
