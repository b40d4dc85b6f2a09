//! State management for cloud resources
//!
//! Manages the `.vandelay/state.json` file which records what the
//! provisioning engine materialized for each stack. Entries are keyed by
//! `<stack>:<logical id>`.

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".vandelay";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGING: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";

/// Attribute holding the fixed name a resource was declared with
pub const PHYSICAL_NAME_ATTRIBUTE: &str = "PhysicalName";

/// Everything recorded across stacks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by `<stack>:<logical id>`
    pub resources: HashMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: HashMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State key of a stack resource
    pub fn key(stack: &str, logical_id: &str) -> String {
        format!("{}:{}", stack, logical_id)
    }

    /// Split a state key into its owning stack and logical id
    ///
    /// Logical ids never contain `:`, so the last separator is the boundary.
    pub fn split_key(key: &str) -> Option<(&str, &str)> {
        key.rsplit_once(':')
    }

    /// Stack that owns the entry under `key`
    pub fn owner(key: &str) -> Option<&str> {
        Self::split_key(key).map(|(stack, _)| stack)
    }

    /// Get resources for a specific stack
    pub fn get_stack_resources(&self, stack: &str) -> Vec<(&String, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(k, _)| Self::owner(k) == Some(stack))
            .collect()
    }

    /// Resources of this stack as a provider state keyed by logical id
    pub fn stack_state(&self, stack: &str) -> ProviderState {
        let owned = self.resources.iter().filter_map(|(key, resource)| {
            Self::split_key(key)
                .filter(|(owner, _)| *owner == stack)
                .map(|(_, logical_id)| (logical_id, resource))
        });

        let mut state = ProviderState::new();
        for (logical_id, resource) in owned {
            state.add(logical_id.to_string(), resource.clone());
        }
        state
    }

    /// Replace everything recorded for a stack with a fresh materialization
    pub fn record_stack(&mut self, stack: &str, resources: &ProviderState) {
        self.remove_stack(stack);
        for (logical_id, resource) in resources.iter() {
            self.set_resource(Self::key(stack, logical_id), resource.clone());
        }
    }

    /// Remove every resource of a stack, returning how many were removed
    pub fn remove_stack(&mut self, stack: &str) -> usize {
        let keys: Vec<String> = self
            .get_stack_resources(stack)
            .into_iter()
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            self.remove_resource(key);
        }
        keys.len()
    }

    /// Find resources of a type by declared name or physical id, across all stacks
    pub fn find_by_physical_name(
        &self,
        resource_type: &str,
        name: &str,
    ) -> Vec<(&String, &ResourceState)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type && r.physical_name() == name)
            .collect()
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }
}

/// Materialized resources of a single stack, keyed by logical id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderState {
    /// Resources indexed by logical id
    pub resources: HashMap<String, ResourceState>,
}

impl ProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: String, state: ResourceState) {
        self.resources.insert(id, state);
    }

    pub fn get(&self, id: &str) -> Option<&ResourceState> {
        self.resources.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceState> {
        self.resources.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ResourceState)> {
        self.resources.iter()
    }
}

/// State of a single resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Physical resource ID (what `Ref` resolves to)
    pub id: String,

    /// Resource type
    pub resource_type: String,

    /// Current status
    pub status: ResourceStatus,

    /// Runtime attributes (endpoint, ARN, etc.)
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: ResourceStatus::Unknown,
            attributes: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.attributes.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    /// Declared fixed name, falling back to the physical id
    pub fn physical_name(&self) -> &str {
        match self.attributes.get(PHYSICAL_NAME_ATTRIBUTE) {
            Some(serde_json::Value::String(name)) => name,
            _ => &self.id,
        }
    }
}

/// Status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Resource is being created
    Creating,
    /// Resource is materialized and converged
    Running,
    /// Resource is being deleted
    Deleting,
    /// Resource has been deleted
    Deleted,
    /// Resource is in error state
    Error,
    /// Status is unknown
    Unknown,
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Creating => write!(f, "creating"),
            ResourceStatus::Running => write!(f, "running"),
            ResourceStatus::Deleting => write!(f, "deleting"),
            ResourceStatus::Deleted => write!(f, "deleted"),
            ResourceStatus::Error => write!(f, "error"),
            ResourceStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Reads and writes `state.json` under a state directory
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::with_state_dir(project_root, STATE_DIR)
    }

    /// Use a state directory other than `.vandelay` (relative to the root)
    pub fn with_state_dir(project_root: impl AsRef<Path>, state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: project_root.as_ref().join(state_dir),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if fs::metadata(&self.state_dir).await.is_err() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!(dir = %self.state_dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Load the recorded state, or an empty one if nothing was saved yet
    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.file(STATE_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("State file not found, returning empty state");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    ///
    /// New content is staged in `state.json.tmp` and renamed into place.
    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.file(STATE_FILE);
        let staging = self.file(STATE_STAGING);
        fs::write(&staging, serde_json::to_string_pretty(state)?).await?;

        if fs::metadata(&path).await.is_ok() {
            fs::copy(&path, self.file(STATE_BACKUP)).await?;
        }
        fs::rename(&staging, &path).await?;

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Take the state lock
    ///
    /// A lock older than [`STALE_LOCK_HOURS`] is assumed abandoned and replaced.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;
        let lock_path = self.file(LOCK_FILE);

        if let Ok(content) = fs::read_to_string(&lock_path).await {
            let held: LockInfo = serde_json::from_str(&content)?;
            if !held.is_stale() {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} (pid {}) since {}",
                    held.holder, held.pid, held.acquired_at
                )));
            }
            tracing::warn!(holder = %held.holder, "Removing stale state lock");
        }

        let info = LockInfo::current();
        fs::write(&lock_path, serde_json::to_string_pretty(&info)?).await?;

        tracing::debug!(path = %lock_path.display(), "Acquired state lock");
        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Hours after which an unreleased lock may be taken over
pub const STALE_LOCK_HOURS: i64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn is_stale(&self) -> bool {
        Utc::now().signed_duration_since(self.acquired_at).num_hours() >= STALE_LOCK_HOURS
    }
}

/// Held state lock, removed on release or drop
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {
                tracing::debug!("Released state lock");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
