use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding the store and project config, relative to the root.
pub const TRACKER_DIR: &str = ".taskweave";
const CONFIG_FILE: &str = "config.toml";
const DEFAULT_DB_FILE: &str = "tracker.db";

/// Engine configuration read from `.taskweave/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Storage file. Relative paths resolve against the project root.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Seconds between heartbeat frames. 0 disables the heartbeat thread.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Frames buffered per channel subscriber before it is dropped as slow.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat_secs(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl RealtimeConfig {
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.heartbeat_secs))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

impl EngineConfig {
    /// Store path resolved against `project_root` when relative.
    #[must_use]
    pub fn db_path(&self, project_root: &Path) -> PathBuf {
        if self.store.path.is_absolute() {
            self.store.path.clone()
        } else {
            project_root.join(&self.store.path)
        }
    }
}

/// Path of the project config file under `project_root`.
#[must_use]
pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(TRACKER_DIR).join(CONFIG_FILE)
}

/// Load `.taskweave/config.toml`, or defaults when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_engine_config(project_root: &Path) -> Result<EngineConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<EngineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the per-user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("taskweave").join(CONFIG_FILE);
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write `config` to `.taskweave/config.toml`, creating the directory.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem operation fails.
pub fn write_engine_config(project_root: &Path, config: &EngineConfig) -> Result<PathBuf> {
    let path = config_path(project_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn default_db_path() -> PathBuf {
    Path::new(TRACKER_DIR).join(DEFAULT_DB_FILE)
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_heartbeat_secs() -> u64 {
    30
}

const fn default_subscriber_buffer() -> usize {
    256
}
