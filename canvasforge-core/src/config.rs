//! Runtime configuration: an optional YAML file plus environment overrides.
//!
//! ```yaml
//! sandbox:
//!   timeout_ms: 5000
//!   script_timeout_ms: 4000
//!   program: /usr/local/bin/canvasforge-sandbox
//! storage:
//!   dir: /var/lib/canvasforge
//!   quota_bytes: 5242880
//! history:
//!   undo_limit: 100
//! ```

use crate::error::ConfigError;
use crate::sandbox::runtime::LUA_MEMORY_LIMIT_BYTES;
use crate::sandbox::{ChannelConfig, SandboxLimits};
use canvasforge_tree::history::DEFAULT_UNDO_LIMIT;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "CANVASFORGE_CONFIG";
pub const SANDBOX_TIMEOUT_ENV: &str = "CANVASFORGE_SANDBOX_TIMEOUT_MS";
pub const SCRIPT_TIMEOUT_ENV: &str = "CANVASFORGE_SCRIPT_TIMEOUT_MS";
pub const SANDBOX_PROGRAM_ENV: &str = "CANVASFORGE_SANDBOX_PROGRAM";
pub const STATE_DIR_ENV: &str = "CANVASFORGE_STATE_DIR";

/// Default persistence quota, in the range browsers give local storage.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_ms: u64,
    pub ready_timeout_ms: u64,
    pub memory_limit_bytes: usize,
    pub script_timeout_ms: u64,
    /// Sandbox executable. Defaults to `canvasforge-sandbox` next to the
    /// running binary.
    pub program: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            ready_timeout_ms: 5000,
            memory_limit_bytes: LUA_MEMORY_LIMIT_BYTES,
            script_timeout_ms: 4000,
            program: None,
        }
    }
}

impl SandboxConfig {
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
        }
    }

    pub fn limits(&self) -> SandboxLimits {
        SandboxLimits {
            memory_limit_bytes: self.memory_limit_bytes,
            script_timeout: Duration::from_millis(self.script_timeout_ms),
        }
    }

    /// Command-line flags that pass the limits on to a sandbox process.
    pub fn process_args(&self) -> Vec<String> {
        vec![
            "--memory-limit".to_string(),
            self.memory_limit_bytes.to_string(),
            "--script-timeout-ms".to_string(),
            self.script_timeout_ms.to_string(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".canvasforge"),
            quota_bytes: Some(DEFAULT_QUOTA_BYTES),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub undo_limit: usize,
    /// Save a version before every render.
    pub snapshot_on_render: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            undo_limit: DEFAULT_UNDO_LIMIT,
            snapshot_on_render: false,
        }
    }
}

impl Config {
    /// Load from `$CANVASFORGE_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides_from(|var| env::var(var).ok())?;
        config.check();
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Parse YAML. An empty document yields the defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(SANDBOX_TIMEOUT_ENV) {
            self.sandbox.timeout_ms = parse_millis(SANDBOX_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(SCRIPT_TIMEOUT_ENV) {
            self.sandbox.script_timeout_ms = parse_millis(SCRIPT_TIMEOUT_ENV, &value)?;
        }
        if let Some(value) = lookup(SANDBOX_PROGRAM_ENV) {
            if !value.is_empty() {
                self.sandbox.program = Some(PathBuf::from(value));
            }
        }
        if let Some(value) = lookup(STATE_DIR_ENV) {
            if !value.is_empty() {
                self.storage.dir = PathBuf::from(value);
            }
        }
        Ok(())
    }

    fn check(&self) {
        if self.sandbox.script_timeout_ms >= self.sandbox.timeout_ms {
            tracing::warn!(
                script_timeout_ms = self.sandbox.script_timeout_ms,
                timeout_ms = self.sandbox.timeout_ms,
                "script deadline is not below the channel deadline; runaway scripts will surface as timeouts"
            );
        }
    }
}

fn parse_millis(var: &str, value: &str) -> Result<u64, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOverride {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let ms: u64 = value
        .trim()
        .parse()
        .map_err(|_| invalid("expected a whole number of milliseconds"))?;
    if ms == 0 {
        return Err(invalid("must be greater than zero"));
    }
    Ok(ms)
}
