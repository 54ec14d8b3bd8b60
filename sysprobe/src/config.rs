//! Configuration for the sysprobe agent.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use sysprobe_common::BaseConfig;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
    #[error(transparent)]
    Load(#[from] sysprobe_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SysprobeConfig {
    /// Logging and envelope encoding settings.
    #[serde(flatten)]
    pub base: BaseConfig,

    /// Round scheduling and channel settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Which sources to run.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Disk mount filters.
    #[serde(default)]
    pub disk: DiskConfig,
}

/// Round scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Namespace prefixed to record names (default: "system").
    /// An empty namespace leaves record names bare.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Seconds between collection rounds (default: 10).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Capacity of the fan-in channel (default: 64).
    /// Sources block on send while the channel is full.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Deadline for one round in seconds; 0 disables it (default: 30).
    #[serde(default = "default_round_timeout")]
    pub round_timeout_secs: u64,

    /// Window in which an identical source failure is logged once (default: 3600).
    #[serde(default = "default_log_throttle")]
    pub log_throttle_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            poll_interval_secs: default_poll_interval(),
            channel_capacity: default_channel_capacity(),
            round_timeout_secs: default_round_timeout(),
            log_throttle_secs: default_log_throttle(),
        }
    }
}

impl AgentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn round_timeout(&self) -> Option<Duration> {
        (self.round_timeout_secs > 0).then(|| Duration::from_secs(self.round_timeout_secs))
    }

    pub fn log_throttle(&self) -> Duration {
        Duration::from_secs(self.log_throttle_secs)
    }
}

fn default_namespace() -> String {
    "system".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    64
}

fn default_round_timeout() -> u64 {
    30
}

fn default_log_throttle() -> u64 {
    3600
}

/// Configuration for which sources to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Disk usage per mount point.
    #[serde(default = "default_true")]
    pub disk: bool,

    /// Virtual memory totals.
    #[serde(default = "default_true")]
    pub memory: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            disk: true,
            memory: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Filesystem types that never back real storage.
const PSEUDO_FS_TYPES: &[&str] = &[
    "tmpfs",
    "devtmpfs",
    "devfs",
    "devpts",
    "sysfs",
    "proc",
    "cgroup",
    "cgroup2",
    "securityfs",
    "debugfs",
    "tracefs",
    "configfs",
    "fusectl",
    "hugetlbfs",
    "mqueue",
    "pstore",
    "bpf",
    "binfmt_misc",
    "autofs",
    "overlay",
    "squashfs",
    "nsfs",
];

/// Disk mount filtering configuration, applied when partitions are enumerated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskConfig {
    /// Only include these mount points (empty = include all).
    #[serde(default)]
    pub include: Vec<String>,

    /// Exclude these mount points.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Exclude pseudo filesystems (tmpfs, proc, sysfs, etc.) (default: true).
    #[serde(default = "default_true")]
    pub exclude_pseudo: bool,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_pseudo: true,
        }
    }
}

impl DiskConfig {
    /// A filter that keeps every partition.
    pub fn include_all() -> Self {
        Self {
            exclude_pseudo: false,
            ..Self::default()
        }
    }

    /// Check if a mount point should be included.
    pub fn should_include(&self, mount_point: &str, fs_type: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|i| i == mount_point) {
            return false;
        }

        if self.exclude.iter().any(|e| e == mount_point) {
            return false;
        }

        if self.exclude_pseudo && PSEUDO_FS_TYPES.contains(&fs_type) {
            return false;
        }

        true
    }
}

impl SysprobeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let config: SysprobeConfig = sysprobe_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "poll_interval_secs must be > 0".to_string(),
            ));
        }

        if self.agent.channel_capacity == 0 {
            return Err(ConfigError::Validation(
                "channel_capacity must be > 0".to_string(),
            ));
        }

        if !self.sources.disk && !self.sources.memory {
            return Err(ConfigError::Validation(
                "At least one source must be enabled".to_string(),
            ));
        }

        Ok(())
    }
}
