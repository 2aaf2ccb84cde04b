//! Pipeline configuration
//!
//! Loaded from TOML; every table and field is optional:
//!
//! ```toml
//! [cache]
//! max_sessions = 1000
//! expire_after_write_secs = 1800
//! expire_after_access_secs = 600
//! memory_window = 20
//!
//! [output]
//! root_dir = "generated"
//!
//! [build]
//! install_command = ["npm", "install"]
//! build_command = ["npm", "run", "build"]
//! timeout_secs = 480
//!
//! [stream]
//! late_persistence_failure = "log"
//! event_buffer = 64
//! ```

use crate::error::ConfigError;
use forge_output::BuildConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Session cache limits
    pub cache: CacheConfig,
    /// Artifact output location
    pub output: OutputConfig,
    /// Scaffold build commands
    pub build: BuildConfig,
    /// Streaming behavior
    pub stream: StreamConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// [`ConfigError`] on malformed TOML or unusable values.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    ///
    /// # Errors
    /// [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_sessions == 0 {
            return Err(ConfigError::Invalid("cache.max_sessions must be positive".into()));
        }
        if self.cache.expire_after_write_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.expire_after_write_secs must be positive".into(),
            ));
        }
        if self.cache.expire_after_access_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache.expire_after_access_secs must be positive".into(),
            ));
        }
        if self.cache.memory_window == 0 {
            return Err(ConfigError::Invalid("cache.memory_window must be positive".into()));
        }
        if self.stream.event_buffer == 0 {
            return Err(ConfigError::Invalid("stream.event_buffer must be positive".into()));
        }
        if self.build.timeout_secs == 0 {
            return Err(ConfigError::Invalid("build.timeout_secs must be positive".into()));
        }
        if self.build.install_command.is_empty() || self.build.build_command.is_empty() {
            return Err(ConfigError::Invalid("build commands must not be empty".into()));
        }
        Ok(())
    }

    /// With output root
    #[inline]
    #[must_use]
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output.root_dir = root.into();
        self
    }

    /// With cache configuration
    #[inline]
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// With build configuration
    #[inline]
    #[must_use]
    pub fn with_build(mut self, build: BuildConfig) -> Self {
        self.build = build;
        self
    }

    /// With late persistence failure policy
    #[inline]
    #[must_use]
    pub fn with_late_failure_policy(mut self, policy: LateFailurePolicy) -> Self {
        self.stream.late_persistence_failure = policy;
        self
    }
}

/// Session cache limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum live sessions
    pub max_sessions: u64,
    /// Evict this long after creation
    pub expire_after_write_secs: u64,
    /// Evict this long after last use
    pub expire_after_access_secs: u64,
    /// Conversation turns kept per session
    pub memory_window: usize,
}

impl CacheConfig {
    /// Write window as a duration
    #[must_use]
    pub fn expire_after_write(&self) -> Duration {
        Duration::from_secs(self.expire_after_write_secs)
    }

    /// Access window as a duration
    #[must_use]
    pub fn expire_after_access(&self) -> Duration {
        Duration::from_secs(self.expire_after_access_secs)
    }

    /// With maximum session count
    #[must_use]
    pub fn with_max_sessions(mut self, max: u64) -> Self {
        self.max_sessions = max;
        self
    }

    /// With both expiry windows
    #[must_use]
    pub fn with_expiry(mut self, after_write: Duration, after_access: Duration) -> Self {
        self.expire_after_write_secs = after_write.as_secs();
        self.expire_after_access_secs = after_access.as_secs();
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            expire_after_write_secs: 30 * 60,
            expire_after_access_secs: 10 * 60,
            memory_window: 20,
        }
    }
}

/// Artifact output location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root under which `{type}_{subject}` directories are created
    pub root_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("generated"),
        }
    }
}

/// What to do when persistence fails after a stream completed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateFailurePolicy {
    /// Close the stream with `done`, then persist and log any failure
    #[default]
    Log,
    /// Persist first and close with `error` if it fails
    Surface,
}

/// Streaming behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Late persistence failure handling
    pub late_persistence_failure: LateFailurePolicy,
    /// Outward events buffered per stream
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            late_persistence_failure: LateFailurePolicy::Log,
            event_buffer: 64,
        }
    }
}
