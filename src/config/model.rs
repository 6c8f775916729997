// src/config/model.rs

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::DoerError;
use crate::logging::LogLevel;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// log_level = "debug"
///
/// [process]
/// read_buffer_size = 8192
/// exit_flush_timeout = "250ms"
/// kill_on_drop = true
/// drain_stderr = true
/// max_buffered_bytes = 67108864
/// ```
///
/// All keys are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Preferred level for [`crate::logging::init_logging`].
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Child process handling from `[process]`.
    #[serde(default)]
    pub process: ProcessSection,
}

/// `[process]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessSection {
    /// Size of the buffer used for each read from the child's stdout.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// How long to keep reading stdout after the child has exited before the
    /// stream is closed by force (e.g. a grandchild still holds the pipe).
    #[serde(default = "default_exit_flush_timeout")]
    pub exit_flush_timeout: String,

    /// Kill the child if its supervisor is dropped (runtime shutdown).
    #[serde(default = "default_true")]
    pub kill_on_drop: bool,

    /// Capture stderr into its own stream. When `false`, stderr is attached
    /// to the null device.
    #[serde(default = "default_true")]
    pub drain_stderr: bool,

    /// Most bytes kept per unread stream. Past this, the oldest buffered
    /// bytes are discarded.
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: usize,
}

fn default_read_buffer_size() -> usize {
    8 * 1024
}

fn default_exit_flush_timeout() -> String {
    "250ms".to_string()
}

fn default_max_buffered_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            exit_flush_timeout: default_exit_flush_timeout(),
            kill_on_drop: true,
            drain_stderr: true,
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

/// Validated configuration used by tasks.
///
/// Build one with [`crate::config::load_and_validate`], by parsing a TOML
/// string, or take [`DoerConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoerConfig {
    pub(crate) log_level: Option<LogLevel>,
    pub(crate) read_buffer_size: usize,
    pub(crate) exit_flush_timeout: Duration,
    pub(crate) kill_on_drop: bool,
    pub(crate) drain_stderr: bool,
    pub(crate) max_buffered_bytes: usize,
}

impl DoerConfig {
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn exit_flush_timeout(&self) -> Duration {
        self.exit_flush_timeout
    }

    pub fn kill_on_drop(&self) -> bool {
        self.kill_on_drop
    }

    pub fn drain_stderr(&self) -> bool {
        self.drain_stderr
    }

    pub fn max_buffered_bytes(&self) -> usize {
        self.max_buffered_bytes
    }
}

impl Default for DoerConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            read_buffer_size: default_read_buffer_size(),
            exit_flush_timeout: Duration::from_millis(250),
            kill_on_drop: true,
            drain_stderr: true,
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

impl FromStr for DoerConfig {
    type Err = DoerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawConfig = toml::from_str(s)?;
        DoerConfig::try_from(raw)
    }
}
