// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{DoerConfig, ProcessSection, RawConfig};
use crate::errors::{DoerError, Result};

/// Upper bound for a single stdout read.
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Upper bound for `exit_flush_timeout`.
pub const MAX_EXIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(60 * 60);

impl TryFrom<RawConfig> for DoerConfig {
    type Error = DoerError;

    fn try_from(raw: RawConfig) -> std::result::Result<Self, Self::Error> {
        validate_process_section(&raw.process)?;

        let exit_flush_timeout = parse_duration(&raw.process.exit_flush_timeout).map_err(|e| {
            DoerError::ConfigError(format!("[process].exit_flush_timeout: {e}"))
        })?;
        if exit_flush_timeout > MAX_EXIT_FLUSH_TIMEOUT {
            return Err(DoerError::ConfigError(format!(
                "[process].exit_flush_timeout must be <= {MAX_EXIT_FLUSH_TIMEOUT:?} (got {exit_flush_timeout:?})"
            )));
        }

        Ok(DoerConfig {
            log_level: raw.log_level,
            read_buffer_size: raw.process.read_buffer_size,
            exit_flush_timeout,
            kill_on_drop: raw.process.kill_on_drop,
            drain_stderr: raw.process.drain_stderr,
            max_buffered_bytes: raw.process.max_buffered_bytes,
        })
    }
}

fn validate_process_section(section: &ProcessSection) -> Result<()> {
    if section.read_buffer_size == 0 {
        return Err(DoerError::ConfigError(
            "[process].read_buffer_size must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.read_buffer_size > MAX_READ_BUFFER_SIZE {
        return Err(DoerError::ConfigError(format!(
            "[process].read_buffer_size must be <= {} (got {})",
            MAX_READ_BUFFER_SIZE, section.read_buffer_size
        )));
    }

    if section.max_buffered_bytes == 0 {
        return Err(DoerError::ConfigError(
            "[process].max_buffered_bytes must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}
