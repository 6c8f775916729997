// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{DoerConfig, RawConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks buffer sizes and duration strings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<DoerConfig> {
    let raw_config = load_from_path(&path)?;
    let config = DoerConfig::try_from(raw_config)?;
    debug!(path = %path.as_ref().display(), ?config, "loaded configuration");
    Ok(config)
}
