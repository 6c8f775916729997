// src/config/mod.rs

//! Configuration for task supervision.
//!
//! - [`model`] contains the TOML-facing types and the validated [`DoerConfig`].
//! - [`loader`] reads config files from disk.
//! - [`validate`] turns a [`RawConfig`] into a [`DoerConfig`].
//! - [`duration`] parses the short duration strings used by the config.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{DoerConfig, ProcessSection, RawConfig};
