// src/config/mod.rs

//! Configuration loading and validation for hpcexec.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate services and allocation settings (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_with_policy};
pub use model::{ConfigFile, RawConfigFile, ServiceConfig};
