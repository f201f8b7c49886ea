// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{HpcExecError, Result};
use crate::types::PoolPolicy;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** parse color
/// distributions or check pools. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| HpcExecError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Builds the [`Architecture`](crate::alloc::Architecture), which rejects
///   bad color distributions and duplicate service names.
/// - Checks the pools against the allocation policy.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    load_with_policy(path, None)
}

/// Like [`load_and_validate`], but `policy` (when given) replaces the
/// `[allocation]` policy before the pools are checked.
pub fn load_with_policy(path: impl AsRef<Path>, policy: Option<PoolPolicy>) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;
    if let Some(policy) = policy {
        raw_config.allocation.policy = policy;
    }
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Config file used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("hpcexec.toml")
}
