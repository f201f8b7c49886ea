// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HpcExecError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("reading config file at {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Service already defined: {0}")]
    DuplicateService(String),

    #[error(
        "color '{color}' is over-subscribed: services request {requested} nodes but the pool holds {capacity}"
    )]
    PoolOverflow {
        color: String,
        requested: usize,
        capacity: usize,
    },

    #[error("allocator returned {received} nodes, {requested} were requested")]
    AllocationShortfall { requested: usize, received: usize },

    #[error("Allocation failed: {0}")]
    AllocatorError(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HpcExecError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        HpcExecError::ConfigError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, HpcExecError>;
