// src/config/model.rs

use serde::Deserialize;

use crate::alloc::{AllocationOptions, Architecture};
use crate::exec::ExecDefaults;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [defaults]
/// collect_output = true
///
/// [allocation]
/// policy = "exclusive"
/// partition = "compute"
///
/// [[service]]
/// name = "client"
/// nodes = 16
/// colors = "RED:16"
/// ```
///
/// All sections are optional at this level; [`ConfigFile`] requires at least
/// one service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub defaults: ExecDefaults,

    #[serde(default)]
    pub allocation: AllocationOptions,

    /// `[[service]]` entries in declaration order.
    #[serde(default)]
    pub service: Vec<ServiceConfig>,
}

/// One `[[service]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub nodes: usize,
    /// Color distribution, e.g. `"RED:4+BLUE:4+GREEN:8"`.
    pub colors: String,
}

/// Validated configuration.
///
/// Constructed only through `TryFrom<RawConfigFile>`, so the services have
/// already been parsed into an [`Architecture`] and the pools checked
/// against the allocation policy.
#[derive(Debug)]
pub struct ConfigFile {
    pub defaults: ExecDefaults,
    pub allocation: AllocationOptions,
    pub architecture: Architecture,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        defaults: ExecDefaults,
        allocation: AllocationOptions,
        architecture: Architecture,
    ) -> Self {
        Self {
            defaults,
            allocation,
            architecture,
        }
    }
}
