#![allow(dead_code)]

use hpcexec::alloc::AllocationOptions;
use hpcexec::config::{ConfigFile, RawConfigFile, ServiceConfig};
use hpcexec::exec::{ExecConfig, ExecConfigBuilder, ExecDefaults};
use hpcexec::types::PoolPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                defaults: ExecDefaults::default(),
                allocation: AllocationOptions::default(),
                service: Vec::new(),
            },
        }
    }

    pub fn with_service(mut self, name: &str, nodes: usize, colors: &str) -> Self {
        self.config.service.push(ServiceConfig {
            name: name.to_string(),
            nodes,
            colors: colors.to_string(),
        });
        self
    }

    pub fn with_policy(mut self, policy: PoolPolicy) -> Self {
        self.config.allocation.policy = policy;
        self
    }

    pub fn with_partition(mut self, partition: &str) -> Self {
        self.config.allocation.partition = Some(partition.to_string());
        self
    }

    pub fn collect_output(mut self, val: bool) -> Self {
        self.config.defaults.collect_output = val;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The three-service layout used throughout the allocation tests:
/// client on RED, server on BLUE, application spread over all three colors.
pub fn canonical_services() -> ConfigFileBuilder {
    ConfigFileBuilder::new()
        .with_service("client", 16, "RED:16")
        .with_service("server", 16, "BLUE:16")
        .with_service("app", 16, "RED:4+BLUE:4+GREEN:8")
}

/// An `ExecConfig` builder that collects output and keeps the console quiet.
pub fn quiet_local() -> ExecConfigBuilder {
    ExecConfig::builder().collect_output(true).hide_output(true)
}

/// Build `builder` against an ambient environment holding only the current
/// `PATH`, so tests do not depend on the developer's shell.
pub fn build_isolated(builder: ExecConfigBuilder) -> ExecConfig {
    let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
    builder
        .build_with_ambient([("PATH".to_string(), path)])
        .expect("valid exec config")
}
