// src/config/validate.rs

use crate::alloc::{AllocationOptions, Architecture, Service};
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{HpcExecError, Result};
use crate::hosts::count_expansion;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HpcExecError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_services(&raw)?;
        let architecture = build_architecture(&raw)?;
        validate_allocation(&raw.allocation, &architecture)?;
        Ok(ConfigFile::new_unchecked(
            raw.defaults,
            raw.allocation,
            architecture,
        ))
    }
}

fn ensure_has_services(cfg: &RawConfigFile) -> Result<()> {
    if cfg.service.is_empty() {
        return Err(HpcExecError::ConfigError(
            "config must contain at least one [[service]] section".to_string(),
        ));
    }
    Ok(())
}

fn build_architecture(cfg: &RawConfigFile) -> Result<Architecture> {
    let mut arch = Architecture::new();
    for svc in &cfg.service {
        arch.add_service(Service::new(&svc.name, svc.nodes, &svc.colors)?)?;
    }
    Ok(arch)
}

fn validate_allocation(alloc: &AllocationOptions, arch: &Architecture) -> Result<()> {
    arch.validate_pools(alloc.policy)?;

    if let Some(list) = &alloc.node_list {
        let listed = count_expansion(list)?;
        let needed = arch.num_nodes_needed();
        if listed > needed {
            return Err(HpcExecError::ConfigError(format!(
                "[allocation].node_list names {listed} nodes but the services need only {needed}"
            )));
        }
    }
    if matches!(&alloc.partition, Some(p) if p.trim().is_empty()) {
        return Err(HpcExecError::ConfigError(
            "[allocation].partition must not be empty".to_string(),
        ));
    }
    Ok(())
}
