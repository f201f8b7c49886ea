// src/alloc/architecture.rs

//! Per-color demand and node slicing.
//!
//! Colors are shared pools: two services that both declare `RED` contend for
//! the same RED nodes, so the demand for a color is the largest count any
//! single service asks for, not the sum. Total demand is the sum of those
//! maxima. After allocation the returned node list is cut into one
//! contiguous pool per color (in first-seen color order) and each service
//! takes its nodes from the pools according to the [`PoolPolicy`].

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::alloc::backend::{AllocationRequest, AllocatorBackend};
use crate::alloc::service::Service;
use crate::errors::{HpcExecError, Result};
use crate::hosts::Hostfile;
use crate::types::PoolPolicy;

/// How an architecture is allocated.
///
/// Usually comes from the `[allocation]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllocationOptions {
    #[serde(default)]
    pub policy: PoolPolicy,
    #[serde(default)]
    pub node_list: Option<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default = "default_exclusive")]
    pub exclusive: bool,
}

fn default_exclusive() -> bool {
    true
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            policy: PoolPolicy::default(),
            node_list: None,
            partition: None,
            exclusive: default_exclusive(),
        }
    }
}

impl AllocationOptions {
    pub fn request(&self, nodes: usize) -> AllocationRequest {
        AllocationRequest {
            nodes,
            node_list: self.node_list.clone(),
            partition: self.partition.clone(),
            exclusive: self.exclusive,
        }
    }
}

/// The contiguous slice of allocated nodes that belongs to one color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorPool {
    pub color: String,
    pub nodes: Vec<String>,
}

/// A set of services and, once scheduled, their node assignment.
#[derive(Debug, Default)]
pub struct Architecture {
    services: Vec<Service>,
    index: HashMap<String, usize>,
    pools: Option<Vec<ColorPool>>,
    released: bool,
}

impl Architecture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_services(services: impl IntoIterator<Item = Service>) -> Result<Self> {
        let mut arch = Self::new();
        for service in services {
            arch.add_service(service)?;
        }
        Ok(arch)
    }

    /// Register a service. Names are unique; registration order is the
    /// order in which services take nodes.
    pub fn add_service(&mut self, service: Service) -> Result<()> {
        if self.is_scheduled() {
            return Err(HpcExecError::config(format!(
                "cannot add service '{}' after scheduling",
                service.name()
            )));
        }
        if self.index.contains_key(service.name()) {
            return Err(HpcExecError::DuplicateService(service.name().to_string()));
        }
        self.index
            .insert(service.name().to_string(), self.services.len());
        self.services.push(service);
        Ok(())
    }

    /// Shorthand for `add_service(Service::new(..)?)`.
    pub fn add(&mut self, name: &str, num_nodes: usize, distribution: &str) -> Result<()> {
        self.add_service(Service::new(name, num_nodes, distribution)?)
    }

    pub fn service(&self, name: &str) -> Result<&Service> {
        self.index
            .get(name)
            .map(|&i| &self.services[i])
            .ok_or_else(|| HpcExecError::ServiceNotFound(name.to_string()))
    }

    /// Services in registration order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.iter()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Maximum count per color over all services, in first-seen order.
    pub fn color_demand(&self) -> Vec<(String, usize)> {
        let mut demand: Vec<(String, usize)> = Vec::new();
        for service in &self.services {
            for (color, count) in service.distribution() {
                match demand.iter_mut().find(|(c, _)| c == color) {
                    Some((_, max)) => *max = (*max).max(*count),
                    None => demand.push((color.clone(), *count)),
                }
            }
        }
        demand
    }

    /// Total number of nodes to request: the sum of per-color maxima.
    pub fn num_nodes_needed(&self) -> usize {
        self.color_demand().iter().map(|(_, n)| n).sum()
    }

    /// Check that every pool can serve all of its services under `policy`.
    ///
    /// Under [`PoolPolicy::Exclusive`] the counts of all services sharing a
    /// color must fit into that color's pool.
    pub fn validate_pools(&self, policy: PoolPolicy) -> Result<()> {
        if policy == PoolPolicy::Colocated {
            return Ok(());
        }
        for (color, capacity) in self.color_demand() {
            let requested: usize = self
                .services
                .iter()
                .filter_map(|s| s.count_for(&color))
                .sum();
            if requested > capacity {
                return Err(HpcExecError::PoolOverflow {
                    color,
                    requested,
                    capacity,
                });
            }
        }
        Ok(())
    }

    pub fn is_scheduled(&self) -> bool {
        self.pools.is_some()
    }

    /// Color pools, once scheduled.
    pub fn pools(&self) -> Option<&[ColorPool]> {
        self.pools.as_deref()
    }

    /// Host set of service `name`.
    ///
    /// Errors if the service does not exist or has not been scheduled yet.
    pub fn hostfile(&self, name: &str) -> Result<&Hostfile> {
        self.service(name)?.hostfile().ok_or_else(|| {
            HpcExecError::config(format!("service '{name}' has not been scheduled"))
        })
    }

    /// Request nodes from `backend` and assign them.
    ///
    /// Can only succeed once per architecture. If the backend fails or the
    /// nodes cannot be assigned, the backend is released before the error is
    /// returned.
    pub async fn schedule(
        &mut self,
        backend: &mut dyn AllocatorBackend,
        options: &AllocationOptions,
    ) -> Result<()> {
        if self.is_scheduled() {
            return Err(HpcExecError::config("architecture has already been scheduled"));
        }
        if self.services.is_empty() {
            return Err(HpcExecError::config("no services to schedule"));
        }

        let demand = self.num_nodes_needed();
        self.validate_pools(options.policy)?;

        let request = options.request(demand);
        request.validate()?;

        info!(
            services = self.services.len(),
            nodes = demand,
            policy = ?options.policy,
            "requesting nodes"
        );
        let nodes = match backend.allocate(&request).await {
            Ok(nodes) => nodes,
            Err(e) => {
                if let Err(release_err) = backend.release().await {
                    warn!(error = %release_err, "releasing after failed allocation failed");
                }
                return Err(e);
            }
        };

        if nodes.len() < demand {
            warn!(requested = demand, received = nodes.len(), "allocator came up short");
            if let Err(e) = backend.release().await {
                warn!(error = %e, "releasing short allocation failed");
            }
            return Err(HpcExecError::AllocationShortfall {
                requested: demand,
                received: nodes.len(),
            });
        }

        if let Err(e) = self.assign(nodes, options.policy) {
            if let Err(release_err) = backend.release().await {
                warn!(error = %release_err, "releasing allocation after failed assignment failed");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Slice `nodes` into color pools and hand them out.
    ///
    /// Extra nodes past the total demand are ignored. This is the pure half
    /// of [`Self::schedule`].
    pub fn assign(&mut self, nodes: Vec<String>, policy: PoolPolicy) -> Result<()> {
        if self.is_scheduled() {
            return Err(HpcExecError::config("architecture has already been scheduled"));
        }
        self.validate_pools(policy)?;

        let demand = self.color_demand();
        let needed: usize = demand.iter().map(|(_, n)| n).sum();
        if nodes.len() < needed {
            return Err(HpcExecError::AllocationShortfall {
                requested: needed,
                received: nodes.len(),
            });
        }

        let mut pools = Vec::with_capacity(demand.len());
        let mut start = 0;
        for (color, size) in demand {
            pools.push(ColorPool {
                color,
                nodes: nodes[start..start + size].to_vec(),
            });
            start += size;
        }

        let mut cursors = vec![0usize; pools.len()];
        let mut assignments = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let mut taken = Vec::with_capacity(service.num_nodes());
            for (color, count) in service.distribution() {
                let Some(p) = pools.iter().position(|p| &p.color == color) else {
                    return Err(HpcExecError::config(format!("no pool for color '{color}'")));
                };
                let from = match policy {
                    PoolPolicy::Exclusive => cursors[p],
                    PoolPolicy::Colocated => 0,
                };
                let slice = pools[p].nodes.get(from..from + count).ok_or_else(|| {
                    HpcExecError::PoolOverflow {
                        color: color.clone(),
                        requested: from + count,
                        capacity: pools[p].nodes.len(),
                    }
                })?;
                taken.extend_from_slice(slice);
                cursors[p] = from + count;
            }
            assignments.push(taken);
        }

        for (service, nodes) in self.services.iter_mut().zip(assignments) {
            debug!(service = service.name(), nodes = ?nodes, "assigned nodes");
            service.assign(nodes)?;
        }
        self.pools = Some(pools);
        Ok(())
    }

    /// Hand the allocation back to `backend`.
    pub async fn release(&mut self, backend: &mut dyn AllocatorBackend) -> Result<()> {
        if self.released {
            return Ok(());
        }
        backend.release().await?;
        self.released = true;
        info!("allocation released");
        Ok(())
    }
}
