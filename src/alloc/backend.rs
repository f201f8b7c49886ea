// src/alloc/backend.rs

//! Pluggable allocator backend.
//!
//! [`Architecture::schedule`](crate::alloc::Architecture::schedule) talks to
//! an `AllocatorBackend` instead of a cluster scheduler directly, so tests can
//! hand out fake node names while production uses
//! [`SlurmAllocator`](crate::alloc::SlurmAllocator).

use std::future::Future;
use std::pin::Pin;

use crate::errors::{HpcExecError, Result};
use crate::hosts::count_expansion;

/// Future returned by backend operations.
pub type AllocFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// What to ask the cluster for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub nodes: usize,
    /// Preferred nodes, as a Slurm-style node list (`node[01-04]`).
    pub node_list: Option<String>,
    pub partition: Option<String>,
    pub exclusive: bool,
}

impl AllocationRequest {
    /// Reject a node list that names more nodes than are requested.
    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            return Err(HpcExecError::config("an allocation must request at least one node"));
        }
        if let Some(list) = &self.node_list {
            let listed = count_expansion(list)?;
            if listed > self.nodes {
                return Err(HpcExecError::config(format!(
                    "node list '{list}' names {listed} nodes but only {} were requested",
                    self.nodes
                )));
            }
        }
        Ok(())
    }
}

/// Trait abstracting where compute nodes come from.
pub trait AllocatorBackend: Send {
    /// Acquire nodes. Returns host names in allocation order.
    ///
    /// Returning fewer names than requested is allowed here; the caller
    /// turns it into [`HpcExecError::AllocationShortfall`].
    fn allocate<'a>(&'a mut self, request: &'a AllocationRequest) -> AllocFuture<'a, Vec<String>>;

    /// Give the nodes back. Releasing twice, or without an allocation, is a
    /// no-op.
    fn release(&mut self) -> AllocFuture<'_, ()>;
}
