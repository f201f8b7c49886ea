// src/alloc/mod.rs

//! Node allocation across color-tagged services.
//!
//! - [`service`] parses and validates one service's color distribution.
//! - [`architecture`] computes per-color demand, requests nodes from an
//!   [`AllocatorBackend`] and slices them into per-service host sets.
//! - [`backend`] defines the allocator seam; [`slurm`] implements it on top
//!   of `salloc`/`scancel`.

pub mod architecture;
pub mod backend;
pub mod service;
pub mod slurm;

pub use architecture::{AllocationOptions, Architecture, ColorPool};
pub use backend::{AllocFuture, AllocationRequest, AllocatorBackend};
pub use service::Service;
pub use slurm::SlurmAllocator;
