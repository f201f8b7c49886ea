// src/hosts/mod.rs

//! Host sets.
//!
//! - [`hostfile`] holds [`Hostfile`], the ordered, deduplicated host list
//!   shared by execution configs and the node allocator.
//! - [`expand`] implements bracket-range expansion for node-list patterns
//!   such as `comp-[01-04,07]`.

pub mod expand;
pub mod hostfile;

pub use expand::{count_expansion, expand_pattern};
pub use hostfile::Hostfile;
