// src/alloc/service.rs

use std::collections::HashSet;

use crate::errors::{HpcExecError, Result};
use crate::hosts::Hostfile;

/// A named consumer of nodes with a color distribution.
///
/// The distribution string is `color[:count]` joined by `+`, e.g.
/// `RED:4+BLUE:4+GREEN:8`. A single color may omit the count and then takes
/// the whole request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    name: String,
    num_nodes: usize,
    distribution: Vec<(String, usize)>,
    assigned: Vec<String>,
    hostfile: Option<Hostfile>,
}

impl Service {
    pub fn new(name: impl Into<String>, num_nodes: usize, distribution: &str) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(HpcExecError::config("service name must not be empty"));
        }
        if num_nodes == 0 {
            return Err(HpcExecError::config(format!(
                "service '{name}' must request at least one node"
            )));
        }

        let parsed = parse_distribution(distribution)
            .map_err(|msg| HpcExecError::config(format!("service '{name}': {msg}")))?;
        let distribution = resolve_counts(&name, num_nodes, parsed)?;

        Ok(Self {
            name,
            num_nodes,
            distribution,
            assigned: Vec::new(),
            hostfile: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Colors and their counts, in declaration order.
    pub fn distribution(&self) -> &[(String, usize)] {
        &self.distribution
    }

    pub fn count_for(&self, color: &str) -> Option<usize> {
        self.distribution
            .iter()
            .find(|(c, _)| c == color)
            .map(|(_, n)| *n)
    }

    pub fn assigned_nodes(&self) -> &[String] {
        &self.assigned
    }

    /// The host set, once nodes have been assigned.
    pub fn hostfile(&self) -> Option<&Hostfile> {
        self.hostfile.as_ref()
    }

    pub fn is_assigned(&self) -> bool {
        self.hostfile.is_some()
    }

    pub(crate) fn assign(&mut self, nodes: Vec<String>) -> Result<()> {
        if self.is_assigned() {
            return Err(HpcExecError::config(format!(
                "service '{}' already has nodes assigned",
                self.name
            )));
        }
        self.hostfile = Some(Hostfile::from_hosts(&nodes)?);
        self.assigned = nodes;
        Ok(())
    }
}

/// Split a distribution string into `(color, count)` pairs.
///
/// Counts are optional here; [`Service::new`] decides whether a missing
/// count is allowed.
pub fn parse_distribution(distribution: &str) -> std::result::Result<Vec<(String, Option<usize>)>, String> {
    let mut seen = HashSet::new();
    let mut parsed = Vec::new();

    for part in distribution.split('+') {
        let part = part.trim();
        let (color, count) = match part.split_once(':') {
            Some((color, count)) => {
                let count = count
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid node count '{}' for color '{}'", count.trim(), color.trim()))?;
                (color.trim(), Some(count))
            }
            None => (part, None),
        };

        if color.is_empty() {
            return Err(format!("empty color in distribution '{distribution}'"));
        }
        if count == Some(0) {
            return Err(format!("color '{color}' must have at least one node"));
        }
        if !seen.insert(color.to_string()) {
            return Err(format!("color '{color}' is listed more than once"));
        }
        parsed.push((color.to_string(), count));
    }

    Ok(parsed)
}

fn resolve_counts(
    name: &str,
    num_nodes: usize,
    parsed: Vec<(String, Option<usize>)>,
) -> Result<Vec<(String, usize)>> {
    if let [(color, count)] = parsed.as_slice() {
        return match count {
            None => Ok(vec![(color.clone(), num_nodes)]),
            Some(n) if *n == num_nodes => Ok(vec![(color.clone(), *n)]),
            Some(n) => Err(HpcExecError::config(format!(
                "service '{name}' requests {num_nodes} nodes but color '{color}' is given {n}"
            ))),
        };
    }

    let mut resolved = Vec::with_capacity(parsed.len());
    for (color, count) in parsed {
        let Some(count) = count else {
            return Err(HpcExecError::config(format!(
                "service '{name}': color '{color}' needs an explicit count when several colors are used"
            )));
        };
        resolved.push((color, count));
    }

    let total: usize = resolved.iter().map(|(_, n)| n).sum();
    if total != num_nodes {
        return Err(HpcExecError::config(format!(
            "service '{name}': color counts add up to {total} but {num_nodes} nodes are requested"
        )));
    }
    Ok(resolved)
}
