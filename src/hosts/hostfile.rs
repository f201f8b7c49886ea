// src/hosts/hostfile.rs

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::errors::Result;
use crate::hosts::expand::{expand_pattern, split_top_level};

const LOCALHOST: &str = "localhost";

/// An ordered, deduplicated set of hosts.
///
/// A hostfile either comes from a file on disk (then [`Hostfile::path`] is
/// set and MPI launchers can pass it through as `--hostfile`) or from an
/// in-memory list. The default value is the local machine alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hostfile {
    hosts: Vec<String>,
    path: Option<PathBuf>,
}

impl Default for Hostfile {
    fn default() -> Self {
        Self::local()
    }
}

impl Hostfile {
    /// The single-node default: just `localhost`.
    pub fn local() -> Self {
        Self {
            hosts: vec![LOCALHOST.to_string()],
            path: None,
        }
    }

    /// Build from host names or node-list patterns.
    ///
    /// Each entry may be a plain name, a bracket pattern or a comma list of
    /// either. Duplicates are dropped, first occurrence wins.
    pub fn from_hosts<I, S>(hosts: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut expanded = Vec::new();
        for entry in hosts {
            for part in split_top_level(entry.as_ref()) {
                expanded.extend(expand_pattern(&part)?);
            }
        }
        Ok(Self {
            hosts: dedup(expanded),
            path: None,
        })
    }

    /// Parse hostfile text: one entry per line, `#` starts a comment.
    pub fn parse(text: &str) -> Result<Self> {
        let entries = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty());
        Self::from_hosts(entries)
    }

    /// Read and parse a hostfile from disk, remembering its path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading hostfile {:?}", path))?;
        let mut hostfile = Self::parse(&text)?;
        hostfile.path = Some(path.to_path_buf());
        Ok(hostfile)
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// True when the set names nothing but the local machine.
    pub fn is_local(&self) -> bool {
        match self.hosts.as_slice() {
            [] => true,
            [only] => matches!(only.as_str(), LOCALHOST | "127.0.0.1" | "::1"),
            _ => false,
        }
    }

    /// The first `count` hosts, detached from any file on disk.
    pub fn subset(&self, count: usize) -> Self {
        Self {
            hosts: self.hosts.iter().take(count).cloned().collect(),
            path: None,
        }
    }

    /// Hostfile text, one host per line with a trailing newline.
    pub fn to_text(&self) -> String {
        let mut text = self.hosts.join("\n");
        text.push('\n');
        text
    }

    /// Write the host list to `path` and return a copy that points at it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating dir {:?}", parent))?;
            }
        }
        fs::write(path, self.to_text()).with_context(|| format!("writing hostfile {:?}", path))?;
        Ok(Self {
            hosts: self.hosts.clone(),
            path: Some(path.to_path_buf()),
        })
    }
}

fn dedup(hosts: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    hosts
        .into_iter()
        .filter(|h| seen.insert(h.clone()))
        .collect()
}
