// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a command is launched.
///
/// The MPI variants select the `mpiexec` dialect; `Mpi` asks the runner to
/// detect the installed implementation from `mpiexec --version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecMode {
    Local,
    Ssh,
    Pssh,
    Mpi,
    Mpich,
    OpenMpi,
    IntelMpi,
    CrayMpich,
    Slurm,
    Pbs,
}

impl Default for ExecMode {
    fn default() -> Self {
        ExecMode::Local
    }
}

impl ExecMode {
    pub fn is_mpi(self) -> bool {
        matches!(
            self,
            ExecMode::Mpi
                | ExecMode::Mpich
                | ExecMode::OpenMpi
                | ExecMode::IntelMpi
                | ExecMode::CrayMpich
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecMode::Local => "local",
            ExecMode::Ssh => "ssh",
            ExecMode::Pssh => "pssh",
            ExecMode::Mpi => "mpi",
            ExecMode::Mpich => "mpich",
            ExecMode::OpenMpi => "open-mpi",
            ExecMode::IntelMpi => "intel-mpi",
            ExecMode::CrayMpich => "cray-mpich",
            ExecMode::Slurm => "slurm",
            ExecMode::Pbs => "pbs",
        }
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "local" => Ok(ExecMode::Local),
            "ssh" => Ok(ExecMode::Ssh),
            "pssh" => Ok(ExecMode::Pssh),
            "mpi" => Ok(ExecMode::Mpi),
            "mpich" => Ok(ExecMode::Mpich),
            "openmpi" | "open-mpi" => Ok(ExecMode::OpenMpi),
            "intel-mpi" | "intelmpi" => Ok(ExecMode::IntelMpi),
            "cray-mpich" | "craympich" => Ok(ExecMode::CrayMpich),
            "slurm" => Ok(ExecMode::Slurm),
            "pbs" => Ok(ExecMode::Pbs),
            other => Err(format!(
                "invalid exec mode: {other} (expected local, ssh, pssh, mpi, mpich, openmpi, intel-mpi, cray-mpich, slurm or pbs)"
            )),
        }
    }
}

/// How services that declare the same color share that color's node pool.
///
/// - `Exclusive`: each service takes the next unused nodes of the pool, so no
///   two services ever receive the same node (default).
/// - `Colocated`: every service takes the pool from its start, so services
///   sharing a color run on the same nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolPolicy {
    Exclusive,
    Colocated,
}

impl Default for PoolPolicy {
    fn default() -> Self {
        PoolPolicy::Exclusive
    }
}

impl FromStr for PoolPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exclusive" => Ok(PoolPolicy::Exclusive),
            "colocated" => Ok(PoolPolicy::Colocated),
            other => Err(format!(
                "invalid pool policy: {other} (expected \"exclusive\" or \"colocated\")"
            )),
        }
    }
}

/// Which process stream a piece of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}
