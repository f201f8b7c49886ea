// src/exec/mpi.rs

//! MPI launches through `mpiexec`.
//!
//! The launcher line differs per implementation (how environment variables
//! are forwarded, how hosts and per-node counts are spelled), so the flavor
//! is taken from the exec mode or, for plain `mpi`, detected from
//! `mpiexec --version`.

use tracing::{debug, info};

use crate::errors::{HpcExecError, Result};
use crate::exec::config::ExecConfig;
use crate::exec::executable::{
    CommandList, Executable, Output, WaitFuture, debug_cmd, shell_quote, smash_cmd,
};
use crate::exec::local::LocalRunner;
use crate::types::ExecMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpiFlavor {
    OpenMpi,
    Mpich,
    IntelMpi,
    CrayMpich,
}

impl MpiFlavor {
    /// The flavor named by an exec mode; `None` for `mpi` and non-MPI modes.
    pub fn from_mode(mode: ExecMode) -> Option<Self> {
        match mode {
            ExecMode::OpenMpi => Some(MpiFlavor::OpenMpi),
            ExecMode::Mpich => Some(MpiFlavor::Mpich),
            ExecMode::IntelMpi => Some(MpiFlavor::IntelMpi),
            ExecMode::CrayMpich => Some(MpiFlavor::CrayMpich),
            _ => None,
        }
    }

    /// Recognise an implementation from `mpiexec --version` output.
    pub fn from_version_output(text: &str) -> Option<Self> {
        if text.contains("Open MPI") || text.contains("OpenRTE") {
            Some(MpiFlavor::OpenMpi)
        } else if text.contains("Intel(R) MPI") {
            Some(MpiFlavor::IntelMpi)
        } else if text.contains("PALS") || text.contains("Cray") {
            Some(MpiFlavor::CrayMpich)
        } else if text.contains("HYDRA") || text.contains("MPICH") {
            Some(MpiFlavor::Mpich)
        } else {
            None
        }
    }

    /// Ask the local `mpiexec` which implementation it is.
    pub async fn detect(config: &ExecConfig) -> Result<Self> {
        let probe = config
            .launcher(true)
            .modify()
            .hosts("localhost")
            .collect_output(true)
            .hide_output(true)
            .exec_async(false)
            .build()?;
        let run = LocalRunner::spawn("mpiexec --version", &probe).await?;
        let text = format!("{}\n{}", run.stdout().joined(), run.stderr().joined());
        let flavor = Self::from_version_output(&text).ok_or_else(|| {
            HpcExecError::config("could not detect the MPI implementation from `mpiexec --version`")
        })?;
        debug!(?flavor, "detected MPI implementation");
        Ok(flavor)
    }
}

/// A command launched through `mpiexec` on the local machine.
pub struct MpiRunner {
    flavor: MpiFlavor,
    inner: LocalRunner,
}

impl MpiRunner {
    pub async fn spawn(cmds: impl Into<CommandList>, config: &ExecConfig) -> Result<Self> {
        let cmds = cmds.into();
        let flavor = match MpiFlavor::from_mode(config.mode()) {
            Some(flavor) => flavor,
            None => MpiFlavor::detect(config).await?,
        };
        let line = mpi_command(flavor, &cmds, config);
        info!(?flavor, "launching MPI job");
        let inner = LocalRunner::spawn(line, &config.launcher(true)).await?;
        Ok(Self { flavor, inner })
    }

    pub fn flavor(&self) -> MpiFlavor {
        self.flavor
    }

    pub fn cmd(&self) -> &str {
        self.inner.cmd()
    }
}

impl Executable for MpiRunner {
    fn exit_code(&self) -> Option<i32> {
        self.inner.exit_code()
    }

    fn stdout(&self) -> &Output {
        self.inner.stdout()
    }

    fn stderr(&self) -> &Output {
        self.inner.stderr()
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        self.inner.wait()
    }
}

/// Build the `mpiexec` line for `flavor`.
///
/// Without an explicit process count, one process per host (times `ppn`) is
/// launched.
pub fn mpi_command(flavor: MpiFlavor, cmds: &CommandList, config: &ExecConfig) -> String {
    let hostfile = config.hostfile();
    let nprocs = config
        .nprocs()
        .unwrap_or_else(|| hostfile.len().max(1) * config.ppn().unwrap_or(1));

    let mut parts = vec!["mpiexec".to_string(), format!("-n {nprocs}")];

    match flavor {
        MpiFlavor::OpenMpi => {
            parts.push("--oversubscribe".to_string());
            if let Some(ppn) = config.ppn() {
                parts.push(format!("-npernode {ppn}"));
            }
        }
        MpiFlavor::Mpich | MpiFlavor::IntelMpi => {
            if let Some(ppn) = config.ppn() {
                parts.push(format!("-ppn {ppn}"));
            }
        }
        MpiFlavor::CrayMpich => {
            if let Some(ppn) = config.ppn() {
                parts.push(format!("--ppn {ppn}"));
            }
        }
    }

    if !hostfile.is_local() {
        let (file_flag, host_flag) = match flavor {
            MpiFlavor::OpenMpi => ("--hostfile", "--host"),
            MpiFlavor::Mpich => ("-f", "--host"),
            MpiFlavor::IntelMpi => ("-f", "-hosts"),
            MpiFlavor::CrayMpich => ("--hostfile", "--hosts"),
        };
        match hostfile.path() {
            Some(path) => parts.push(format!(
                "{file_flag} {}",
                shell_quote(&path.display().to_string())
            )),
            None => parts.push(format!("{host_flag} {}", hostfile.hosts().join(","))),
        }
    }

    for (key, val) in config.forwarded_env() {
        let val = shell_quote(val);
        parts.push(match flavor {
            MpiFlavor::OpenMpi => format!("-x {key}={val}"),
            MpiFlavor::Mpich | MpiFlavor::IntelMpi => format!("-genv {key} {val}"),
            MpiFlavor::CrayMpich => format!("--env {key}={val}"),
        });
    }

    let mut cmd = smash_cmd(cmds, config.sudo(), config.forwarded_env(), config.sudoenv());
    if config.do_dbg() {
        if let Some(port) = config.dbg_port() {
            cmd = debug_cmd(&cmd, port, config.env());
        }
    }
    // Every rank runs the whole sequence, not just the first statement.
    if cmds.len() > 1 {
        cmd = format!("sh -c {}", shell_quote(&cmd));
    }
    parts.push(cmd);
    parts.join(" ")
}
