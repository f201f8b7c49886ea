// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`config`] holds [`ExecConfig`] and its builder.
//! - [`executable`] defines the [`Executable`] contract shared by all runners
//!   together with command synthesis and output aggregation helpers.
//! - [`local`] runs a command on this machine; every other runner ends up
//!   driving a [`LocalRunner`].
//! - [`ssh`], [`pssh`], [`mpi`] and [`scheduler`] build launcher lines for
//!   remote, fan-out, MPI and batch execution.
//! - [`process`], [`build`] and [`tools`] are small command builders on top
//!   of [`execute`] (pkill, cmake/make, spark-submit, callgrind, monitor).

pub mod build;
pub mod config;
pub mod executable;
pub mod local;
pub mod mpi;
pub mod process;
pub mod pssh;
pub mod scheduler;
pub mod ssh;
pub mod tools;

pub use config::{ExecConfig, ExecConfigBuilder, ExecDefaults, HostSpec, HostfileSpec};
pub use executable::{CommandList, Executable, Output};
pub use local::LocalRunner;
pub use mpi::{MpiFlavor, MpiRunner};
pub use pssh::PsshRunner;
pub use scheduler::{PbsOptions, PbsRunner, SlurmOptions, SlurmRunner};
pub use ssh::SshRunner;

use tracing::debug;

use crate::errors::Result;
use crate::types::ExecMode;

/// Run `cmds` with the runner selected by `config.mode()`.
pub async fn execute(
    cmds: impl Into<CommandList>,
    config: &ExecConfig,
) -> Result<Box<dyn Executable>> {
    let cmds = cmds.into();
    debug!(mode = %config.mode(), statements = cmds.len(), "dispatching command");

    let run: Box<dyn Executable> = match config.mode() {
        ExecMode::Local => Box::new(LocalRunner::spawn(cmds, config).await?),
        ExecMode::Ssh => Box::new(SshRunner::spawn(cmds, config).await?),
        ExecMode::Pssh => Box::new(PsshRunner::spawn(cmds, config).await?),
        ExecMode::Mpi
        | ExecMode::Mpich
        | ExecMode::OpenMpi
        | ExecMode::IntelMpi
        | ExecMode::CrayMpich => Box::new(MpiRunner::spawn(cmds, config).await?),
        ExecMode::Slurm => Box::new(SlurmRunner::spawn(cmds, config).await?),
        ExecMode::Pbs => Box::new(PbsRunner::spawn(cmds, config).await?),
    };
    Ok(run)
}
