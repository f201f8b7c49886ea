// src/exec/scheduler.rs

//! Batch submission through Slurm (`sbatch`) and PBS (`qsub`).
//!
//! Both runners only assemble the submission command and run it locally;
//! the exit status and output are those of the submitter, not of the job.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use crate::errors::{HpcExecError, Result};
use crate::exec::config::ExecConfig;
use crate::exec::executable::{CommandList, Executable, Output, WaitFuture, shell_quote};
use crate::exec::local::LocalRunner;
use crate::hosts::count_expansion;

/// `sbatch` options.
///
/// `ppn` and the output/error files come from the [`ExecConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmOptions {
    pub job_name: Option<String>,
    pub num_nodes: usize,
    pub cpus_per_task: Option<usize>,
    pub time: Option<String>,
    pub partition: Option<String>,
    pub account: Option<String>,
    pub mail_type: Option<String>,
    pub mail_user: Option<String>,
    pub mem: Option<String>,
    pub gres: Option<String>,
    pub exclusive: bool,
    pub nodelist: Option<String>,
}

impl Default for SlurmOptions {
    fn default() -> Self {
        Self {
            job_name: None,
            num_nodes: 1,
            cpus_per_task: None,
            time: None,
            partition: None,
            account: None,
            mail_type: None,
            mail_user: None,
            mem: None,
            gres: None,
            exclusive: false,
            nodelist: None,
        }
    }
}

impl SlurmOptions {
    /// Assemble the `sbatch` line that wraps `cmd`.
    pub fn sbatch_command(&self, cmd: &str, config: &ExecConfig) -> Result<String> {
        if let Some(nodelist) = &self.nodelist {
            let listed = count_expansion(nodelist)?;
            if listed > self.num_nodes {
                return Err(HpcExecError::config(format!(
                    "node list '{nodelist}' names {listed} nodes but only {} were requested",
                    self.num_nodes
                )));
            }
        }

        let mut line = String::from("sbatch");
        let mut opt = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                line.push_str(&format!(" --{name}={}", shell_quote(&value)));
            }
        };

        opt("job-name", self.job_name.clone());
        opt("nodes", Some(self.num_nodes.to_string()));
        opt("ntasks-per-node", config.ppn().map(|p| p.to_string()));
        opt("cpus-per-task", self.cpus_per_task.map(|c| c.to_string()));
        opt("time", self.time.clone());
        opt("partition", self.partition.clone());
        opt("account", self.account.clone());
        opt("mail-type", self.mail_type.clone());
        opt("mail-user", self.mail_user.clone());
        opt("output", config.pipe_stdout().map(|p| p.display().to_string()));
        opt("error", config.pipe_stderr().map(|p| p.display().to_string()));
        opt("mem", self.mem.clone());
        opt("gres", self.gres.clone());
        opt("nodelist", self.nodelist.clone());

        if self.exclusive {
            line.push_str(" --exclusive");
        }
        line.push_str(&format!(" --wrap={}", shell_quote(cmd)));
        Ok(line)
    }
}

/// `qsub` options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbsOptions {
    pub interactive: bool,
    pub nnodes: Option<usize>,
    pub system: Option<String>,
    pub filesystems: Option<String>,
    pub walltime: Option<String>,
    pub account: Option<String>,
    pub queue: Option<String>,
    pub env_vars: Option<String>,
    /// Where the job script is written before submission.
    pub bash_script: PathBuf,
}

impl Default for PbsOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            nnodes: Some(1),
            system: None,
            filesystems: None,
            walltime: None,
            account: None,
            queue: None,
            env_vars: None,
            bash_script: PathBuf::from("pbs_job.sh"),
        }
    }
}

impl PbsOptions {
    /// Assemble the `qsub` line.
    ///
    /// The names of all forwarded variables are appended to `-v` so PBS
    /// exports them into the job.
    pub fn qsub_command(&self, config: &ExecConfig) -> Result<String> {
        let mut line = String::from("qsub");
        if self.interactive {
            line.push_str(" -I");
        }

        match (self.nnodes, &self.system) {
            (Some(n), Some(system)) => line.push_str(&format!(" -l select={n}:system={system}")),
            (Some(n), None) => line.push_str(&format!(" -l select={n}")),
            (None, _) => {
                return Err(HpcExecError::config(
                    "PBS submission needs a node count for `-l select`",
                ));
            }
        }

        if let Some(fs) = &self.filesystems {
            line.push_str(&format!(" -l filesystems={fs}"));
        }
        if let Some(walltime) = &self.walltime {
            line.push_str(&format!(" -l walltime={walltime}"));
        }
        if let Some(account) = &self.account {
            line.push_str(&format!(" -A {}", shell_quote(account)));
        }
        if let Some(queue) = &self.queue {
            line.push_str(&format!(" -q {}", shell_quote(queue)));
        }

        let forwarded = config
            .forwarded_env()
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        let env_vars = match (&self.env_vars, forwarded.is_empty()) {
            (Some(vars), false) => Some(format!("{vars},{forwarded}")),
            (Some(vars), true) => Some(vars.clone()),
            (None, false) => Some(forwarded),
            (None, true) => None,
        };
        if let Some(vars) = env_vars {
            line.push_str(&format!(" -v {}", shell_quote(&vars)));
        }

        line.push_str(&format!(
            " -- {}",
            shell_quote(&self.bash_script.display().to_string())
        ));
        Ok(line)
    }

    /// Write `cmd` into the job script and make it executable.
    pub fn write_script(&self, cmd: &str) -> Result<()> {
        let script = format!("#!/bin/bash\n{cmd}\n");
        fs::write(&self.bash_script, script)
            .with_context(|| format!("writing PBS script {:?}", self.bash_script))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.bash_script)?.permissions();
            perms.set_mode(perms.mode() | 0o755);
            fs::set_permissions(&self.bash_script, perms)?;
        }
        Ok(())
    }
}

/// Submits a command with `sbatch`.
pub struct SlurmRunner {
    inner: LocalRunner,
}

impl SlurmRunner {
    pub async fn spawn(cmds: impl Into<CommandList>, config: &ExecConfig) -> Result<Self> {
        let cmds = cmds.into();
        let options = config.slurm().cloned().unwrap_or_default();
        let line = options.sbatch_command(&cmds.joined(), config)?;
        info!(job_name = ?options.job_name, nodes = options.num_nodes, "submitting slurm job");
        let inner = LocalRunner::spawn(line, &config.submitter()).await?;
        Ok(Self { inner })
    }

    pub fn cmd(&self) -> &str {
        self.inner.cmd()
    }
}

impl Executable for SlurmRunner {
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

/// Submits a command with `qsub` through a generated job script.
pub struct PbsRunner {
    inner: LocalRunner,
}

impl PbsRunner {
    pub async fn spawn(cmds: impl Into<CommandList>, config: &ExecConfig) -> Result<Self> {
        let cmds = cmds.into();
        let options = config.pbs().cloned().unwrap_or_default();
        options.write_script(&cmds.joined())?;
        let line = options.qsub_command(config)?;
        info!(script = ?options.bash_script, "submitting pbs job");
        let inner = LocalRunner::spawn(line, &config.submitter()).await?;
        Ok(Self { inner })
    }

    pub fn cmd(&self) -> &str {
        self.inner.cmd()
    }
}

impl Executable for PbsRunner {
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
