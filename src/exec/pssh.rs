// src/exec/pssh.rs

//! Parallel SSH: the same command on every host of the host set.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::Result;
use crate::exec::config::ExecConfig;
use crate::exec::executable::{
    CommandList, Executable, Output, WaitFuture, first_failure, per_host_outputs, wait_all,
};
use crate::exec::ssh::SshRunner;

/// One asynchronous [`SshRunner`] per host, merged per host on completion.
///
/// Only the first host runs under the debugger when debugging is enabled.
/// With more than one host, output files get a per-host suffix (see
/// [`per_host_path`]).
pub struct PsshRunner {
    runs: Vec<SshRunner>,
    stdout: Output,
    stderr: Output,
    exit_code: Option<i32>,
}

impl PsshRunner {
    pub async fn spawn(cmds: impl Into<CommandList>, config: &ExecConfig) -> Result<Self> {
        let cmds = cmds.into();
        let hostfile = config.hostfile();
        let targets: Vec<String> = if hostfile.is_local() {
            vec!["localhost".to_string()]
        } else {
            hostfile.hosts().to_vec()
        };

        info!(hosts = targets.len(), "starting parallel ssh");

        let mut runs = Vec::with_capacity(targets.len());
        let split_files = targets.len() > 1;
        for (i, host) in targets.iter().enumerate() {
            let mut builder = config
                .modify()
                .hosts(host.as_str())
                .exec_async(true)
                .do_dbg(config.do_dbg() && i == 0);
            if split_files {
                if let Some(path) = config.pipe_stdout() {
                    builder = builder.pipe_stdout(per_host_path(path, host));
                }
                if let Some(path) = config.pipe_stderr() {
                    builder = builder.pipe_stderr(per_host_path(path, host));
                }
            }
            let host_config = builder.build()?;
            runs.push(SshRunner::spawn(cmds.clone(), &host_config).await?);
        }

        let mut runner = Self {
            runs,
            stdout: Output::PerHost(Default::default()),
            stderr: Output::PerHost(Default::default()),
            exit_code: None,
        };
        if !config.exec_async() {
            runner.finish().await?;
        }
        Ok(runner)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(SshRunner::host)
    }

    async fn finish(&mut self) -> Result<Option<i32>> {
        wait_all(&mut self.runs).await?;
        let (stdout, stderr) = per_host_outputs(self.runs.iter().map(|r| (r.host(), r)));
        self.stdout = stdout;
        self.stderr = stderr;
        self.exit_code = first_failure(&self.runs);
        Ok(self.exit_code)
    }
}

/// `out.log` on `node1` becomes `out.log.node1`.
pub fn per_host_path(path: &Path, host: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(host);
    path.with_file_name(name)
}

impl Executable for PsshRunner {
    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn stdout(&self) -> &Output {
        &self.stdout
    }

    fn stderr(&self) -> &Output {
        &self.stderr
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(self.finish())
    }
}
