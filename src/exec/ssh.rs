// src/exec/ssh.rs

//! Single-host SSH runner.

use tracing::debug;

use crate::errors::Result;
use crate::exec::config::ExecConfig;
use crate::exec::executable::{
    CommandList, Executable, Output, WaitFuture, debug_cmd, shell_quote, smash_cmd,
};
use crate::exec::local::LocalRunner;

/// Runs a command on the first host of the config's host set over `ssh`.
///
/// A local host set skips ssh entirely and runs the command in place.
pub struct SshRunner {
    host: String,
    inner: LocalRunner,
}

impl SshRunner {
    pub async fn spawn(cmds: impl Into<CommandList>, config: &ExecConfig) -> Result<Self> {
        let cmds = cmds.into();
        let hostfile = config.hostfile();
        let host = hostfile
            .hosts()
            .first()
            .cloned()
            .unwrap_or_else(|| "localhost".to_string());

        let inner = if hostfile.is_local() {
            debug!(host = %host, "host set is local; running without ssh");
            LocalRunner::spawn(cmds, config).await?
        } else {
            let line = ssh_command(&cmds, &host, config);
            LocalRunner::spawn(line, &config.launcher(false)).await?
        };

        Ok(Self { host, inner })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The local command line (the full `ssh ...` invocation when remote).
    pub fn cmd(&self) -> &str {
        self.inner.cmd()
    }
}

impl Executable for SshRunner {
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

/// Build the `ssh` invocation for `host`.
///
/// The remote side exports the forwarded environment, changes into the
/// working directory and then runs the (possibly elevated and debug-wrapped)
/// command, all inside one quoted argument.
pub fn ssh_command(cmds: &CommandList, host: &str, config: &ExecConfig) -> String {
    let mut parts = vec!["ssh".to_string()];
    if let Some(pkey) = config.pkey() {
        parts.push(format!("-i {}", shell_quote(&pkey.display().to_string())));
    }
    if let Some(port) = config.port() {
        parts.push(format!("-p {port}"));
    }
    if !config.strict_ssh() {
        parts.push("-o StrictHostKeyChecking=no".to_string());
    }
    parts.push(match config.user() {
        Some(user) => format!("{user}@{host}"),
        None => host.to_string(),
    });

    let mut remote = Vec::new();
    for (key, val) in config.forwarded_env() {
        remote.push(format!("export {key}={};", shell_quote(val)));
    }
    if let Some(cwd) = config.cwd() {
        remote.push(format!("cd {};", shell_quote(&cwd.display().to_string())));
    }

    let mut cmd = smash_cmd(cmds, config.sudo(), config.forwarded_env(), config.sudoenv());
    if config.do_dbg() {
        if let Some(port) = config.dbg_port() {
            cmd = debug_cmd(&cmd, port, config.env());
        }
    }
    remote.push(cmd);

    parts.push(shell_quote(&remote.join(" ")));
    parts.join(" ")
}
