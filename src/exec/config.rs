// src/exec/config.rs

//! Execution configuration.
//!
//! [`ExecConfig`] bundles everything a runner needs: launch mode, target
//! hosts, credentials, environment, working directory, output handling and
//! timing. It is built once through [`ExecConfigBuilder`] and never mutated
//! afterwards; [`ExecConfig::modify`] hands back a builder seeded with the
//! current values for derived configs.
//!
//! Building a config snapshots a fixed allow-list of variables from the
//! ambient process environment (see [`FORWARDED_ENV_KEYS`]). The snapshot is
//! taken once, at build time, and is what remote and elevated launches
//! forward to the target since they cannot rely on a login shell.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{HpcExecError, Result};
use crate::exec::scheduler::{PbsOptions, SlurmOptions};
use crate::hosts::Hostfile;
use crate::types::ExecMode;

/// Variables copied from the ambient environment when not overridden.
pub const FORWARDED_ENV_KEYS: [&str; 8] = [
    "PATH",
    "LD_LIBRARY_PATH",
    "LIBRARY_PATH",
    "CMAKE_PREFIX_PATH",
    "PYTHONPATH",
    "CPATH",
    "INCLUDE",
    "JAVA_HOME",
];

/// Dynamic-linker preload variable; never part of the forwarded set.
pub const PRELOAD_KEY: &str = "LD_PRELOAD";

/// Output defaults applied when a builder leaves `collect_output` or
/// `hide_output` unset.
///
/// Usually comes from the `[defaults]` section of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ExecDefaults {
    #[serde(default)]
    pub collect_output: bool,
    #[serde(default)]
    pub hide_output: bool,
}

/// Explicit target hosts.
#[derive(Debug, Clone)]
pub enum HostSpec {
    One(String),
    Many(Vec<String>),
    Parsed(Hostfile),
}

impl From<&str> for HostSpec {
    fn from(host: &str) -> Self {
        HostSpec::One(host.to_string())
    }
}

impl From<String> for HostSpec {
    fn from(host: String) -> Self {
        HostSpec::One(host)
    }
}

impl From<Vec<String>> for HostSpec {
    fn from(hosts: Vec<String>) -> Self {
        HostSpec::Many(hosts)
    }
}

impl From<Vec<&str>> for HostSpec {
    fn from(hosts: Vec<&str>) -> Self {
        HostSpec::Many(hosts.into_iter().map(str::to_string).collect())
    }
}

impl From<Hostfile> for HostSpec {
    fn from(hostfile: Hostfile) -> Self {
        HostSpec::Parsed(hostfile)
    }
}

/// A host-file reference: a path to read, or an already parsed file.
#[derive(Debug, Clone)]
pub enum HostfileSpec {
    Path(PathBuf),
    Parsed(Hostfile),
}

impl From<PathBuf> for HostfileSpec {
    fn from(path: PathBuf) -> Self {
        HostfileSpec::Path(path)
    }
}

impl From<&str> for HostfileSpec {
    fn from(path: &str) -> Self {
        HostfileSpec::Path(PathBuf::from(path))
    }
}

impl From<Hostfile> for HostfileSpec {
    fn from(hostfile: Hostfile) -> Self {
        HostfileSpec::Parsed(hostfile)
    }
}

/// Everything needed to run a command somewhere.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    mode: ExecMode,
    nprocs: Option<usize>,
    ppn: Option<usize>,
    user: Option<String>,
    pkey: Option<PathBuf>,
    port: Option<u16>,
    hostfile: Hostfile,
    env: BTreeMap<String, String>,
    forwarded_env: BTreeMap<String, String>,
    snapshot: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
    sudo: bool,
    sudoenv: bool,
    collect_output: bool,
    pipe_stdout: Option<PathBuf>,
    pipe_stderr: Option<PathBuf>,
    hide_output: bool,
    exec_async: bool,
    stdin: Option<String>,
    do_dbg: bool,
    dbg_port: Option<u16>,
    strict_ssh: bool,
    sleep: Duration,
    timeout: Option<Duration>,
    slurm: Option<SlurmOptions>,
    pbs: Option<PbsOptions>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            mode: ExecMode::Local,
            nprocs: None,
            ppn: None,
            user: None,
            pkey: None,
            port: None,
            hostfile: Hostfile::local(),
            env: BTreeMap::new(),
            forwarded_env: BTreeMap::new(),
            snapshot: BTreeMap::new(),
            cwd: None,
            sudo: false,
            sudoenv: true,
            collect_output: false,
            pipe_stdout: None,
            pipe_stderr: None,
            hide_output: false,
            exec_async: false,
            stdin: None,
            do_dbg: false,
            dbg_port: None,
            strict_ssh: false,
            sleep: Duration::ZERO,
            timeout: None,
            slurm: None,
            pbs: None,
        }
    }
}

impl ExecConfig {
    pub fn builder() -> ExecConfigBuilder {
        ExecConfigBuilder::default()
    }

    /// Local execution with default settings and a fresh environment snapshot.
    pub fn local() -> Self {
        let mut config = Self::default();
        config.resolve_env(BTreeMap::new(), std::env::vars());
        config
    }

    /// Start a derived config.
    ///
    /// The returned builder is seeded with every field of `self`; anything
    /// set on it overrides, everything else is carried over on `build()`.
    pub fn modify(&self) -> ExecConfigBuilder {
        ExecConfigBuilder {
            mode: Some(self.mode),
            nprocs: self.nprocs,
            ppn: self.ppn,
            user: self.user.clone(),
            pkey: self.pkey.clone(),
            port: self.port,
            hosts: None,
            hostfile: None,
            inherited_hosts: Some(self.hostfile.clone()),
            env: Some(self.env.clone()),
            cwd: self.cwd.clone(),
            sudo: Some(self.sudo),
            sudoenv: Some(self.sudoenv),
            collect_output: Some(self.collect_output),
            pipe_stdout: self.pipe_stdout.clone(),
            pipe_stderr: self.pipe_stderr.clone(),
            hide_output: Some(self.hide_output),
            exec_async: Some(self.exec_async),
            stdin: self.stdin.clone(),
            do_dbg: Some(self.do_dbg),
            dbg_port: self.dbg_port,
            strict_ssh: Some(self.strict_ssh),
            sleep: Some(self.sleep),
            timeout: self.timeout,
            slurm: self.slurm.clone(),
            pbs: self.pbs.clone(),
            defaults: ExecDefaults::default(),
            snapshot: Some(self.snapshot.clone()),
        }
    }

    /// Config for the local process that carries a remote or batch launch
    /// (`ssh`, `mpiexec`, `sbatch`, ...).
    ///
    /// Elevation and debugging belong to the wrapped command, not to the
    /// launcher. `keep_cwd` is false when the working directory names a path
    /// on the remote side.
    pub(crate) fn launcher(&self, keep_cwd: bool) -> ExecConfig {
        let mut config = self.clone();
        config.sudo = false;
        config.do_dbg = false;
        if !keep_cwd {
            config.cwd = None;
        }
        config
    }

    /// Config for a batch submission command.
    ///
    /// Only the forwarded environment reaches the submitter, and the output
    /// files are handed to the scheduler instead of being written locally.
    pub(crate) fn submitter(&self) -> ExecConfig {
        let mut config = self.launcher(true);
        config.env = self.forwarded_env.clone();
        config.pipe_stdout = None;
        config.pipe_stderr = None;
        config
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn nprocs(&self) -> Option<usize> {
        self.nprocs
    }

    pub fn ppn(&self) -> Option<usize> {
        self.ppn
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn pkey(&self) -> Option<&std::path::Path> {
        self.pkey.as_deref()
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn hostfile(&self) -> &Hostfile {
        &self.hostfile
    }

    /// Caller overrides merged with the adopted allow-list values.
    ///
    /// May contain `LD_PRELOAD` if the caller set it explicitly.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// The minimal environment forwarded to remote and elevated launches.
    ///
    /// Never contains `LD_PRELOAD`.
    pub fn forwarded_env(&self) -> &BTreeMap<String, String> {
        &self.forwarded_env
    }

    pub fn cwd(&self) -> Option<&std::path::Path> {
        self.cwd.as_deref()
    }

    pub fn sudo(&self) -> bool {
        self.sudo
    }

    pub fn sudoenv(&self) -> bool {
        self.sudoenv
    }

    pub fn collect_output(&self) -> bool {
        self.collect_output
    }

    pub fn pipe_stdout(&self) -> Option<&std::path::Path> {
        self.pipe_stdout.as_deref()
    }

    pub fn pipe_stderr(&self) -> Option<&std::path::Path> {
        self.pipe_stderr.as_deref()
    }

    pub fn hide_output(&self) -> bool {
        self.hide_output
    }

    pub fn exec_async(&self) -> bool {
        self.exec_async
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    pub fn do_dbg(&self) -> bool {
        self.do_dbg
    }

    pub fn dbg_port(&self) -> Option<u16> {
        self.dbg_port
    }

    pub fn strict_ssh(&self) -> bool {
        self.strict_ssh
    }

    /// Delay applied before the process is spawned.
    pub fn sleep(&self) -> Duration {
        self.sleep
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn slurm(&self) -> Option<&SlurmOptions> {
        self.slurm.as_ref()
    }

    pub fn pbs(&self) -> Option<&PbsOptions> {
        self.pbs.as_ref()
    }

    fn resolve_env<I, K, V>(&mut self, overrides: BTreeMap<String, String>, ambient: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let snapshot: BTreeMap<String, String> = ambient
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| FORWARDED_ENV_KEYS.contains(&k.as_str()))
            .collect();

        let mut env = overrides;
        for (key, val) in &snapshot {
            env.entry(key.clone()).or_insert_with(|| val.clone());
        }

        let mut forwarded = env.clone();
        forwarded.remove(PRELOAD_KEY);

        self.env = env;
        self.forwarded_env = forwarded;
        self.snapshot = snapshot;
    }
}

/// Builder for [`ExecConfig`].
///
/// Unset output flags fall back to the [`ExecDefaults`] passed through
/// [`ExecConfigBuilder::defaults`].
#[derive(Debug, Clone, Default)]
pub struct ExecConfigBuilder {
    mode: Option<ExecMode>,
    nprocs: Option<usize>,
    ppn: Option<usize>,
    user: Option<String>,
    pkey: Option<PathBuf>,
    port: Option<u16>,
    hosts: Option<HostSpec>,
    hostfile: Option<HostfileSpec>,
    inherited_hosts: Option<Hostfile>,
    env: Option<BTreeMap<String, String>>,
    cwd: Option<PathBuf>,
    sudo: Option<bool>,
    sudoenv: Option<bool>,
    collect_output: Option<bool>,
    pipe_stdout: Option<PathBuf>,
    pipe_stderr: Option<PathBuf>,
    hide_output: Option<bool>,
    exec_async: Option<bool>,
    stdin: Option<String>,
    do_dbg: Option<bool>,
    dbg_port: Option<u16>,
    strict_ssh: Option<bool>,
    sleep: Option<Duration>,
    timeout: Option<Duration>,
    slurm: Option<SlurmOptions>,
    pbs: Option<PbsOptions>,
    defaults: ExecDefaults,
    snapshot: Option<BTreeMap<String, String>>,
}

impl ExecConfigBuilder {
    pub fn mode(mut self, mode: ExecMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn nprocs(mut self, nprocs: usize) -> Self {
        self.nprocs = Some(nprocs);
        self
    }

    pub fn ppn(mut self, ppn: usize) -> Self {
        self.ppn = Some(ppn);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn pkey(mut self, pkey: impl Into<PathBuf>) -> Self {
        self.pkey = Some(pkey.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Explicit target hosts. Conflicts with [`Self::hostfile`].
    pub fn hosts(mut self, hosts: impl Into<HostSpec>) -> Self {
        self.hosts = Some(hosts.into());
        self
    }

    /// Host-file reference. Conflicts with [`Self::hosts`].
    pub fn hostfile(mut self, hostfile: impl Into<HostfileSpec>) -> Self {
        self.hostfile = Some(hostfile.into());
        self
    }

    /// Replace the environment overrides.
    pub fn env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(env.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Add or replace a single environment override.
    pub fn env_var(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), val.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = Some(sudo);
        self
    }

    pub fn sudoenv(mut self, sudoenv: bool) -> Self {
        self.sudoenv = Some(sudoenv);
        self
    }

    pub fn collect_output(mut self, collect: bool) -> Self {
        self.collect_output = Some(collect);
        self
    }

    pub fn pipe_stdout(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipe_stdout = Some(path.into());
        self
    }

    pub fn pipe_stderr(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipe_stderr = Some(path.into());
        self
    }

    pub fn hide_output(mut self, hide: bool) -> Self {
        self.hide_output = Some(hide);
        self
    }

    pub fn exec_async(mut self, exec_async: bool) -> Self {
        self.exec_async = Some(exec_async);
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn do_dbg(mut self, do_dbg: bool) -> Self {
        self.do_dbg = Some(do_dbg);
        self
    }

    pub fn dbg_port(mut self, port: u16) -> Self {
        self.dbg_port = Some(port);
        self
    }

    pub fn strict_ssh(mut self, strict: bool) -> Self {
        self.strict_ssh = Some(strict);
        self
    }

    pub fn sleep(mut self, delay: Duration) -> Self {
        self.sleep = Some(delay);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn slurm(mut self, options: SlurmOptions) -> Self {
        self.slurm = Some(options);
        self
    }

    pub fn pbs(mut self, options: PbsOptions) -> Self {
        self.pbs = Some(options);
        self
    }

    pub fn defaults(mut self, defaults: ExecDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Build, snapshotting the ambient process environment.
    ///
    /// Builders from [`ExecConfig::modify`] reuse the snapshot of the config
    /// they were derived from instead of reading the environment again.
    pub fn build(mut self) -> Result<ExecConfig> {
        match self.snapshot.take() {
            Some(snapshot) => self.build_with_ambient(snapshot),
            None => self.build_with_ambient(std::env::vars()),
        }
    }

    /// Build against an explicit ambient environment.
    pub fn build_with_ambient<I, K, V>(self, ambient: I) -> Result<ExecConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let hostfile = resolve_hosts(self.hosts, self.hostfile, self.inherited_hosts)?;

        let do_dbg = self.do_dbg.unwrap_or(false);
        if do_dbg && self.dbg_port.is_none() {
            return Err(HpcExecError::config(
                "debugging was requested but no debug port is set",
            ));
        }
        if self.nprocs == Some(0) {
            return Err(HpcExecError::config("nprocs must be >= 1 (got 0)"));
        }
        if self.ppn == Some(0) {
            return Err(HpcExecError::config("ppn must be >= 1 (got 0)"));
        }

        let mut config = ExecConfig {
            mode: self.mode.unwrap_or_default(),
            nprocs: self.nprocs,
            ppn: self.ppn,
            user: self.user,
            pkey: self.pkey,
            port: self.port,
            hostfile,
            env: BTreeMap::new(),
            forwarded_env: BTreeMap::new(),
            snapshot: BTreeMap::new(),
            cwd: self.cwd,
            sudo: self.sudo.unwrap_or(false),
            sudoenv: self.sudoenv.unwrap_or(true),
            collect_output: self.collect_output.unwrap_or(self.defaults.collect_output),
            pipe_stdout: self.pipe_stdout,
            pipe_stderr: self.pipe_stderr,
            hide_output: self.hide_output.unwrap_or(self.defaults.hide_output),
            exec_async: self.exec_async.unwrap_or(false),
            stdin: self.stdin,
            do_dbg,
            dbg_port: self.dbg_port,
            strict_ssh: self.strict_ssh.unwrap_or(false),
            sleep: self.sleep.unwrap_or(Duration::ZERO),
            timeout: self.timeout,
            slurm: self.slurm,
            pbs: self.pbs,
        };
        config.resolve_env(self.env.unwrap_or_default(), ambient);
        Ok(config)
    }
}

fn resolve_hosts(
    hosts: Option<HostSpec>,
    hostfile: Option<HostfileSpec>,
    inherited: Option<Hostfile>,
) -> Result<Hostfile> {
    match (hosts, hostfile) {
        (Some(_), Some(_)) => Err(HpcExecError::config(
            "must choose either hosts or hostfile, not both",
        )),
        (Some(HostSpec::One(host)), None) => Hostfile::from_hosts([host]),
        (Some(HostSpec::Many(hosts)), None) => Hostfile::from_hosts(hosts),
        (Some(HostSpec::Parsed(hostfile)), None) => Ok(hostfile),
        (None, Some(HostfileSpec::Path(path))) => Hostfile::from_path(path),
        (None, Some(HostfileSpec::Parsed(hostfile))) => Ok(hostfile),
        (None, None) => Ok(inherited.unwrap_or_default()),
    }
}
