// src/exec/executable.rs

//! The runner contract and the helpers every runner shares.
//!
//! Runners differ in how they build command lines and which targets they
//! fan out to, but they all end up as "exit status + stdout + stderr". The
//! [`Executable`] trait exposes that, and the free functions here do the
//! command synthesis and multi-target merging so each runner stays small.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::exec::config::PRELOAD_KEY;

/// Future returned by [`Executable::wait`].
pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<i32>>> + Send + 'a>>;

/// Collected output of a run.
///
/// Single-target runs produce text; fan-out runs produce one entry per host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Text(String),
    PerHost(BTreeMap<String, String>),
}

impl Default for Output {
    fn default() -> Self {
        Output::Text(String::new())
    }
}

impl Output {
    /// The text of a single-target run, or `None` for per-host output.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Output::Text(text) => Some(text),
            Output::PerHost(_) => None,
        }
    }

    /// Output of one host. Single-target text is returned for any host.
    pub fn for_host(&self, host: &str) -> Option<&str> {
        match self {
            Output::Text(text) => Some(text),
            Output::PerHost(map) => map.get(host).map(String::as_str),
        }
    }

    /// All output flattened into one string (hosts in ascending order).
    pub fn joined(&self) -> String {
        match self {
            Output::Text(text) => text.clone(),
            Output::PerHost(map) => map.values().cloned().collect::<Vec<_>>().join("\n"),
        }
    }
}

/// One or more shell statements to run in sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandList(Vec<String>);

impl CommandList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The statements joined by `;`.
    pub fn joined(&self) -> String {
        self.0.join(";")
    }
}

impl From<&str> for CommandList {
    fn from(cmd: &str) -> Self {
        CommandList(vec![cmd.to_string()])
    }
}

impl From<String> for CommandList {
    fn from(cmd: String) -> Self {
        CommandList(vec![cmd])
    }
}

impl From<&String> for CommandList {
    fn from(cmd: &String) -> Self {
        CommandList(vec![cmd.clone()])
    }
}

impl From<Vec<String>> for CommandList {
    fn from(cmds: Vec<String>) -> Self {
        CommandList(cmds)
    }
}

impl From<Vec<&str>> for CommandList {
    fn from(cmds: Vec<&str>) -> Self {
        CommandList(cmds.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommandList {
    fn from(cmds: [&str; N]) -> Self {
        CommandList(cmds.into_iter().map(str::to_string).collect())
    }
}

/// Something runnable that ends with an exit status, stdout and stderr.
///
/// The exit status stays `None` until the run has completed, so an
/// asynchronous run that was never waited on is not a failure.
pub trait Executable: Send {
    fn exit_code(&self) -> Option<i32>;

    fn stdout(&self) -> &Output;

    fn stderr(&self) -> &Output;

    /// Block until the run completes and return its exit status.
    ///
    /// Calling it again after completion returns the stored status.
    fn wait(&mut self) -> WaitFuture<'_>;

    fn failed(&self) -> bool {
        is_failure(self.exit_code())
    }
}

impl<T: Executable + ?Sized> Executable for Box<T> {
    fn exit_code(&self) -> Option<i32> {
        (**self).exit_code()
    }

    fn stdout(&self) -> &Output {
        (**self).stdout()
    }

    fn stderr(&self) -> &Output {
        (**self).stderr()
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        (**self).wait()
    }
}

/// An exit status counts as failure only when present and non-zero.
pub fn is_failure(exit_code: Option<i32>) -> bool {
    matches!(exit_code, Some(code) if code != 0)
}

/// Turn one or more commands into a single shell line.
///
/// With `sudo`, every statement is prefixed by `sudo`; if `sudoenv` is also
/// set, one `-E KEY="value"` token per forwarded variable follows, in key
/// order. Statements are joined with `;`.
pub fn smash_cmd(
    cmds: &CommandList,
    sudo: bool,
    env: &BTreeMap<String, String>,
    sudoenv: bool,
) -> String {
    let prefix = if sudo {
        let mut prefix = String::from("sudo");
        if sudoenv {
            for (key, val) in env {
                prefix.push_str(&format!(" -E {key}=\"{val}\""));
            }
        }
        Some(prefix)
    } else {
        None
    };

    cmds.iter()
        .map(|cmd| match &prefix {
            Some(prefix) => format!("{prefix} {cmd}"),
            None => cmd.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Wrap a command so it starts under `gdbserver` on `port`.
///
/// `LD_PRELOAD` is never forwarded generally, so when `env` carries one it is
/// set explicitly on the debugged process instead.
pub fn debug_cmd(cmd: &str, port: u16, env: &BTreeMap<String, String>) -> String {
    match env.get(PRELOAD_KEY).filter(|p| !p.is_empty()) {
        Some(preload) => {
            format!("gdbserver localhost:{port} env {PRELOAD_KEY}={preload} {cmd}")
        }
        None => format!("gdbserver localhost:{port} {cmd}"),
    }
}

/// Quote `s` as a single POSIX shell word.
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Wait for every run in order.
pub async fn wait_all<E: Executable>(runs: &mut [E]) -> Result<()> {
    for run in runs.iter_mut() {
        run.wait().await?;
    }
    Ok(())
}

/// Merge the outputs of runs that executed one after another.
///
/// Returns `(stdout, stderr)`, each the per-run text joined by newlines.
pub fn smash_list_outputs<E: Executable>(runs: &[E]) -> (Output, Output) {
    let join = |pick: fn(&E) -> &Output| {
        runs.iter()
            .map(|run| pick(run).joined())
            .collect::<Vec<_>>()
            .join("\n")
    };
    (
        Output::Text(join(E::stdout)),
        Output::Text(join(E::stderr)),
    )
}

/// Merge the outputs of runs that executed the same command on several hosts.
pub fn per_host_outputs<'a, E, I>(runs: I) -> (Output, Output)
where
    E: Executable + 'a,
    I: IntoIterator<Item = (&'a str, &'a E)>,
{
    let mut stdout = BTreeMap::new();
    let mut stderr = BTreeMap::new();
    for (host, run) in runs {
        stdout.insert(host.to_string(), run.stdout().joined());
        stderr.insert(host.to_string(), run.stderr().joined());
    }
    (Output::PerHost(stdout), Output::PerHost(stderr))
}

/// Combined exit status of several runs.
///
/// The first non-zero status wins. Otherwise `Some(0)` if any run finished,
/// `None` if none did.
pub fn first_failure<E: Executable>(runs: &[E]) -> Option<i32> {
    let mut combined = None;
    for run in runs {
        match run.exit_code() {
            Some(0) => combined = Some(0),
            Some(code) => return Some(code),
            None => {}
        }
    }
    combined
}
