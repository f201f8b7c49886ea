// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;
use crate::exec::executable::shell_quote;
use crate::types::{ExecMode, PoolPolicy};

/// Command-line arguments for `hpcexec`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "hpcexec",
    version,
    about = "Run commands locally, over SSH, under MPI or through a batch scheduler, and split cluster nodes across services.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `HPCEXEC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a command with the selected launcher.
    Run(RunArgs),
    /// Print per-color demand for an architecture without allocating.
    Plan(PlanArgs),
    /// Allocate nodes through Slurm and write one hostfile per service.
    Allocate(AllocateArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// local, ssh, pssh, mpi, mpich, openmpi, intel-mpi, cray-mpich, slurm or pbs.
    #[arg(long, default_value = "local")]
    pub mode: ExecMode,

    /// Target hosts, as a comma list or node-list pattern (`node[01-04]`).
    #[arg(long, value_name = "HOSTS", conflicts_with = "hostfile")]
    pub hosts: Option<String>,

    /// Hostfile with one host per line.
    #[arg(long, value_name = "PATH")]
    pub hostfile: Option<PathBuf>,

    #[arg(long)]
    pub nprocs: Option<usize>,

    /// Processes per node.
    #[arg(long)]
    pub ppn: Option<usize>,

    #[arg(long)]
    pub user: Option<String>,

    /// SSH private key.
    #[arg(long, value_name = "PATH")]
    pub pkey: Option<PathBuf>,

    /// SSH port.
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Run the command with sudo.
    #[arg(long)]
    pub sudo: bool,

    /// Extra environment variables (`KEY=VALUE`), repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Kill the command after this long (e.g. `500ms`, `30s`, `5m`).
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Wait this long before launching.
    #[arg(long, value_parser = parse_duration)]
    pub sleep: Option<Duration>,

    /// Do not echo command output to the console.
    #[arg(long)]
    pub hide_output: bool,

    /// Also write stdout to this file.
    #[arg(long, value_name = "PATH")]
    pub pipe_stdout: Option<PathBuf>,

    /// Also write stderr to this file.
    #[arg(long, value_name = "PATH")]
    pub pipe_stderr: Option<PathBuf>,

    /// Config file whose `[defaults]` section supplies output defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The command to run; everything after `--`.
    #[arg(trailing_var_arg = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl RunArgs {
    /// The trailing words as one shell line.
    ///
    /// A single word is used as written, so `-- 'make && make install'`
    /// keeps its shell syntax. Several words are quoted one by one and keep
    /// their boundaries.
    pub fn command_line(&self) -> String {
        match self.command.as_slice() {
            [line] => line.clone(),
            words => words
                .iter()
                .map(|w| shell_quote(w))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Override the `[allocation]` policy (exclusive or colocated).
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<PoolPolicy>,
}

#[derive(Debug, Clone, Args)]
pub struct AllocateArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Override the `[allocation]` policy (exclusive or colocated).
    #[arg(long, value_name = "POLICY")]
    pub policy: Option<PoolPolicy>,

    /// Directory for the per-service hostfiles.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub out_dir: PathBuf,

    /// Keep the allocation instead of releasing it after writing hostfiles.
    #[arg(long)]
    pub keep: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse durations like `500ms`, `3s`, `5m` or `1h`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => secs(value, 60),
        "h" => secs(value, 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}

fn secs(value: u64, unit: u64) -> Result<Duration, String> {
    value
        .checked_mul(unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration {value} x {unit}s is too large"))
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
