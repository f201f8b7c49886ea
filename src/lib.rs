// src/lib.rs

pub mod alloc;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod hosts;
pub mod logging;
pub mod types;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::alloc::SlurmAllocator;
use crate::cli::{AllocateArgs, CliArgs, Command, PlanArgs, RunArgs};
use crate::config::loader::{load_from_path, load_with_policy};
use crate::config::model::ConfigFile;
use crate::exec::{ExecConfig, ExecDefaults, Executable, execute};

/// High-level entry point used by `main.rs`.
///
/// Returns the exit status the process should end with.
pub async fn run(args: CliArgs) -> Result<i32> {
    match args.command {
        Command::Run(run_args) => run_command(run_args).await,
        Command::Plan(plan_args) => plan(plan_args),
        Command::Allocate(alloc_args) => allocate(alloc_args).await,
    }
}

async fn run_command(args: RunArgs) -> Result<i32> {
    let defaults = match &args.config {
        Some(path) => load_from_path(path)
            .with_context(|| format!("loading defaults from {:?}", path))?
            .defaults,
        None => ExecDefaults::default(),
    };
    let config = exec_config_from_args(&args, defaults)?;

    let run = execute(args.command_line(), &config).await?;
    let code = run.exit_code().unwrap_or(0);
    if run.failed() {
        info!(exit_code = code, "command failed");
    }
    Ok(code)
}

/// Turn `run` flags into an [`ExecConfig`].
pub fn exec_config_from_args(args: &RunArgs, defaults: ExecDefaults) -> Result<ExecConfig> {
    let mut builder = ExecConfig::builder()
        .defaults(defaults)
        .mode(args.mode)
        .sudo(args.sudo)
        .env(args.env.iter().cloned());

    if let Some(hosts) = &args.hosts {
        builder = builder.hosts(hosts.as_str());
    }
    if let Some(path) = &args.hostfile {
        builder = builder.hostfile(path.clone());
    }
    if let Some(n) = args.nprocs {
        builder = builder.nprocs(n);
    }
    if let Some(n) = args.ppn {
        builder = builder.ppn(n);
    }
    if let Some(user) = &args.user {
        builder = builder.user(user.as_str());
    }
    if let Some(pkey) = &args.pkey {
        builder = builder.pkey(pkey.clone());
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let Some(cwd) = &args.cwd {
        builder = builder.cwd(cwd.clone());
    }
    if let Some(timeout) = args.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(delay) = args.sleep {
        builder = builder.sleep(delay);
    }
    if args.hide_output {
        builder = builder.hide_output(true);
    }
    if let Some(path) = &args.pipe_stdout {
        builder = builder.pipe_stdout(path.clone());
    }
    if let Some(path) = &args.pipe_stderr {
        builder = builder.pipe_stderr(path.clone());
    }

    Ok(builder.build()?)
}

fn plan(args: PlanArgs) -> Result<i32> {
    let cfg = load_with_policy(&args.config, args.policy)?;
    print_plan(&cfg);
    Ok(0)
}

async fn allocate(args: AllocateArgs) -> Result<i32> {
    let mut cfg = load_with_policy(&args.config, args.policy)?;
    let mut backend = SlurmAllocator::new()?;

    cfg.architecture
        .schedule(&mut backend, &cfg.allocation)
        .await?;

    let written = write_hostfiles(&cfg, &args.out_dir);

    if args.keep {
        match backend.keep() {
            Some(id) => println!("allocation kept as slurm job {id}"),
            None => println!("allocation kept"),
        }
    } else {
        cfg.architecture.release(&mut backend).await?;
    }

    written?;
    Ok(0)
}

fn write_hostfiles(cfg: &ConfigFile, out_dir: &Path) -> Result<()> {
    for service in cfg.architecture.services() {
        let hostfile = cfg.architecture.hostfile(service.name())?;
        let path = out_dir.join(format!("{}.hostfile", service.name()));
        hostfile.save(&path)?;
        println!("{}: {} nodes -> {}", service.name(), hostfile.len(), path.display());
        debug!(service = service.name(), hosts = ?hostfile.hosts(), "hostfile written");
    }
    Ok(())
}

/// Simple plan output: services, per-color demand and the total.
fn print_plan(cfg: &ConfigFile) {
    let arch = &cfg.architecture;
    println!("hpcexec plan");
    println!("  allocation.policy = {:?}", cfg.allocation.policy);
    if let Some(partition) = &cfg.allocation.partition {
        println!("  allocation.partition = {partition}");
    }
    println!();

    println!("services ({}):", arch.len());
    for service in arch.services() {
        let colors = service
            .distribution()
            .iter()
            .map(|(c, n)| format!("{c}:{n}"))
            .collect::<Vec<_>>()
            .join("+");
        println!("  - {} ({} nodes): {colors}", service.name(), service.num_nodes());
    }
    println!();

    println!("color demand:");
    for (color, max) in arch.color_demand() {
        println!("  {color}: {max}");
    }
    println!("total nodes: {}", arch.num_nodes_needed());
}
