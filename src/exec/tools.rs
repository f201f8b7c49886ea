// src/exec/tools.rs

//! Launch wrappers for Spark jobs, callgrind profiling and the resource
//! monitor.

use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::errors::Result;
use crate::exec::config::ExecConfig;
use crate::exec::executable::{Executable, shell_quote};
use crate::exec::execute;
use crate::exec::local::LocalRunner;

/// `spark-submit` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparkOptions {
    pub master_host: String,
    pub master_port: u16,
    pub driver_mem: String,
    pub executor_mem: String,
    /// `spark.local.dir`.
    pub scratch: String,
    /// `spark.storage.replication`.
    pub replication: usize,
}

impl SparkOptions {
    pub fn new(master_host: impl Into<String>, master_port: u16) -> Self {
        Self {
            master_host: master_host.into(),
            master_port,
            driver_mem: "1g".to_string(),
            executor_mem: "1g".to_string(),
            scratch: "/tmp".to_string(),
            replication: 1,
        }
    }

    pub fn master_url(&self) -> String {
        format!("spark://{}:{}", self.master_host, self.master_port)
    }

    /// The `spark-submit` line for application `cmd`.
    pub fn submit_command(&self, cmd: &str) -> String {
        [
            "spark-submit".to_string(),
            format!("--master {}", self.master_url()),
            format!("--driver-memory {}", shell_quote(&self.driver_mem)),
            format!("--executor-memory {}", shell_quote(&self.executor_mem)),
            "--conf spark.speculation=false".to_string(),
            format!("--conf spark.storage.replication={}", self.replication),
            format!("--conf spark.local.dir={}", shell_quote(&self.scratch)),
            cmd.to_string(),
        ]
        .join(" ")
    }

    /// Submit `cmd` from this machine.
    pub async fn submit(&self, cmd: &str, config: &ExecConfig) -> Result<LocalRunner> {
        info!(master = %self.master_url(), "submitting spark job");
        LocalRunner::spawn(self.submit_command(cmd), &config.launcher(true)).await
    }
}

/// `valgrind --tool=callgrind <cmd>`.
pub fn callgrind_command(cmd: &str) -> String {
    format!("valgrind --tool=callgrind {cmd}")
}

/// Profile `cmd` under callgrind wherever `config` points.
pub async fn callgrind(cmd: &str, config: &ExecConfig) -> Result<Box<dyn Executable>> {
    execute(callgrind_command(cmd), config).await
}

/// `pymonitor <seconds> <dir>`; sub-second frequencies round up to one.
pub fn monitor_command(frequency: Duration, monitor_dir: &Path) -> String {
    format!(
        "pymonitor {} {}",
        frequency.as_secs().max(1),
        shell_quote(&monitor_dir.display().to_string())
    )
}

/// Start the resource monitor, sampling every `frequency` into `monitor_dir`.
pub async fn monitor(
    frequency: Duration,
    monitor_dir: &Path,
    config: &ExecConfig,
) -> Result<Box<dyn Executable>> {
    info!(dir = ?monitor_dir, secs = frequency.as_secs(), "starting resource monitor");
    execute(monitor_command(frequency, monitor_dir), config).await
}
