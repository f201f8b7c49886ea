// src/alloc/slurm.rs

//! Slurm-backed allocator: `salloc --no-shell` to reserve nodes, `squeue` and
//! `scontrol show hostnames` to list them, `scancel` to give them back.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::alloc::backend::{AllocFuture, AllocationRequest, AllocatorBackend};
use crate::errors::{HpcExecError, Result};
use crate::exec::config::ExecConfig;
use crate::exec::executable::{Executable, shell_quote};
use crate::exec::local::LocalRunner;

/// Reserves nodes through the Slurm CLI on the local machine.
pub struct SlurmAllocator {
    exec: ExecConfig,
    job_id: Option<String>,
}

impl SlurmAllocator {
    /// Run the Slurm tools quietly with output collected.
    pub fn new() -> Result<Self> {
        let exec = ExecConfig::builder()
            .collect_output(true)
            .hide_output(true)
            .build()?;
        Self::with_config(&exec)
    }

    /// Run the Slurm tools with a caller-supplied config.
    ///
    /// Output collection is forced on since the job id and node names are
    /// parsed from it.
    pub fn with_config(exec: &ExecConfig) -> Result<Self> {
        let exec = exec.modify().collect_output(true).exec_async(false).build()?;
        Ok(Self { exec, job_id: None })
    }

    /// Id of the held allocation.
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Stop tracking the allocation so it outlives this allocator.
    ///
    /// Returns the job id to cancel later.
    pub fn keep(mut self) -> Option<String> {
        self.job_id.take()
    }

    pub fn salloc_command(request: &AllocationRequest) -> String {
        let mut line = format!("salloc --no-shell --nodes={}", request.nodes);
        if let Some(list) = &request.node_list {
            line.push_str(&format!(" --nodelist={}", shell_quote(list)));
        }
        if let Some(partition) = &request.partition {
            line.push_str(&format!(" --partition={}", shell_quote(partition)));
        }
        if request.exclusive {
            line.push_str(" --exclusive");
        }
        line
    }

    async fn run(&self, line: String) -> Result<LocalRunner> {
        let run = LocalRunner::spawn(line.as_str(), &self.exec).await?;
        if run.failed() {
            return Err(HpcExecError::AllocatorError(format!(
                "'{line}' exited with {:?}: {}",
                run.exit_code(),
                run.stderr().joined().trim()
            )));
        }
        Ok(run)
    }

    async fn acquire(&mut self, request: &AllocationRequest) -> Result<Vec<String>> {
        if let Some(id) = &self.job_id {
            return Err(HpcExecError::AllocatorError(format!(
                "slurm job {id} is still held; release it first"
            )));
        }
        request.validate()?;

        let salloc = self.run(Self::salloc_command(request)).await?;
        let job_id = parse_job_id(&salloc.stderr().joined())
            .or_else(|| parse_job_id(&salloc.stdout().joined()))
            .ok_or_else(|| {
                HpcExecError::AllocatorError("could not find a job id in salloc output".into())
            })?;
        info!(job_id = %job_id, nodes = request.nodes, "slurm allocation granted");
        self.job_id = Some(job_id.clone());

        let squeue = self
            .run(format!("squeue -h -j {job_id} -o %N"))
            .await?;
        let node_list = squeue.stdout().joined().trim().to_string();
        if node_list.is_empty() {
            return Err(HpcExecError::AllocatorError(format!(
                "squeue reported no nodes for job {job_id}"
            )));
        }

        let scontrol = self
            .run(format!("scontrol show hostnames {}", shell_quote(&node_list)))
            .await?;
        let nodes: Vec<String> = scontrol
            .stdout()
            .joined()
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        debug!(job_id = %job_id, ?nodes, "slurm nodes");
        Ok(nodes)
    }

    async fn cancel(&mut self) -> Result<()> {
        let Some(job_id) = self.job_id.take() else {
            return Ok(());
        };
        info!(job_id = %job_id, "cancelling slurm allocation");
        if let Err(e) = self.run(format!("scancel {job_id}")).await {
            self.job_id = Some(job_id);
            return Err(e);
        }
        Ok(())
    }
}

impl AllocatorBackend for SlurmAllocator {
    fn allocate<'a>(&'a mut self, request: &'a AllocationRequest) -> AllocFuture<'a, Vec<String>> {
        Box::pin(self.acquire(request))
    }

    fn release(&mut self) -> AllocFuture<'_, ()> {
        Box::pin(self.cancel())
    }
}

impl Drop for SlurmAllocator {
    fn drop(&mut self) {
        if let Some(job_id) = &self.job_id {
            warn!(job_id = %job_id, "slurm allocation dropped without release; run `scancel {job_id}`");
        }
    }
}

/// First number in `salloc` output, preferring the "Granted job allocation"
/// line.
pub fn parse_job_id(text: &str) -> Option<String> {
    static GRANTED: OnceLock<Regex> = OnceLock::new();
    static NUMBER: OnceLock<Regex> = OnceLock::new();

    let granted = GRANTED.get_or_init(|| {
        Regex::new(r"Granted job allocation (\d+)").expect("valid job id regex")
    });
    if let Some(caps) = granted.captures(text) {
        return Some(caps[1].to_string());
    }

    let number = NUMBER.get_or_init(|| Regex::new(r"\d+").expect("valid number regex"));
    number.find(text).map(|m| m.as_str().to_string())
}
