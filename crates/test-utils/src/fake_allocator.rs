use std::sync::{Arc, Mutex};

use hpcexec::alloc::{AllocFuture, AllocationRequest, AllocatorBackend};
use hpcexec::errors::HpcExecError;

/// What a [`FakeAllocator`] saw.
#[derive(Debug, Default, Clone)]
pub struct FakeAllocatorLog {
    pub requests: Vec<AllocationRequest>,
    pub releases: usize,
    /// Whether nodes are currently held.
    pub held: bool,
}

/// A fake allocator that:
/// - records every request and release
/// - hands out `node-001`, `node-002`, ... up to the requested count, or
///   fewer when a shortfall is configured
/// - can fail before or after it has acquired nodes.
pub struct FakeAllocator {
    log: Arc<Mutex<FakeAllocatorLog>>,
    shortfall: usize,
    fail: Option<String>,
    fail_after_acquire: bool,
}

impl FakeAllocator {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(FakeAllocatorLog::default())),
            shortfall: 0,
            fail: None,
            fail_after_acquire: false,
        }
    }

    /// Return `missing` fewer nodes than requested.
    pub fn short_by(mut self, missing: usize) -> Self {
        self.shortfall = missing;
        self
    }

    /// Fail every allocation with `msg`.
    pub fn failing(mut self, msg: &str) -> Self {
        self.fail = Some(msg.to_string());
        self
    }

    /// Acquire the nodes, then fail with `msg` (like a node listing that
    /// breaks after the job was granted).
    pub fn failing_after_acquire(mut self, msg: &str) -> Self {
        self.fail = Some(msg.to_string());
        self.fail_after_acquire = true;
        self
    }

    pub fn log(&self) -> Arc<Mutex<FakeAllocatorLog>> {
        Arc::clone(&self.log)
    }

    pub fn node_names(count: usize) -> Vec<String> {
        (1..=count).map(|i| format!("node-{i:03}")).collect()
    }
}

impl Default for FakeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl AllocatorBackend for FakeAllocator {
    fn allocate<'a>(&'a mut self, request: &'a AllocationRequest) -> AllocFuture<'a, Vec<String>> {
        let log = Arc::clone(&self.log);
        let shortfall = self.shortfall;
        let fail = self.fail.clone();
        let fail_after_acquire = self.fail_after_acquire;

        Box::pin(async move {
            let mut log = log.lock().unwrap();
            log.requests.push(request.clone());
            if fail_after_acquire {
                log.held = true;
            }
            if let Some(msg) = fail {
                return Err(HpcExecError::AllocatorError(msg));
            }
            log.held = true;
            Ok(Self::node_names(request.nodes.saturating_sub(shortfall)))
        })
    }

    fn release(&mut self) -> AllocFuture<'_, ()> {
        let log = Arc::clone(&self.log);
        Box::pin(async move {
            let mut log = log.lock().unwrap();
            log.releases += 1;
            log.held = false;
            Ok(())
        })
    }
}
