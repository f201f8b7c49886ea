use hpcexec::errors::HpcExecError;
use hpcexec::exec::executable::{Executable, Output, WaitFuture};

/// An `Executable` with canned results, for exercising the aggregation
/// helpers without spawning processes.
///
/// Output and exit status only become visible after `wait()`, like a real
/// asynchronous run.
pub struct FakeExecutable {
    pending_code: Option<i32>,
    pending_stdout: String,
    pending_stderr: String,
    exit_code: Option<i32>,
    stdout: Output,
    stderr: Output,
    pub waits: usize,
}

impl FakeExecutable {
    pub fn new(code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            pending_code: Some(code),
            pending_stdout: stdout.to_string(),
            pending_stderr: stderr.to_string(),
            exit_code: None,
            stdout: Output::default(),
            stderr: Output::default(),
            waits: 0,
        }
    }

    /// A run that never reports an exit status.
    pub fn unfinished() -> Self {
        let mut fake = Self::new(0, "", "");
        fake.pending_code = None;
        fake
    }

    /// Already waited on.
    pub fn finished(code: i32, stdout: &str, stderr: &str) -> Self {
        let mut fake = Self::new(code, stdout, stderr);
        fake.complete();
        fake
    }

    fn complete(&mut self) -> Option<i32> {
        self.waits += 1;
        self.exit_code = self.pending_code;
        self.stdout = Output::Text(self.pending_stdout.clone());
        self.stderr = Output::Text(self.pending_stderr.clone());
        self.exit_code
    }
}

impl Executable for FakeExecutable {
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
        let code = self.complete();
        Box::pin(async move { Ok::<_, HpcExecError>(code) })
    }
}
