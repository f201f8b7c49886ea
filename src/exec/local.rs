// src/exec/local.rs

//! Local process runner.
//!
//! A [`LocalRunner`] owns exactly one `sh -c` process. Its stdout and stderr
//! are drained by two Tokio tasks that echo, collect and duplicate output as
//! it arrives. The exit status is only stored after both drain tasks have
//! been joined, so a caller that sees a status also sees all of the output.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Context;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::config::{ExecConfig, PRELOAD_KEY};
use crate::exec::executable::{
    CommandList, Executable, Output, WaitFuture, debug_cmd, smash_cmd,
};
use crate::types::StreamKind;

/// Exit status recorded when the shell itself could not be started.
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// A command running (or finished) on the local machine.
pub struct LocalRunner {
    cmd: String,
    child: Option<Child>,
    pid: Option<u32>,
    timeout: Option<Duration>,
    stdout_drain: Option<JoinHandle<String>>,
    stderr_drain: Option<JoinHandle<String>>,
    stdin_feed: Option<JoinHandle<()>>,
    stdout: Output,
    stderr: Output,
    exit_code: Option<i32>,
    finalized: bool,
}

impl LocalRunner {
    /// Start `cmds` as configured.
    ///
    /// Unless `config.exec_async()` is set this also waits for completion.
    /// Errors are only returned for problems on our side, such as an output
    /// file that cannot be created; a command that cannot be launched is
    /// recorded as exit status [`SPAWN_FAILURE_CODE`].
    pub async fn spawn(cmds: impl Into<CommandList>, config: &ExecConfig) -> Result<Self> {
        let cmds = cmds.into();
        let mut env = config.env().clone();
        let mut cmd = smash_cmd(&cmds, config.sudo(), config.forwarded_env(), config.sudoenv());
        if config.do_dbg() {
            if let Some(port) = config.dbg_port() {
                cmd = debug_cmd(&cmd, port, &env);
                env.remove(PRELOAD_KEY);
            }
        }

        let stdout_file = open_pipe_file(config.pipe_stdout()).await?;
        let stderr_file = open_pipe_file(config.pipe_stderr()).await?;

        if !config.sleep().is_zero() {
            debug!(delay_ms = config.sleep().as_millis() as u64, "delaying launch");
            sleep(config.sleep()).await;
        }

        let mut runner = Self {
            cmd,
            child: None,
            pid: None,
            timeout: config.timeout(),
            stdout_drain: None,
            stderr_drain: None,
            stdin_feed: None,
            stdout: Output::default(),
            stderr: Output::default(),
            exit_code: None,
            finalized: false,
        };

        let mut command = runner.build_command(config);
        command.envs(&env);

        info!(cmd = %runner.cmd, cwd = ?config.cwd(), "starting local process");

        match command.spawn() {
            Ok(child) => runner.attach(child, config, stdout_file, stderr_file),
            Err(err) => {
                warn!(
                    cmd = %runner.cmd,
                    error = %err,
                    "failed to start process; recording exit status {}",
                    SPAWN_FAILURE_CODE
                );
                runner.exit_code = Some(SPAWN_FAILURE_CODE);
                runner.finalized = true;
            }
        }

        if !config.exec_async() {
            runner.finish().await?;
        }
        Ok(runner)
    }

    /// The synthesized shell line.
    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    /// Process id while the process has not been reaped.
    pub fn pid(&self) -> Option<u32> {
        if self.finalized { None } else { self.pid }
    }

    /// True once output has been converted to final text.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn build_command(&self, config: &ExecConfig) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if config.stdin().is_some() {
            command.stdin(Stdio::piped());
        }
        if let Some(cwd) = config.cwd() {
            command.current_dir(cwd);
        }

        // A timed run gets its own process group so a timeout can take down
        // everything the shell started, not just the shell.
        #[cfg(unix)]
        if self.timeout.is_some() {
            command.process_group(0);
        }

        command
    }

    fn attach(
        &mut self,
        mut child: Child,
        config: &ExecConfig,
        stdout_file: Option<File>,
        stderr_file: Option<File>,
    ) {
        self.pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            let sink = DrainSink::new(StreamKind::Stdout, config, stdout_file);
            self.stdout_drain = Some(tokio::spawn(drain(stdout, sink)));
        }
        if let Some(stderr) = child.stderr.take() {
            let sink = DrainSink::new(StreamKind::Stderr, config, stderr_file);
            self.stderr_drain = Some(tokio::spawn(drain(stderr, sink)));
        }

        if let (Some(input), Some(mut pipe)) = (config.stdin(), child.stdin.take()) {
            let input = input.to_string();
            self.stdin_feed = Some(tokio::spawn(async move {
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    debug!(error = %e, "writing stdin failed");
                }
                // Dropping the pipe closes the child's stdin.
            }));
        }

        self.child = Some(child);
    }

    async fn finish(&mut self) -> Result<Option<i32>> {
        if self.finalized {
            return Ok(self.exit_code);
        }

        let status = match self.child.as_mut() {
            Some(child) => Some(reap(child, self.timeout, &self.cmd).await?),
            None => None,
        };

        let stdout = join_drain(self.stdout_drain.take(), StreamKind::Stdout).await;
        let stderr = join_drain(self.stderr_drain.take(), StreamKind::Stderr).await;
        if let Some(feed) = self.stdin_feed.take() {
            let _ = feed.await;
        }

        self.stdout = Output::Text(stdout);
        self.stderr = Output::Text(stderr);
        self.child = None;
        self.exit_code = status.map(exit_code_of);
        self.finalized = true;

        info!(
            cmd = %self.cmd,
            exit_code = ?self.exit_code,
            "local process finished"
        );

        Ok(self.exit_code)
    }
}

impl Executable for LocalRunner {
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

async fn open_pipe_file(path: Option<&Path>) -> Result<Option<File>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("creating output file {:?}", path))?;
            Ok(Some(file))
        }
        None => Ok(None),
    }
}

/// Wait for the child, killing it if the timeout elapses first.
async fn reap(child: &mut Child, timeout: Option<Duration>, cmd: &str) -> Result<ExitStatus> {
    let Some(limit) = timeout else {
        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process '{cmd}'"))?;
        return Ok(status);
    };

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => Ok(status.with_context(|| format!("waiting for process '{cmd}'"))?),
        Err(_) => {
            warn!(
                cmd,
                timeout_ms = limit.as_millis() as u64,
                "process timed out; killing"
            );
            kill_tree(child);
            let status = child
                .wait()
                .await
                .with_context(|| format!("reaping killed process '{cmd}'"))?;
            Ok(status)
        }
    }
}

fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: killpg only sends a signal; the group was created at spawn
        // time with the child as its leader.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            debug!(pid, "killpg failed; falling back to killing the shell only");
        }
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "process already gone when killing");
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn join_drain(handle: Option<JoinHandle<String>>, kind: StreamKind) -> String {
    let Some(handle) = handle else {
        return String::new();
    };
    match handle.await {
        Ok(text) => text,
        Err(e) => {
            warn!(stream = %kind, error = %e, "output drain task failed");
            String::new()
        }
    }
}

/// Where one drained stream goes.
struct DrainSink {
    kind: StreamKind,
    console: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    collect: bool,
    file: Option<File>,
}

impl DrainSink {
    fn new(kind: StreamKind, config: &ExecConfig, file: Option<File>) -> Self {
        let console: Option<Box<dyn AsyncWrite + Send + Unpin>> = if config.hide_output() {
            None
        } else {
            match kind {
                StreamKind::Stdout => Some(Box::new(tokio::io::stdout())),
                StreamKind::Stderr => Some(Box::new(tokio::io::stderr())),
            }
        };
        Self {
            kind,
            console,
            collect: config.collect_output(),
            file,
        }
    }

    async fn write(&mut self, raw: &[u8]) {
        if let Some(console) = self.console.as_mut() {
            let res = async {
                console.write_all(raw).await?;
                console.flush().await
            }
            .await;
            if let Err(e) = res {
                debug!(stream = %self.kind, error = %e, "console echo failed; disabling");
                self.console = None;
            }
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.write_all(raw).await {
                warn!(stream = %self.kind, error = %e, "writing output file failed; disabling");
                self.file = None;
            }
        }
    }

    async fn close(mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                warn!(stream = %self.kind, error = %e, "flushing output file failed");
            }
        }
    }
}

/// Read one stream to end-of-file.
///
/// Returns the collected text (empty unless collection is on). Once a chunk
/// fails to decode as UTF-8 the rest of the stream is read and discarded.
async fn drain<R>(reader: R, mut sink: DrainSink) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut chunk = Vec::with_capacity(4096);
    let mut collected = String::new();
    let mut decoding = true;

    loop {
        chunk.clear();
        match reader.read_until(b'\n', &mut chunk).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(stream = %sink.kind, error = %e, "read failed; stopping drain");
                break;
            }
        }

        if !decoding {
            continue;
        }

        let text = match std::str::from_utf8(&chunk) {
            Ok(text) => text,
            Err(e) => {
                debug!(
                    stream = %sink.kind,
                    error = %e,
                    "undecodable output; dropping the rest of the stream"
                );
                decoding = false;
                continue;
            }
        };

        if sink.collect {
            collected.push_str(text);
        }
        sink.write(&chunk).await;
    }

    let kind = sink.kind;
    sink.close().await;
    debug!(stream = %kind, collected = collected.len(), "drain finished");
    collected
}
