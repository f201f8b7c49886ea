// src/exec/process.rs

//! Process management helpers that run through the normal dispatcher.

use tracing::info;

use crate::errors::Result;
use crate::exec::config::ExecConfig;
use crate::exec::executable::{Executable, shell_quote};
use crate::exec::execute;

/// `pkill` line for `pattern`. `partial` matches against the full command
/// line (`-f`) instead of the process name.
pub fn kill_command(pattern: &str, partial: bool) -> String {
    if partial {
        format!("pkill -9 -f {}", shell_quote(pattern))
    } else {
        format!("pkill -9 {}", shell_quote(pattern))
    }
}

/// Kill every process matching `pattern` wherever `config` points.
///
/// `pkill` exits 1 when nothing matched; that status is returned as data,
/// not as an error.
pub async fn kill(
    pattern: &str,
    config: &ExecConfig,
    partial: bool,
) -> Result<Box<dyn Executable>> {
    info!(pattern, partial, mode = %config.mode(), "killing matching processes");
    execute(kill_command(pattern, partial), config).await
}
