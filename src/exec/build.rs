// src/exec/build.rs

//! CMake configure and `make` steps run through the dispatcher.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::errors::Result;
use crate::exec::config::ExecConfig;
use crate::exec::executable::{Executable, shell_quote};
use crate::exec::execute;

/// Value of a `-D` cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmakeValue {
    /// Rendered as `ON` / `OFF`.
    Flag(bool),
    Text(String),
}

impl From<bool> for CmakeValue {
    fn from(flag: bool) -> Self {
        CmakeValue::Flag(flag)
    }
}

impl From<&str> for CmakeValue {
    fn from(text: &str) -> Self {
        CmakeValue::Text(text.to_string())
    }
}

impl From<String> for CmakeValue {
    fn from(text: String) -> Self {
        CmakeValue::Text(text)
    }
}

/// `cmake <root_dir> -DKEY=VAL ...`, options in the given order.
pub fn cmake_command(root_dir: &Path, opts: &[(String, CmakeValue)]) -> String {
    let mut line = format!("cmake {}", shell_quote(&root_dir.display().to_string()));
    for (key, val) in opts {
        let val = match val {
            CmakeValue::Flag(true) => "ON".to_string(),
            CmakeValue::Flag(false) => "OFF".to_string(),
            CmakeValue::Text(text) => shell_quote(text),
        };
        line.push_str(&format!(" -D{key}={val}"));
    }
    line
}

/// `make -jN [install]`.
pub fn make_command(nthreads: usize, install: bool) -> String {
    let mut line = format!("make -j{}", nthreads.max(1));
    if install {
        line.push_str(" install");
    }
    line
}

/// Configure the project at `root_dir` into `out_dir`.
///
/// `out_dir` is created first and becomes the working directory.
pub async fn cmake(
    root_dir: &Path,
    out_dir: &Path,
    opts: &[(String, CmakeValue)],
    config: &ExecConfig,
) -> Result<Box<dyn Executable>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating build directory {:?}", out_dir))?;
    let config = config.modify().cwd(out_dir).build()?;
    info!(root = ?root_dir, out = ?out_dir, "running cmake");
    execute(cmake_command(root_dir, opts), &config).await
}

/// Run `make` in `build_dir`.
pub async fn make(
    build_dir: &Path,
    nthreads: usize,
    install: bool,
    config: &ExecConfig,
) -> Result<Box<dyn Executable>> {
    let config = config.modify().cwd(build_dir).build()?;
    info!(dir = ?build_dir, nthreads, install, "running make");
    execute(make_command(nthreads, install), &config).await
}
