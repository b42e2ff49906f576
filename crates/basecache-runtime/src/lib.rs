use std::{
    env,
    path::Path,
    process::{Command, Stdio},
};

use anyhow::{bail, Context, Result};

pub const QEMU_IMG_ENV: &str = "BASECACHE_QEMU_IMG";

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub fn run_command(program: &Path, args: &[&str]) -> Result<RunOutput> {
    let mut command = Command::new(program);
    command.args(args);
    command.env("LC_ALL", "C");
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let output = command
        .output()
        .with_context(|| format!("failed to start {}", program.display()))?;
    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    Ok(RunOutput {
        code,
        stdout,
        stderr,
    })
}

/// Locate the disk image tool used to read backing chains.
pub fn detect_qemu_img() -> Result<std::path::PathBuf> {
    if let Some(explicit) = env::var_os(QEMU_IMG_ENV) {
        return Ok(explicit.into());
    }
    if let Ok(path) = which::which("qemu-img") {
        return Ok(path);
    }
    bail!("qemu-img not found on PATH; set {QEMU_IMG_ENV}");
}
