//! Subprocess runner for external simulation commands.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::ToolError;

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL: usize = 20;

/// Runs one external program to completion.
///
/// stderr is streamed into the log line by line and its tail is attached to
/// the error when the process exits unsuccessfully.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Program name or path.
    program: String,

    /// Working directory (inherited if unset).
    working_dir: Option<PathBuf>,

    /// Additional environment variables.
    env_vars: Vec<(String, String)>,
}

impl CommandRunner {
    /// Create a runner for `program`. A bare name uses PATH lookup.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            working_dir: None,
            env_vars: Vec::new(),
        }
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run with the given arguments and wait for exit.
    pub async fn run<I, S>(&self, args: I) -> Result<(), ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        debug!("Full command: {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| {
            error!(program = %self.program, error = %e, "Failed to spawn process");
            ToolError::SpawnError {
                program: self.program.clone(),
                source: e,
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let program = self.program.clone();
        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    debug!(program = %program, stdout = %trimmed, "Process stdout");
                }
            }
        });

        let program = self.program.clone();
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let Some(stderr) = stderr else { return tail };
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        warn!(program = %program, stderr = %trimmed, "Process stderr");
                        if tail.len() == STDERR_TAIL {
                            tail.remove(0);
                        }
                        tail.push(trimmed.to_string());
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(program = %program, error = %e, "Error reading process stderr");
                        break;
                    }
                }
            }
            tail
        });

        let status = child.wait().await?;
        let _ = stdout_task.await;
        let tail = stderr_task.await.unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1);
        info!(
            program = %self.program,
            exit_code = exit_code,
            success = status.success(),
            "Process exited"
        );

        if !status.success() {
            return Err(ToolError::ProcessError {
                program: self.program.clone(),
                code: exit_code,
                stderr: tail.join("\n"),
            });
        }
        Ok(())
    }

    /// Fail with [`ToolError::MissingOutput`] unless `path` exists.
    pub async fn expect_output(&self, path: &Path) -> Result<(), ToolError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Ok(())
        } else {
            Err(ToolError::MissingOutput {
                program: self.program.clone(),
                path: path.to_path_buf(),
            })
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new("honeybee-radiance")
    }
}
