// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{ExecCapture, SchedulerExecPort};

/// Runs scheduler commands through `sh -c` on the hub host.
#[derive(Clone)]
pub struct LocalShell {
    shell: String,
}

impl Default for LocalShell {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl LocalShell {
    pub fn new() -> Self {
        Self::default()
    }
}

fn spawn_error(command: &str, err: std::io::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Internal,
        codes::SCHEDULER_ERROR,
        format!("failed to run '{command}': {err}"),
    )
}

#[async_trait]
impl SchedulerExecPort for LocalShell {
    #[tracing::instrument(name = "exec", level = "debug", skip(self, stdin), fields(stdin = stdin.is_some()))]
    async fn exec_capture(&self, command: &str, stdin: Option<&str>) -> AppResult<ExecCapture> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| spawn_error(command, err))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|err| spawn_error(command, err))?;
            // Closing stdin lets sbatch see EOF.
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| spawn_error(command, err))?;
        let exit_code = output.status.code().unwrap_or(-1);
        if exit_code != 0 {
            tracing::debug!(exit_code, "command exited non-zero");
        }
        Ok(ExecCapture {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let shell = LocalShell::new();
        let capture = shell.exec_capture("echo 209", None).await.unwrap();
        assert!(capture.success());
        assert_eq!(capture.text(), "209");
    }

    #[tokio::test]
    async fn feeds_stdin_to_command() {
        let shell = LocalShell::new();
        let capture = shell
            .exec_capture("cat", Some("#!/bin/bash\necho hi\n"))
            .await
            .unwrap();
        assert_eq!(capture.text(), "#!/bin/bash\necho hi");
    }

    #[tokio::test]
    async fn keeps_stderr_and_failure_status() {
        let shell = LocalShell::new();
        let capture = shell
            .exec_capture("echo 'Invalid job id specified' >&2; exit 1", None)
            .await
            .unwrap();
        assert!(!capture.success());
        assert_eq!(capture.exit_code, 1);
        assert!(capture.text().is_empty());
        assert_eq!(capture.stderr_text(), "Invalid job id specified");
    }
}
