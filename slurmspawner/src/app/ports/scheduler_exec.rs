// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecCapture {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ExecCapture {
    /// Stdout decoded and trimmed; the text every scheduler parser consumes.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
/// Scheduler command boundary: one subprocess per call, no retries.
/// `stdin` carries a submission script body when present.
pub trait SchedulerExecPort: Send + Sync {
    async fn exec_capture(&self, command: &str, stdin: Option<&str>) -> AppResult<ExecCapture>;
}
