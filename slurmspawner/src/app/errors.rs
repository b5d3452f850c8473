// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fmt;

pub mod codes {
    pub const SCHEDULER_LAUNCH_FAILED: &str = "scheduler_launch_failed";
    pub const SCHEDULER_CANCEL_FAILED: &str = "scheduler_cancel_failed";
    pub const SCHEDULER_ERROR: &str = "scheduler_error";
    pub const LAUNCH_TIMEOUT: &str = "launch_timeout";
    pub const TOKEN_WRITE_ERROR: &str = "token_write_error";
    pub const NODE_UNAVAILABLE: &str = "node_unavailable";
    pub const INVALID_ARGUMENT: &str = "invalid_argument";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const LOCAL_ERROR: &str = "local_error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// The job never reached RUNNING.
    LaunchFailed,
    /// The job stayed PENDING past the launch deadline.
    LaunchTimeout,
    /// The scheduler answered a cancellation with output.
    CancelFailed,
    /// The admission token could not be persisted.
    TokenWrite,
    /// The job has no allocated node, or the node does not resolve.
    NodeUnavailable,
    InvalidArgument,
    NotFound,
    Internal,
}

#[derive(Debug, Clone)]
pub struct AppError {
    kind: AppErrorKind,
    code: &'static str,
    message: String,
    context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind, code: &'static str) -> Self {
        Self {
            kind,
            code,
            message: code.to_string(),
            context: None,
        }
    }

    pub fn with_message(
        kind: AppErrorKind,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn kind(&self) -> AppErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// `SchedulerLaunchFailed` for `job_id`, tagged with the last state the scheduler reported.
    pub fn launch_failed(job_id: &str, state: &str, message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::LaunchFailed,
            codes::SCHEDULER_LAUNCH_FAILED,
            message,
        )
        .with_context(format!("job_id={job_id} state={state}"))
    }

    pub fn launch_timeout(job_id: &str, message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::LaunchTimeout, codes::LAUNCH_TIMEOUT, message)
            .with_context(format!("job_id={job_id} state=PENDING"))
    }

    pub fn cancel_failed(job_id: &str, output: &str) -> Self {
        Self::with_message(
            AppErrorKind::CancelFailed,
            codes::SCHEDULER_CANCEL_FAILED,
            format!("failed to cancel job {job_id}: scheduler output: {output}"),
        )
    }

    pub fn token_write(message: impl Into<String>) -> Self {
        Self::with_message(AppErrorKind::TokenWrite, codes::TOKEN_WRITE_ERROR, message)
    }

    pub fn node_unavailable(job_id: &str, message: impl Into<String>) -> Self {
        Self::with_message(
            AppErrorKind::NodeUnavailable,
            codes::NODE_UNAVAILABLE,
            message,
        )
        .with_context(format!("job_id={job_id}"))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ctx) = &self.context {
            write!(f, "{} ({})", self.message, ctx)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;
