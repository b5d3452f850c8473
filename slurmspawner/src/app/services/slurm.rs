// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Slurm command surface and the parsers for its text output.
//!
//! Every command's output is treated as an untyped wire format:
//! - empty output is a valid answer meaning "no job" / "no data",
//! - the job listing is one whitespace-separated line per job
//!   (`jobid comment state reason...`), only the first line is read,
//! - `sbatch` answers `Submitted batch job <id>`, the id being the last token,
//! - `scancel` is silent on success,
//! - `host <node>` answers lines whose last token is an address.

use std::net::IpAddr;

use crate::app::services::shell::sh_escape;
use crate::app::types::{JobState, JobStatus, ListedJob};

pub const SUBMIT_CMD: &str = "sbatch";
pub const SUDO_SUBMIT_CMD: &str = "sudo sbatch";

/// Reason marker for jobs that the scheduler requeued after a launch failure.
pub const FAILED_REASON_MARKER: &str = "failed";

pub fn submit_command(run_with_sudo: bool) -> &'static str {
    if run_with_sudo {
        SUDO_SUBMIT_CMD
    } else {
        SUBMIT_CMD
    }
}

pub fn list_jobs_command(owner: &str, job_name: &str) -> String {
    format!(
        "squeue -h -u {} --name={} -O jobid,comment,state,reason",
        sh_escape(owner),
        sh_escape(job_name)
    )
}

pub fn job_state_command(job_id: &str) -> String {
    format!("squeue -h -j {} -o %T", sh_escape(job_id))
}

pub fn job_reason_command(job_id: &str) -> String {
    format!("squeue -h -j {} -O reason", sh_escape(job_id))
}

pub fn cancel_command(job_id: &str) -> String {
    format!("scancel {}", sh_escape(job_id))
}

pub fn node_name_command(job_id: &str) -> String {
    format!("squeue -h -j {} -o %N", sh_escape(job_id))
}

pub fn host_lookup_command(node_name: &str) -> String {
    format!("host {}", sh_escape(node_name))
}

/// State token from `squeue -o %T` output; empty output is `Absent`.
pub fn parse_state(raw: &str) -> JobState {
    raw.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.split_whitespace().next())
        .map(JobState::from_token)
        .unwrap_or(JobState::Absent)
}

pub fn reason_indicates_failure(reason: &str) -> bool {
    reason.contains(FAILED_REASON_MARKER)
}

/// Combines a state query with the reason query that follows a PENDING answer.
///
/// A PENDING job whose reason mentions `failed` is stuck in a requeue loop and
/// will never start, so it is reported as FAILED.
pub fn parse_query_output(state_raw: &str, reason_raw: Option<&str>) -> JobStatus {
    let mut state = parse_state(state_raw);
    let reason_tokens: Vec<String> = reason_raw
        .map(|reason| reason.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if state == JobState::Pending
        && reason_raw.map(reason_indicates_failure).unwrap_or(false)
    {
        state = JobState::Failed;
    }
    JobStatus {
        state,
        reason_tokens,
    }
}

/// Parses the first line of the by-owner-and-name listing.
pub fn parse_list_output(raw: &str) -> ListedJob {
    let Some(line) = raw.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return ListedJob::default();
    };
    let mut tokens = line.split_whitespace();
    let job_id = tokens.next().unwrap_or_default().to_string();
    let port = tokens.next().unwrap_or_default().to_string();
    let state = tokens.next().map(JobState::from_token).unwrap_or_default();
    let reason_tokens = tokens.map(str::to_string).collect();
    ListedJob {
        job_id,
        port,
        state,
        reason_tokens,
    }
}

/// Job id from `sbatch` output such as `Submitted batch job 209`.
pub fn parse_submitted_job_id(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).rfind(|line| !line.is_empty())?;
    let token = line.split_whitespace().last()?;
    let token = token.split(';').next().unwrap_or(token);
    if token.starts_with(|c: char| c.is_ascii_digit()) {
        Some(token.to_string())
    } else {
        None
    }
}

/// Node name from `squeue -o %N`; `None` while nothing is allocated.
pub fn parse_node_name(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|line| !line.is_empty())?;
    if line.eq_ignore_ascii_case("(null)") || line.eq_ignore_ascii_case("n/a") {
        return None;
    }
    Some(line.to_string())
}

/// First address found as the last token of a `host` output line.
pub fn parse_host_lookup(raw: &str) -> Option<IpAddr> {
    raw.lines()
        .filter_map(|line| line.split_whitespace().last())
        .find_map(|token| token.parse::<IpAddr>().ok())
}

pub fn is_invalid_job_id(text: &str) -> bool {
    text.to_ascii_lowercase().contains("invalid job id")
}
