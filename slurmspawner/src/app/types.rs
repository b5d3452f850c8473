// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Account a session and its job run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Lifecycle state of an owner's job, re-derived from scheduler output on every query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
    /// No job known to the scheduler (empty output).
    #[default]
    Absent,
    /// Accepted by `sbatch`, not yet queried.
    Submitted,
    Pending,
    Running,
    Completing,
    Completed,
    Cancelled,
    Failed,
    /// Any other scheduler token (TIMEOUT, NODE_FAIL, SUSPENDED, ...).
    Other(String),
}

impl JobState {
    pub fn from_token(token: &str) -> Self {
        let token = token
            .split(|c| c == '+' || c == '(')
            .next()
            .unwrap_or(token)
            .trim()
            .to_ascii_uppercase();
        match token.as_str() {
            "" => JobState::Absent,
            "PENDING" | "PD" => JobState::Pending,
            "RUNNING" | "R" => JobState::Running,
            "COMPLETING" | "CG" => JobState::Completing,
            "COMPLETED" | "CD" => JobState::Completed,
            "CANCELLED" | "CA" => JobState::Cancelled,
            "FAILED" | "F" => JobState::Failed,
            _ => JobState::Other(token),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Absent => "",
            JobState::Submitted => "SUBMITTED",
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completing => "COMPLETING",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
            JobState::Other(token) => token,
        }
    }

    /// RUNNING or PENDING: the server is alive or about to be.
    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Running | JobState::Pending)
    }

    /// States that confirm a cancellation took effect.
    pub fn has_left_active_set(&self) -> bool {
        matches!(
            self,
            JobState::Cancelled
                | JobState::Completed
                | JobState::Failed
                | JobState::Completing
                | JobState::Absent
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Absent => f.write_str("ABSENT"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of a single-job state query, reason included when one was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobStatus {
    pub state: JobState,
    pub reason_tokens: Vec<String>,
}

/// One line of the by-owner-and-name job listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListedJob {
    pub job_id: String,
    /// The job's comment field, which carries the listen port.
    pub port: String,
    pub state: JobState,
    pub reason_tokens: Vec<String>,
}

impl ListedJob {
    pub fn reason_text(&self) -> String {
        self.reason_tokens.join(" ")
    }

    pub fn port_number(&self) -> Option<u16> {
        self.port.parse::<u16>().ok().filter(|port| *port != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAllocation {
    pub node_name: String,
    pub address: IpAddr,
}

/// Where the host framework should reach the single-user server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub ip: String,
    pub port: u16,
}

/// The engine's tracked state for one owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobRecord {
    pub owner: String,
    pub job_id: String,
    pub listen_port: Option<u16>,
    pub state: JobState,
    pub allocation: Option<NodeAllocation>,
}

impl JobRecord {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    pub fn has_job(&self) -> bool {
        !self.job_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.job_id.clear();
        self.listen_port = None;
        self.state = JobState::Absent;
        self.allocation = None;
    }

    pub fn endpoint(&self) -> Option<ServerEndpoint> {
        match (&self.allocation, self.listen_port) {
            (Some(allocation), Some(port)) => Some(ServerEndpoint {
                ip: allocation.address.to_string(),
                port,
            }),
            _ => None,
        }
    }
}

/// What the host framework persists between restarts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slurm_job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slurm_port: Option<u16>,
}

/// Resource directives written into the submission script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub cpus_per_task: u32,
    pub mem: u64,
    pub ntasks: u32,
    pub nodes: u32,
    pub partition: String,
    pub qos: String,
    pub time: String,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self {
            cpus_per_task: 1,
            mem: 400,
            ntasks: 1,
            nodes: 1,
            partition: "all".to_string(),
            qos: "normal".to_string(),
            time: "1-00:00:00".to_string(),
        }
    }
}

/// Per-session custom request; each field applies only when within bounds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceOverrides {
    pub memory: Option<i64>,
    pub cpus: Option<i64>,
    pub tasks: Option<i64>,
    pub nodes: Option<i64>,
    pub time: Option<String>,
}

/// Host-supplied description of the server process to launch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchSpec {
    pub cmd: Vec<String>,
    /// `{port}` is replaced with the chosen listen port.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

/// Operator settings the engine runs with.
#[derive(Debug, Clone)]
pub struct SpawnerSettings {
    pub job_name: String,
    pub output: String,
    pub defaults: ResourceRequest,
    pub extra_launch_script: PathBuf,
    pub run_with_sudo: bool,
    pub token_dir: PathBuf,
    pub export_env: Vec<String>,
    pub poll_interval: Duration,
    /// `None` waits for a definitive state indefinitely.
    pub launch_timeout: Option<Duration>,
    pub workers: usize,
    pub port_range: (u16, u16),
}

impl Default for SpawnerSettings {
    fn default() -> Self {
        Self {
            job_name: "spawner-jupyterhub-singleuser".to_string(),
            output: "/.ipython/jupyterhub-slurmspawner.log".to_string(),
            defaults: ResourceRequest::default(),
            extra_launch_script: PathBuf::from("/etc/jupyterhub/extra_launch_script"),
            run_with_sudo: false,
            token_dir: PathBuf::from("/tmp/jupyter"),
            export_env: vec!["JPY_API_TOKEN".to_string()],
            poll_interval: Duration::from_secs(1),
            launch_timeout: Some(Duration::from_secs(600)),
            workers: 1,
            port_range: (49152, 65535),
        }
    }
}
