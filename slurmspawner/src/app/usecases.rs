// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::{Instant, sleep};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{
    ExecCapture, IdentityPort, LocalFilesystemPort, NodeResolverPort, SchedulerExecPort,
    TelemetryEvent, TelemetryPort,
};
use crate::app::services::listen_port::PortRegistry;
use crate::app::services::script::{ScriptParams, render_script};
use crate::app::services::{launch, resources, slurm, token};
use crate::app::types::{
    JobRecord, JobState, JobStatus, LaunchSpec, ListedJob, NodeAllocation, PersistedState,
    OwnerIdentity, ResourceOverrides, ServerEndpoint, SpawnerSettings,
};

/// Exit status reported to the host once the job is gone.
pub const EXIT_NOT_RUNNING: i32 = 127;

type SharedRecord = Arc<Mutex<JobRecord>>;

/// Job lifecycle engine shared by every owner's session.
///
/// Scheduler-facing work runs under a permit from a semaphore sized by
/// `SpawnerSettings::workers`, and each owner's record is guarded by its own
/// async mutex, so two operations for the same owner never interleave.
#[derive(Clone)]
pub struct UseCases {
    pub(crate) scheduler: Arc<dyn SchedulerExecPort>,
    pub(crate) local_fs: Arc<dyn LocalFilesystemPort>,
    pub(crate) resolver: Arc<dyn NodeResolverPort>,
    pub(crate) identity: Arc<dyn IdentityPort>,
    pub(crate) telemetry: Arc<dyn TelemetryPort>,
    pub(crate) settings: Arc<SpawnerSettings>,
    workers: Arc<Semaphore>,
    ports: Arc<PortRegistry>,
    records: Arc<std::sync::Mutex<HashMap<String, SharedRecord>>>,
}

impl UseCases {
    pub fn new(
        scheduler: Arc<dyn SchedulerExecPort>,
        local_fs: Arc<dyn LocalFilesystemPort>,
        resolver: Arc<dyn NodeResolverPort>,
        identity: Arc<dyn IdentityPort>,
        telemetry: Arc<dyn TelemetryPort>,
        settings: SpawnerSettings,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(settings.workers.max(1)));
        let (start, end) = settings.port_range;
        Self {
            scheduler,
            local_fs,
            resolver,
            identity,
            telemetry,
            settings: Arc::new(settings),
            workers,
            ports: Arc::new(PortRegistry::new(start, end)),
            records: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// Handle on `owner`'s job. Sessions for the same owner share one record.
    pub fn session(&self, owner: &str, launch: LaunchSpec) -> AppResult<SpawnerSession> {
        let record = {
            let mut records = self.records.lock().map_err(|_| {
                AppError::with_message(
                    AppErrorKind::Internal,
                    codes::INTERNAL_ERROR,
                    "record registry lock poisoned",
                )
            })?;
            records
                .entry(owner.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(JobRecord::new(owner))))
                .clone()
        };
        Ok(SpawnerSession {
            usecases: self.clone(),
            owner: owner.to_string(),
            launch,
            overrides: None,
            record,
        })
    }

    /// Shuts the worker pool; queued and future operations fail fast.
    pub fn shutdown(&self) {
        self.workers.close();
    }

    async fn acquire_worker(&self) -> AppResult<SemaphorePermit<'_>> {
        self.workers.acquire().await.map_err(|_| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::INTERNAL_ERROR,
                "scheduler worker pool is shut down",
            )
        })
    }

    async fn exec(&self, command: &str) -> AppResult<ExecCapture> {
        tracing::debug!("running command '{command}'");
        let capture = self.scheduler.exec_capture(command, None).await?;
        tracing::debug!(
            "command '{command}' exited {} stdout={:?}",
            capture.exit_code,
            capture.text()
        );
        Ok(capture)
    }

    /// Looks for a job with the configured name owned by `owner`.
    pub async fn find_existing_job(&self, owner: &str) -> AppResult<ListedJob> {
        tracing::debug!(
            "querying scheduler for user '{owner}' with job name '{}'",
            self.settings.job_name
        );
        let command = slurm::list_jobs_command(owner, &self.settings.job_name);
        let capture = self.exec(&command).await?;
        if !capture.success() {
            return Err(scheduler_error(format!(
                "job listing for {owner} failed: {}",
                failure_detail(&capture)
            )));
        }
        let listed = slurm::parse_list_output(&capture.text());
        if !listed.job_id.is_empty() {
            tracing::debug!("query found job id '{}'", listed.job_id);
        }
        Ok(listed)
    }

    /// Re-derives the state of `job_id`, consulting the reason when PENDING.
    pub async fn query_status(&self, job_id: &str) -> AppResult<JobStatus> {
        if job_id.is_empty() {
            // An empty -j filter would report every job on the cluster.
            return Ok(JobStatus::default());
        }
        let capture = self.exec(&slurm::job_state_command(job_id)).await?;
        if !capture.success() {
            let stderr = capture.stderr_text();
            if slurm::is_invalid_job_id(&stderr) {
                return Ok(JobStatus::default());
            }
            return Err(scheduler_error(format!(
                "state query for job {job_id} failed: {}",
                failure_detail(&capture)
            )));
        }
        let state_raw = capture.text();

        let mut reason_raw = None;
        if slurm::parse_state(&state_raw) == JobState::Pending {
            tracing::debug!("job {job_id} is PENDING, checking reason");
            match self.exec(&slurm::job_reason_command(job_id)).await {
                Ok(reason) => reason_raw = Some(reason.text()),
                Err(err) => tracing::warn!("reason query for job {job_id} failed: {err}"),
            }
        }
        let status = slurm::parse_query_output(&state_raw, reason_raw.as_deref());
        if status.state == JobState::Failed && reason_raw.is_some() {
            tracing::debug!("'failed' found in pending reason for job {job_id}, marking FAILED");
        }
        Ok(status)
    }

    /// Allocated node of `job_id` and its address.
    pub async fn resolve_node(&self, job_id: &str) -> AppResult<NodeAllocation> {
        tracing::debug!("getting node info for job {job_id}");
        let capture = self.exec(&slurm::node_name_command(job_id)).await?;
        let Some(node_name) = slurm::parse_node_name(&capture.text()) else {
            return Err(AppError::node_unavailable(
                job_id,
                format!("there appears to be no node info available for job {job_id}"),
            ));
        };
        let address = self
            .resolver
            .resolve_node_addr(&node_name)
            .await
            .map_err(|err| {
                AppError::node_unavailable(
                    job_id,
                    format!("node {node_name} is allocated but unreachable: {}", err.message()),
                )
            })?;
        Ok(NodeAllocation { node_name, address })
    }

    /// Issues `scancel`; silence is the only success signal.
    async fn cancel_job(&self, job_id: &str) -> AppResult<()> {
        let capture = self.exec(&slurm::cancel_command(job_id)).await?;
        let output = capture.text();
        if !output.is_empty() {
            return Err(AppError::cancel_failed(job_id, &output));
        }
        if !capture.success() {
            let stderr = capture.stderr_text();
            if !slurm::is_invalid_job_id(&stderr) {
                return Err(AppError::cancel_failed(job_id, &failure_detail(&capture)));
            }
        }
        Ok(())
    }

    /// Cancels `job_id` and reports whether it has left the active set.
    async fn cancel_and_confirm(&self, job_id: &str) -> AppResult<bool> {
        if job_id.is_empty() {
            return Ok(true);
        }
        self.cancel_job(job_id).await?;
        let status = self.query_status(job_id).await?;
        tracing::debug!("job {job_id} state after cancel is {}", status.state);
        Ok(status.state.has_left_active_set())
    }

    async fn load_snippet(&self) -> Option<String> {
        let path = &self.settings.extra_launch_script;
        match self.local_fs.read_optional(path).await {
            Ok(Some(snippet)) => {
                tracing::info!(
                    "loading extra script snippet found at '{}' into job script",
                    path.display()
                );
                Some(snippet)
            }
            Ok(None) => {
                tracing::debug!("no extra launch script at '{}', using defaults", path.display());
                None
            }
            Err(err) => {
                tracing::warn!("ignoring unreadable extra launch script: {err}");
                None
            }
        }
    }

    /// Hands the script to `sbatch` on stdin and returns the new job id.
    async fn submit(&self, script: &str) -> AppResult<String> {
        let command = slurm::submit_command(self.settings.run_with_sudo);
        tracing::debug!("submitting *****{{\n{script}\n}}*****");
        let capture = self
            .scheduler
            .exec_capture(command, Some(script))
            .await
            .map_err(|err| {
                AppError::launch_failed("", "ABSENT", format!("{command} could not run: {err}"))
            })?;
        if !capture.success() {
            return Err(AppError::launch_failed(
                "",
                "ABSENT",
                format!("{command} refused the job: {}", failure_detail(&capture)),
            ));
        }
        let output = capture.text();
        if output.is_empty() {
            return Err(AppError::launch_failed(
                "",
                "ABSENT",
                "Slurm did not attempt to start the job! Check Slurm logs",
            ));
        }
        tracing::debug!("stdout of {command}: {output}");
        slurm::parse_submitted_job_id(&output).ok_or_else(|| {
            AppError::launch_failed(
                "",
                "ABSENT",
                format!("unrecognised {command} output: {output}"),
            )
        })
    }

    /// Polls until RUNNING, failing on any state other than PENDING or on the deadline.
    async fn wait_until_running(&self, job_id: &str) -> AppResult<()> {
        let deadline = self
            .settings
            .launch_timeout
            .map(|timeout| Instant::now() + timeout);
        loop {
            match self.query_status(job_id).await {
                Ok(status) => {
                    tracing::info!("job {job_id} state is {}", status.state);
                    match status.state {
                        JobState::Running => return Ok(()),
                        JobState::Pending => {}
                        other => {
                            return Err(AppError::launch_failed(
                                job_id,
                                &other.to_string(),
                                format!("Job {job_id} failed to start"),
                            ));
                        }
                    }
                }
                Err(err) => tracing::warn!("state query for job {job_id} failed, retrying: {err}"),
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(AppError::launch_timeout(
                    job_id,
                    format!("Job {job_id} did not start before the launch deadline"),
                ));
            }
            sleep(self.settings.poll_interval).await;
        }
    }

    fn emit(&self, name: &'static str, record: &JobRecord) {
        self.telemetry.event(
            name,
            TelemetryEvent {
                owner: Some(record.owner.clone()),
                job_id: record.has_job().then(|| record.job_id.clone()),
                port: record.listen_port,
                node: record
                    .allocation
                    .as_ref()
                    .map(|allocation| allocation.node_name.clone()),
                state: Some(record.state.to_string()),
            },
        );
    }
}

/// One owner's view of the engine, driven by the host framework.
pub struct SpawnerSession {
    usecases: UseCases,
    owner: String,
    launch: LaunchSpec,
    overrides: Option<ResourceOverrides>,
    record: SharedRecord,
}

impl SpawnerSession {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Custom resources for the next fresh submission only.
    pub fn request_resources(&mut self, overrides: ResourceOverrides) {
        self.overrides = Some(overrides);
    }

    /// Adopts the owner's existing job or submits a new one, then waits for RUNNING.
    pub async fn start(&mut self) -> AppResult<ServerEndpoint> {
        let overrides = self.overrides.take();
        let mut record = self.record.lock().await;
        let _permit = self.usecases.acquire_worker().await?;
        tracing::debug!("starting server for {}", self.owner);

        let mut listed = self.usecases.find_existing_job(&self.owner).await?;
        if listed.state == JobState::Completing {
            tracing::debug!(
                "job {} still completing, submitting a new job instead",
                listed.job_id
            );
            listed = ListedJob::default();
        }

        if listed.job_id.is_empty() {
            return self.submit_fresh(&mut record, overrides.as_ref()).await;
        }

        if slurm::reason_indicates_failure(&listed.reason_text()) {
            tracing::error!(
                "'failed' found in reason '{}' for job {}, cancelling",
                listed.reason_text(),
                listed.job_id
            );
            record.state = JobState::Failed;
            return Err(self
                .reject_listed_job(&mut record, &listed, "Slurm failed to launch job")
                .await);
        }

        // A second submission while this job lives would break one job per owner.
        let Some(port) = listed.port_number() else {
            tracing::error!(
                "job {} carries no usable port in comment '{}', cancelling",
                listed.job_id,
                listed.port
            );
            record.state = listed.state.clone();
            let message = format!("job {} has no usable port", listed.job_id);
            return Err(self.reject_listed_job(&mut record, &listed, message).await);
        };

        self.reattach(&mut record, listed.job_id, port, listed.state).await
    }

    /// Cancels a listed job that cannot be adopted and forgets it.
    async fn reject_listed_job(
        &self,
        record: &mut JobRecord,
        listed: &ListedJob,
        message: impl Into<String>,
    ) -> AppError {
        record.job_id = listed.job_id.clone();
        if let Err(err) = self.usecases.cancel_job(&listed.job_id).await {
            tracing::warn!("cancel of job {} failed: {err}", listed.job_id);
        }
        self.usecases.emit("job.launch_failed", record);
        self.clear_record(record);
        AppError::launch_failed(&listed.job_id, &listed.state.to_string(), message)
    }

    async fn reattach(
        &self,
        record: &mut JobRecord,
        job_id: String,
        port: u16,
        state: JobState,
    ) -> AppResult<ServerEndpoint> {
        tracing::info!(
            "server found with job id '{job_id}' for user '{}' on port {port}",
            self.owner
        );
        record.job_id = job_id.clone();
        record.listen_port = Some(port);
        record.state = state;
        self.usecases.ports.claim(&self.owner, port);
        self.usecases.emit("job.reattached", record);

        if record.state != JobState::Running {
            if let Err(err) = self.usecases.wait_until_running(&job_id).await {
                return Err(self.abandon(record, err, true).await);
            }
            record.state = JobState::Running;
        }
        let allocation = match self.usecases.resolve_node(&job_id).await {
            Ok(allocation) => allocation,
            Err(err) => return Err(self.abandon(record, err, false).await),
        };
        record.allocation = Some(allocation);
        self.running(record)
    }

    async fn submit_fresh(
        &self,
        record: &mut JobRecord,
        overrides: Option<&ResourceOverrides>,
    ) -> AppResult<ServerEndpoint> {
        let usecases = &self.usecases;
        let settings = &usecases.settings;
        record.clear();

        let identity = usecases.identity.lookup_owner(&self.owner).await?;
        let port = usecases.ports.reserve(&self.owner)?;
        record.listen_port = Some(port);

        let script = match self.prepare_script(&identity, port, overrides).await {
            Ok(script) => script,
            Err(err) => return Err(self.abandon(record, err, false).await),
        };
        if let Err(err) =
            token::write_token(usecases.local_fs.as_ref(), &settings.token_dir, identity.uid, port)
                .await
        {
            tracing::error!("{err}");
            return Err(self.abandon(record, err, false).await);
        }

        let job_id = match usecases.submit(&script).await {
            Ok(job_id) => job_id,
            Err(err) => {
                tracing::error!("{err}");
                return Err(self.abandon(record, err, false).await);
            }
        };
        tracing::info!("submitted job {job_id} for {} on port {port}", self.owner);
        record.job_id = job_id.clone();
        record.state = JobState::Submitted;
        usecases.emit("job.submitted", record);

        if let Err(err) = usecases.wait_until_running(&job_id).await {
            tracing::error!("{err}");
            return Err(self.abandon(record, err, true).await);
        }
        record.state = JobState::Running;

        let allocation = match usecases.resolve_node(&job_id).await {
            Ok(allocation) => allocation,
            Err(err) => {
                tracing::error!("{err}");
                return Err(self.abandon(record, err, true).await);
            }
        };
        record.allocation = Some(allocation);
        self.running(record)
    }

    async fn prepare_script(
        &self,
        identity: &OwnerIdentity,
        port: u16,
        overrides: Option<&ResourceOverrides>,
    ) -> AppResult<String> {
        let settings = &self.usecases.settings;
        let command_line =
            launch::compose_command_line(&self.launch, identity, &settings.export_env, port)?;
        tracing::info!("spawning {}", command_line.split_once(';').map_or("", |(_, cmd)| cmd));
        if overrides.is_some() {
            tracing::debug!("applying custom resource request for {}", self.owner);
        }
        let resources = resources::select_resources(&settings.defaults, overrides);
        let snippet = self.usecases.load_snippet().await;
        let params = ScriptParams {
            resources: &resources,
            job_name: &settings.job_name,
            output: &settings.output,
            home: &identity.home,
        };
        render_script(
            &params,
            snippet.as_deref(),
            port,
            &identity.name,
            identity.gid,
            &command_line,
        )
    }

    fn running(&self, record: &mut JobRecord) -> AppResult<ServerEndpoint> {
        record.state = JobState::Running;
        self.usecases.emit("job.running", record);
        let endpoint = record.endpoint().ok_or_else(|| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::INTERNAL_ERROR,
                "running job has no endpoint",
            )
        })?;
        tracing::info!(
            "server for {} running on {}:{} (job {})",
            self.owner,
            endpoint.ip,
            endpoint.port,
            record.job_id
        );
        Ok(endpoint)
    }

    /// Clears the record after a failed start, cancelling the job first when asked.
    async fn abandon(&self, record: &mut JobRecord, err: AppError, cancel: bool) -> AppError {
        if cancel && record.has_job() {
            if let Err(cancel_err) = self.usecases.cancel_job(&record.job_id).await {
                tracing::warn!("cancel of job {} failed: {cancel_err}", record.job_id);
            }
        }
        if matches!(
            err.kind(),
            AppErrorKind::LaunchFailed | AppErrorKind::LaunchTimeout
        ) {
            self.usecases.emit("job.launch_failed", record);
        }
        self.clear_record(record);
        err
    }

    /// `None` while the job is PENDING or RUNNING, otherwise [`EXIT_NOT_RUNNING`].
    pub async fn poll(&self) -> Option<i32> {
        let mut record = self.record.lock().await;
        if !record.has_job() {
            tracing::debug!("no job info to poll, clearing state for {}", self.owner);
            self.clear_record(&mut record);
            return Some(EXIT_NOT_RUNNING);
        }
        let _permit = match self.usecases.acquire_worker().await {
            Ok(permit) => permit,
            Err(err) => {
                tracing::warn!("poll for {} skipped: {err}", self.owner);
                return None;
            }
        };

        let job_id = record.job_id.clone();
        let status = match self.usecases.query_status(&job_id).await {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!("poll of job {job_id} failed, assuming still active: {err}");
                return None;
            }
        };
        record.state = status.state.clone();
        if status.state.is_active() {
            tracing::debug!(
                "job {job_id} found to be {} for {}",
                status.state,
                self.owner
            );
            return None;
        }

        if status.state == JobState::Absent {
            tracing::debug!("no job state found for job {job_id}, clearing state for {}", self.owner);
        } else {
            tracing::debug!(
                "job {job_id} found to be {}, clearing state for {}",
                status.state,
                self.owner
            );
        }
        if let Err(err) = self.usecases.cancel_job(&job_id).await {
            tracing::debug!("cleanup cancel of job {job_id} ignored: {err}");
        }
        self.usecases.emit("job.exited", &record);
        self.clear_record(&mut record);
        Some(EXIT_NOT_RUNNING)
    }

    /// Best-effort teardown; never fails and always clears the record.
    pub async fn stop(&self, graceful: bool) {
        let mut record = self.record.lock().await;
        if graceful {
            self.cancel_with_retry(&record).await;
        }
        self.clear_record(&mut record);
    }

    async fn cancel_with_retry(&self, record: &JobRecord) {
        if !record.has_job() {
            tracing::warn!("job id for user {} isn't defined", self.owner);
            return;
        }
        let _permit = match self.usecases.acquire_worker().await {
            Ok(permit) => permit,
            Err(err) => {
                tracing::warn!("stop for {} skipped: {err}", self.owner);
                return;
            }
        };
        let job_id = record.job_id.as_str();
        tracing::info!("stopping job {job_id} for user {}", self.owner);

        let mut stopped = self.attempt_cancel(job_id).await;
        if !stopped {
            tracing::warn!("job {job_id} didn't stop, trying again");
            stopped = self.attempt_cancel(job_id).await;
        }
        if stopped {
            self.usecases.emit("job.cancelled", record);
        } else {
            tracing::warn!("job {job_id} could not be confirmed stopped; clearing anyway");
        }
        self.usecases.emit("job.stopped", record);
    }

    async fn attempt_cancel(&self, job_id: &str) -> bool {
        match self.usecases.cancel_and_confirm(job_id).await {
            Ok(stopped) => stopped,
            Err(err) => {
                tracing::warn!("{err}");
                false
            }
        }
    }

    pub async fn load_state(&self, state: PersistedState) {
        let mut record = self.record.lock().await;
        record.job_id = state.slurm_job_id.unwrap_or_default();
        record.listen_port = state.slurm_port;
        record.state = if record.has_job() {
            JobState::Submitted
        } else {
            JobState::Absent
        };
        if let (true, Some(port)) = (record.has_job(), record.listen_port) {
            self.usecases.ports.claim(&self.owner, port);
        }
    }

    pub async fn get_state(&self) -> PersistedState {
        let record = self.record.lock().await;
        PersistedState {
            slurm_job_id: record.has_job().then(|| record.job_id.clone()),
            slurm_port: record.listen_port,
        }
    }

    pub async fn clear_state(&self) {
        let mut record = self.record.lock().await;
        self.clear_record(&mut record);
    }

    pub async fn server(&self) -> Option<ServerEndpoint> {
        self.record.lock().await.endpoint()
    }

    pub async fn record(&self) -> JobRecord {
        self.record.lock().await.clone()
    }

    fn clear_record(&self, record: &mut JobRecord) {
        record.clear();
        self.usecases.ports.release(&self.owner);
    }
}

fn failure_detail(capture: &ExecCapture) -> String {
    let stderr = capture.stderr_text();
    if stderr.is_empty() {
        format!("exit code {}", capture.exit_code)
    } else {
        stderr
    }
}

fn scheduler_error(message: impl Into<String>) -> AppError {
    AppError::with_message(AppErrorKind::Internal, codes::SCHEDULER_ERROR, message)
}
