// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use slurmspawner::adapters::cli::{self, Command, StartArgs};
use slurmspawner::adapters::fs::{LocalFilesystem, StateFiles};
use slurmspawner::adapters::identity::GetentIdentity;
use slurmspawner::adapters::network::{DnsResolver, HostCommandResolver};
use slurmspawner::adapters::process::LocalShell;
use slurmspawner::adapters::telemetry::TracingTelemetry;
use slurmspawner::app::ports::{NodeResolverPort, SchedulerExecPort};
use slurmspawner::app::types::{LaunchSpec, ResourceOverrides};
use slurmspawner::app::usecases::UseCases;
use slurmspawner::config::{self, NodeResolverKind};
use slurmspawner::logging;

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::info!(
                "config path: {} (source={}, present={})",
                path.display(),
                source.as_str(),
                report.config_file_present
            );
        }
        (Some(path), None) => {
            tracing::info!(
                "config path: {} (present={})",
                path.display(),
                report.config_file_present
            );
        }
        (None, _) => {
            tracing::info!("config path: (none)");
        }
    }
    let paths = [
        ("state_dir", &report.state_dir),
        ("token_dir", &report.token_dir),
        ("extra_launch_script", &report.extra_launch_script),
    ];
    for (name, value) in paths {
        tracing::info!(
            "config {name}: {} (source={})",
            value.value.display(),
            value.source.as_str()
        );
    }
    tracing::info!(
        "config launch_timeout_secs: {} (source={})",
        report.launch_timeout_secs.value,
        report.launch_timeout_secs.source.as_str()
    );
    tracing::info!(
        "config poll_interval_ms: {} (source={})",
        report.poll_interval_ms.value,
        report.poll_interval_ms.source.as_str()
    );
    tracing::info!(
        "config workers: {} (source={})",
        report.workers.value,
        report.workers.source.as_str()
    );
    tracing::info!(
        "config node_resolver: {} (source={})",
        report.node_resolver.value.as_str(),
        report.node_resolver.source.as_str()
    );
    tracing::info!(
        "config run_with_sudo: {} (source={})",
        report.run_with_sudo.value,
        report.run_with_sudo.source.as_str()
    );
    tracing::info!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
}

fn launch_spec(args: &StartArgs, export_keys: &[String]) -> LaunchSpec {
    let mut env: BTreeMap<String, String> = export_keys
        .iter()
        .filter_map(|key| std::env::var(key).ok().map(|value| (key.clone(), value)))
        .collect();
    env.extend(args.env.iter().cloned());
    let (cmd, rest) = args.command.split_at(1.min(args.command.len()));
    LaunchSpec {
        cmd: cmd.to_vec(),
        args: rest.to_vec(),
        env,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let parsed = cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            state_dir: opts.state_dir,
            launch_timeout_secs: opts.launch_timeout_secs,
            workers: opts.workers,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);
    config::ensure_state_dir(&config.state_dir)?;
    let state_files = StateFiles::new(&config.state_dir);

    let shell: Arc<dyn SchedulerExecPort> = Arc::new(LocalShell::new());
    let resolver: Arc<dyn NodeResolverPort> = match config.node_resolver {
        NodeResolverKind::HostCommand => Arc::new(HostCommandResolver::new(shell.clone())),
        NodeResolverKind::Dns => Arc::new(DnsResolver::new()),
    };
    let export_keys = config.settings.export_env.clone();
    let usecases = UseCases::new(
        shell.clone(),
        Arc::new(LocalFilesystem::new()),
        resolver,
        Arc::new(GetentIdentity::new(shell)),
        Arc::new(TracingTelemetry::new()),
        config.settings,
    );

    let mut exit = ExitCode::SUCCESS;
    match opts.command {
        Command::Start(args) => {
            let mut session = usecases.session(&args.user, launch_spec(&args, &export_keys))?;
            session.load_state(state_files.load(&args.user)?).await;
            if args.has_resource_request() {
                session.request_resources(ResourceOverrides {
                    memory: args.memory,
                    cpus: args.cpus,
                    tasks: args.tasks,
                    nodes: args.nodes,
                    time: args.time.clone(),
                });
            }
            let result = session.start().await;
            state_files.save(&args.user, &session.get_state().await)?;
            let endpoint = result?;
            println!("{}:{}", endpoint.ip, endpoint.port);
        }
        Command::Poll(args) => {
            let session = usecases.session(&args.user, LaunchSpec::default())?;
            session.load_state(state_files.load(&args.user)?).await;
            let status = session.poll().await;
            state_files.save(&args.user, &session.get_state().await)?;
            match status {
                None => println!("running"),
                Some(code) => {
                    println!("{code}");
                    exit = ExitCode::FAILURE;
                }
            }
        }
        Command::Stop(args) => {
            let session = usecases.session(&args.user, LaunchSpec::default())?;
            session.load_state(state_files.load(&args.user)?).await;
            session.stop(!args.now).await;
            state_files.save(&args.user, &session.get_state().await)?;
        }
        Command::State(args) => {
            let state = state_files.load(&args.user)?;
            let body = serde_json::to_string_pretty(&state)
                .context("failed to encode job state")?;
            println!("{body}");
        }
    }
    usecases.shutdown();
    Ok(exit)
}
