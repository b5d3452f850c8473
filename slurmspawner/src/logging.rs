// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV_VAR: &str = "SLURM_SPAWNER_LOG";
const LOG_FORMAT_ENV_VAR: &str = "SLURM_SPAWNER_LOG_FORMAT";
const LOG_SPAN_EVENTS_ENV_VAR: &str = "SLURM_SPAWNER_LOG_SPAN_EVENTS";
const LOG_FILE_ENV_VAR: &str = "SLURM_SPAWNER_LOG_FILE";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

// Console output goes to stderr; stdout carries command results.
macro_rules! install {
    ($registry:expr, $span_events:expr, $style:ident) => {{
        let console = tracing_subscriber::fmt::layer()
            .$style()
            .with_writer(std::io::stderr)
            .with_timer(UtcTime::rfc_3339())
            .with_span_events($span_events.clone());
        match build_file_writer() {
            Some((writer, guard)) => {
                let file = tracing_subscriber::fmt::layer()
                    .$style()
                    .with_ansi(false)
                    .with_timer(UtcTime::rfc_3339())
                    .with_span_events($span_events)
                    .with_writer(writer);
                $registry.with(console).with(file).init();
                let _ = FILE_GUARD.set(guard);
            }
            None => $registry.with(console).init(),
        }
    }};
}

pub fn init(verbose: bool) {
    let span_events = parse_span_events(env::var(LOG_SPAN_EVENTS_ENV_VAR).ok().as_deref());
    let registry = Registry::default()
        .with(build_filter(verbose))
        .with(tracing_error::ErrorLayer::default());

    match parse_format(env::var(LOG_FORMAT_ENV_VAR).ok().as_deref()) {
        LogFormat::Json => install!(registry, span_events, json),
        LogFormat::Pretty => install!(registry, span_events, pretty),
        LogFormat::Compact => install!(registry, span_events, compact),
    }
}

fn build_filter(verbose: bool) -> EnvFilter {
    match env::var(LOG_ENV_VAR) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => EnvFilter::new(default_directive(verbose)),
    }
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "slurmspawner=info,slurm_spawner=info"
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_ascii_lowercase)
}

fn parse_format(value: Option<&str>) -> LogFormat {
    match normalized(value).as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

fn parse_span_events(value: Option<&str>) -> FmtSpan {
    match normalized(value).as_deref() {
        Some("new") => FmtSpan::NEW,
        Some("enter") => FmtSpan::ENTER,
        Some("exit") => FmtSpan::EXIT,
        Some("close") => FmtSpan::CLOSE,
        _ => FmtSpan::NONE,
    }
}

fn build_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let file_path = env::var(LOG_FILE_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())?;

    let path = Path::new(&file_path);
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}
