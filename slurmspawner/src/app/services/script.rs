// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use tera::Context;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::types::ResourceRequest;

pub const NO_SNIPPET_PLACEHOLDER: &str = "# *** No user template found ***";
pub const SNIPPET_BEGIN_MARKER: &str = "##### USER-DEFINED TEMPLATE LOADED HERE #####";
pub const SNIPPET_END_MARKER: &str = "##### END USER-DEFINED TEMPLATE #############";
pub const SPAWN_BANNER: &str = "echo \"*** Spawning single-user server ***\"";

const SUBMISSION_TEMPLATE: &str = r#"#!/bin/bash
#SBATCH --cpus-per-task={{ cpus }}
#SBATCH --job-name={{ job_name }}
#SBATCH --mem={{ mem }}
#SBATCH --ntasks={{ ntasks }}
#SBATCH --nodes={{ nodes }}
#SBATCH --output={{ output }}
#SBATCH --partition={{ partition }}
#SBATCH --qos={{ qos }}
#SBATCH --time={{ time }}
#SBATCH --chdir={{ workdir }}
#SBATCH --comment={{ port }}
#SBATCH --open-mode=append
#SBATCH --uid={{ owner }}
#SBATCH --gid={{ gid }}
#SBATCH --export=none
#SBATCH --get-user-env=L

{{ snippet_begin }}
{{ snippet }}
{{ snippet_end }}

{{ banner }}
{{ export_cmd }}
{{ cmd }}
"#;

/// Fixed per-deployment inputs of the submission script.
#[derive(Debug, Clone)]
pub struct ScriptParams<'a> {
    pub resources: &'a ResourceRequest,
    pub job_name: &'a str,
    /// Log path relative to the owner's home directory.
    pub output: &'a str,
    pub home: &'a Path,
}

/// Renders the `sbatch` script body.
///
/// `command_line` is split on its first `;`: the left part is the export
/// statement, the right part the server launch command.
pub fn render_script(
    params: &ScriptParams<'_>,
    snippet: Option<&str>,
    port: u16,
    owner: &str,
    gid: u32,
    command_line: &str,
) -> AppResult<String> {
    let (export_cmd, cmd) = command_line.split_once(';').ok_or_else(|| {
        invalid_argument("launch command must be '<export prefix>;<server command>'")
    })?;

    let home = params.home.to_string_lossy();
    let workdir = home.trim_end_matches('/');
    let output = format!("{workdir}/{}", params.output.trim_start_matches('/'));

    let mut context = Context::new();
    context.insert("cpus", &params.resources.cpus_per_task);
    context.insert("job_name", params.job_name);
    context.insert("mem", &params.resources.mem);
    context.insert("ntasks", &params.resources.ntasks);
    context.insert("nodes", &params.resources.nodes);
    context.insert("output", &output);
    context.insert("partition", &params.resources.partition);
    context.insert("qos", &params.resources.qos);
    context.insert("time", &params.resources.time);
    context.insert("workdir", workdir);
    context.insert("port", &port);
    context.insert("owner", owner);
    context.insert("gid", &gid);
    context.insert("snippet_begin", SNIPPET_BEGIN_MARKER);
    let snippet = snippet.unwrap_or(NO_SNIPPET_PLACEHOLDER);
    // The template already ends the snippet line; drop one newline only.
    context.insert("snippet", snippet.strip_suffix('\n').unwrap_or(snippet));
    context.insert("snippet_end", SNIPPET_END_MARKER);
    context.insert("banner", SPAWN_BANNER);
    context.insert("export_cmd", export_cmd.trim());
    context.insert("cmd", cmd.trim());

    tera::Tera::one_off(SUBMISSION_TEMPLATE, &context, false).map_err(|err| {
        AppError::with_message(
            AppErrorKind::Internal,
            codes::INTERNAL_ERROR,
            format!("failed to render submission script: {err}"),
        )
    })
}

fn invalid_argument(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::InvalidArgument,
        codes::INVALID_ARGUMENT,
        message,
    )
}
