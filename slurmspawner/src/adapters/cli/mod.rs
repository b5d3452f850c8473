// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "slurm-spawner",
    version,
    about = "Run per-user notebook servers as Slurm batch jobs",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < SLURM_SPAWNER_CONFIG_PATH < command-line flags.\n\
Job state is kept per user in <state_dir>/<user>.json between invocations."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, SLURM_SPAWNER_CONFIG_PATH is used if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Directory holding per-user job state. Overrides `state_dir` from the config file."
    )]
    pub state_dir: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        help = "Give up on a PENDING job after this many seconds, 0 waits forever. Overrides `launch_timeout_secs`."
    )]
    pub launch_timeout_secs: Option<u64>,
    #[arg(
        long,
        global = true,
        value_name = "N",
        help = "Scheduler commands allowed to run at once. Overrides `workers` from the config file."
    )]
    pub workers: Option<usize>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging and include logs from dependencies. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Adopt the user's running job or submit a new one and wait until it runs.
    Start(StartArgs),
    /// Print `running` while the job is alive, otherwise its exit status.
    Poll(UserArgs),
    /// Cancel the user's job and forget it.
    Stop(StopArgs),
    /// Print the persisted job state as JSON.
    State(UserArgs),
}

#[derive(Args, Debug)]
pub struct UserArgs {
    #[arg(short, long, value_name = "USER")]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct StopArgs {
    #[arg(short, long, value_name = "USER")]
    pub user: String,
    #[arg(long, help = "Forget the job without cancelling it.")]
    pub now: bool,
}

#[derive(Args, Debug)]
pub struct StartArgs {
    #[arg(short, long, value_name = "USER")]
    pub user: String,
    #[arg(
        long = "env",
        value_name = "KEY=VALUE",
        value_parser = parse_key_value,
        help = "Environment entry for the server, repeatable. Exported keys not given here are read from this process's environment."
    )]
    pub env: Vec<(String, String)>,
    #[arg(long = "mem", value_name = "MB")]
    pub memory: Option<i64>,
    #[arg(long, value_name = "N")]
    pub cpus: Option<i64>,
    #[arg(long, value_name = "N")]
    pub tasks: Option<i64>,
    #[arg(long, value_name = "N")]
    pub nodes: Option<i64>,
    #[arg(long, value_name = "D-HH:MM:SS")]
    pub time: Option<String>,
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND",
        help = "Server command and arguments; `{port}` is replaced by the chosen port."
    )]
    pub command: Vec<String>,
}

impl StartArgs {
    pub fn has_resource_request(&self) -> bool {
        self.memory.is_some()
            || self.cpus.is_some()
            || self.tasks.is_some()
            || self.nodes.is_some()
            || self.time.is_some()
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

pub fn cli_command() -> clap::Command {
    Opts::command()
}

pub fn parse_opts() -> ParsedOpts {
    let matches = cli_command().get_matches();
    let opts = Opts::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let verbose_override = opts.verbose.then_some(true);
    ParsedOpts {
        opts,
        verbose_override,
    }
}
