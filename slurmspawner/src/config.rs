// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::app::types::{ResourceRequest, SpawnerSettings};

const APP_DIR_NAME: &str = "slurm-spawner";
const CONFIG_FILE_NAME: &str = "slurm-spawner.toml";
const CONFIG_ENV_VAR: &str = "SLURM_SPAWNER_CONFIG_PATH";
const DEFAULT_EXTRA_LAUNCH_SCRIPT: &str = "/etc/jupyterhub/extra_launch_script";
const DEFAULT_TOKEN_DIR: &str = "/tmp/jupyter";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_LAUNCH_TIMEOUT_SECS: u64 = 600;
const DEFAULT_WORKERS: usize = 1;
const DEFAULT_PORT_RANGE_START: u16 = 49152;
const DEFAULT_PORT_RANGE_END: u16 = 65535;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeResolverKind {
    #[default]
    HostCommand,
    Dns,
}

impl NodeResolverKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeResolverKind::HostCommand => "host-command",
            NodeResolverKind::Dns => "dns",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    partition: Option<String>,
    mem: Option<u64>,
    time: Option<String>,
    ntasks: Option<u32>,
    cpus_per_task: Option<u32>,
    nodes: Option<u32>,
    qos: Option<String>,
    job_name: Option<String>,
    output: Option<String>,
    extra_launch_script: Option<String>,
    run_with_sudo: Option<bool>,
    token_dir: Option<String>,
    export_env: Option<Vec<String>>,
    poll_interval_ms: Option<u64>,
    launch_timeout_secs: Option<u64>,
    workers: Option<usize>,
    port_range_start: Option<u16>,
    port_range_end: Option<u16>,
    node_resolver: Option<NodeResolverKind>,
    state_dir: Option<String>,
    verbose: Option<bool>,
}

#[derive(Debug)]
pub struct Config {
    pub settings: SpawnerSettings,
    pub node_resolver: NodeResolverKind,
    pub state_dir: PathBuf,
    pub verbose: bool,
    #[allow(dead_code)]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub state_dir: ConfigValue<PathBuf>,
    pub token_dir: ConfigValue<PathBuf>,
    pub extra_launch_script: ConfigValue<PathBuf>,
    pub launch_timeout_secs: ConfigValue<u64>,
    pub poll_interval_ms: ConfigValue<u64>,
    pub workers: ConfigValue<usize>,
    pub node_resolver: ConfigValue<NodeResolverKind>,
    pub run_with_sudo: ConfigValue<bool>,
    pub verbose: ConfigValue<bool>,
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub state_dir: Option<PathBuf>,
    pub launch_timeout_secs: Option<u64>,
    pub workers: Option<usize>,
    pub verbose: Option<bool>,
}

/// Highest-precedence value among override, file and default.
fn pick<T>(over: Option<T>, file: Option<T>, default: impl FnOnce() -> T) -> ConfigValue<T> {
    match (over, file) {
        (Some(value), _) => ConfigValue {
            value,
            source: ConfigSource::Override,
        },
        (None, Some(value)) => ConfigValue {
            value,
            source: ConfigSource::ConfigFile,
        },
        (None, None) => ConfigValue {
            value: default(),
            source: ConfigSource::Default,
        },
    }
}

#[allow(dead_code)]
pub fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
    Ok(load_with_report(config_path_override, overrides)?.config)
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path
        .as_deref()
        .map(|path| path.exists())
        .unwrap_or(false);

    let file = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let base_dir = config_path.as_deref().and_then(|path| path.parent());
    let resolve = |raw: Option<String>| raw.map(|raw| resolve_path(&raw, base_dir));

    let state_dir = match overrides.state_dir {
        Some(path) => ConfigValue {
            value: expand_path(path),
            source: ConfigSource::Override,
        },
        None => match resolve(file.state_dir) {
            Some(path) => ConfigValue {
                value: path,
                source: ConfigSource::ConfigFile,
            },
            None => ConfigValue {
                value: default_state_dir().with_context(|| {
                    "failed to resolve default state directory; specify --state-dir or set state_dir in the config file"
                })?,
                source: ConfigSource::Default,
            },
        },
    };
    let token_dir = pick(None, resolve(file.token_dir), || {
        PathBuf::from(DEFAULT_TOKEN_DIR)
    });
    let extra_launch_script = pick(None, resolve(file.extra_launch_script), || {
        PathBuf::from(DEFAULT_EXTRA_LAUNCH_SCRIPT)
    });
    let launch_timeout_secs = pick(
        overrides.launch_timeout_secs,
        file.launch_timeout_secs,
        || DEFAULT_LAUNCH_TIMEOUT_SECS,
    );
    let poll_interval_ms = pick(None, file.poll_interval_ms, || DEFAULT_POLL_INTERVAL_MS);
    let workers = pick(overrides.workers, file.workers, || DEFAULT_WORKERS);
    let node_resolver = pick(None, file.node_resolver, NodeResolverKind::default);
    let run_with_sudo = pick(None, file.run_with_sudo, || false);
    let verbose = pick(overrides.verbose, file.verbose, || false);

    if workers.value == 0 {
        anyhow::bail!("workers must be at least 1");
    }
    if poll_interval_ms.value == 0 {
        anyhow::bail!("poll_interval_ms must be greater than 0");
    }
    let port_range_start = file.port_range_start.unwrap_or(DEFAULT_PORT_RANGE_START);
    let port_range_end = file.port_range_end.unwrap_or(DEFAULT_PORT_RANGE_END);
    if port_range_start == 0 {
        anyhow::bail!("port_range_start must be between 1 and 65535");
    }
    if port_range_start >= port_range_end {
        anyhow::bail!(
            "port_range_start ({port_range_start}) must be below port_range_end ({port_range_end})"
        );
    }

    let fallback = SpawnerSettings::default();
    let defaults = ResourceRequest {
        cpus_per_task: file.cpus_per_task.unwrap_or(fallback.defaults.cpus_per_task),
        mem: file.mem.unwrap_or(fallback.defaults.mem),
        ntasks: file.ntasks.unwrap_or(fallback.defaults.ntasks),
        nodes: file.nodes.unwrap_or(fallback.defaults.nodes),
        partition: file.partition.unwrap_or(fallback.defaults.partition),
        qos: file.qos.unwrap_or(fallback.defaults.qos),
        time: file.time.unwrap_or(fallback.defaults.time),
    };
    let settings = SpawnerSettings {
        job_name: file.job_name.unwrap_or(fallback.job_name),
        output: file.output.unwrap_or(fallback.output),
        defaults,
        extra_launch_script: extra_launch_script.value.clone(),
        run_with_sudo: run_with_sudo.value,
        token_dir: token_dir.value.clone(),
        export_env: file.export_env.unwrap_or(fallback.export_env),
        poll_interval: Duration::from_millis(poll_interval_ms.value),
        launch_timeout: (launch_timeout_secs.value > 0)
            .then(|| Duration::from_secs(launch_timeout_secs.value)),
        workers: workers.value,
        port_range: (port_range_start, port_range_end),
    };

    let config = Config {
        settings,
        node_resolver: node_resolver.value,
        state_dir: state_dir.value.clone(),
        verbose: verbose.value,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        state_dir,
        token_dir,
        extra_launch_script,
        launch_timeout_secs,
        poll_interval_ms,
        workers,
        node_resolver,
        run_with_sudo,
        verbose,
    };

    Ok(LoadResult { config, report })
}

pub fn ensure_state_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create state directory {}", path.display()))
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn default_state_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("failed to resolve data directory")?;
    Ok(base.join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => {
                    // SAFETY: tests serialize env mutations with ENV_LOCK.
                    unsafe {
                        std::env::set_var(self.key, value);
                    }
                }
                None => {
                    // SAFETY: tests serialize env mutations with ENV_LOCK.
                    unsafe {
                        std::env::remove_var(self.key);
                    }
                }
            }
        }
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join("slurm-spawner.toml");
        fs::write(&config_path, contents).unwrap();
        config_path
    }

    #[test]
    fn missing_optional_config_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("missing.toml");
        let cfg = read_config_file(&config_path, false).unwrap();
        assert!(cfg.partition.is_none());
        assert!(cfg.workers.is_none());
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("missing.toml");
        let err = read_config_file(&config_path, true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn empty_file_yields_source_defaults() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "state_dir = \"state\"\n");

        let LoadResult { config, report } =
            load_with_report(Some(config_path), Overrides::default()).unwrap();
        let settings = &config.settings;
        assert_eq!(settings.defaults, ResourceRequest::default());
        assert_eq!(settings.job_name, "spawner-jupyterhub-singleuser");
        assert_eq!(settings.token_dir, PathBuf::from("/tmp/jupyter"));
        assert_eq!(settings.export_env, vec!["JPY_API_TOKEN".to_string()]);
        assert_eq!(settings.poll_interval, Duration::from_millis(1000));
        assert_eq!(settings.launch_timeout, Some(Duration::from_secs(600)));
        assert_eq!(settings.port_range, (49152, 65535));
        assert_eq!(config.node_resolver, NodeResolverKind::HostCommand);
        assert_eq!(report.workers.source, ConfigSource::Default);
        assert_eq!(report.state_dir.source, ConfigSource::ConfigFile);
    }

    #[test]
    fn reads_operator_options_and_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            r#"
partition = "gpu"
mem = 8000
time = "2-00:00:00"
cpus_per_task = 4
qos = "high"
extra_launch_script = "extra.sh"
token_dir = "tokens"
state_dir = "~/spawner-state"
run_with_sudo = true
node_resolver = "dns"
export_env = ["JPY_API_TOKEN", "JUPYTERHUB_API_URL"]
"#,
        );
        let config_dir = config_path.parent().unwrap().to_path_buf();

        let config = load(Some(config_path), Overrides::default()).unwrap();
        let settings = &config.settings;
        assert_eq!(settings.defaults.partition, "gpu");
        assert_eq!(settings.defaults.mem, 8000);
        assert_eq!(settings.defaults.cpus_per_task, 4);
        assert_eq!(settings.defaults.ntasks, 1);
        assert_eq!(settings.extra_launch_script, config_dir.join("extra.sh"));
        assert_eq!(settings.token_dir, config_dir.join("tokens"));
        assert!(!config.state_dir.starts_with("~"));
        assert!(settings.run_with_sudo);
        assert_eq!(config.node_resolver, NodeResolverKind::Dns);
        assert_eq!(settings.export_env.len(), 2);
    }

    #[test]
    fn overrides_apply_per_field() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(
            &dir,
            "state_dir = \"state\"\nworkers = 4\nlaunch_timeout_secs = 30\n",
        );

        let LoadResult { config, report } = load_with_report(
            Some(config_path),
            Overrides {
                state_dir: None,
                launch_timeout_secs: Some(5),
                workers: None,
                verbose: Some(true),
            },
        )
        .unwrap();

        assert_eq!(config.settings.workers, 4);
        assert_eq!(report.workers.source, ConfigSource::ConfigFile);
        assert_eq!(config.settings.launch_timeout, Some(Duration::from_secs(5)));
        assert_eq!(report.launch_timeout_secs.source, ConfigSource::Override);
        assert!(config.verbose);
    }

    #[test]
    fn state_dir_override_takes_precedence() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "state_dir = \"from-config\"\n");

        let config = load(
            Some(config_path),
            Overrides {
                state_dir: Some(PathBuf::from("from-flag")),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(config.state_dir, PathBuf::from("from-flag"));
    }

    #[test]
    fn zero_launch_timeout_disables_deadline() {
        let dir = TempDir::new().unwrap();
        let config_path = write_config(&dir, "state_dir = \"s\"\nlaunch_timeout_secs = 0\n");
        let config = load(Some(config_path), Overrides::default()).unwrap();
        assert_eq!(config.settings.launch_timeout, None);
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        for body in [
            "state_dir = \"s\"\nworkers = 0\n",
            "state_dir = \"s\"\nport_range_start = 0\n",
            "state_dir = \"s\"\nport_range_start = 9000\nport_range_end = 9000\n",
            "state_dir = \"s\"\npoll_interval_ms = 0\n",
            "state_dir = \"s\"\nnode_resolver = \"ldap\"\n",
            "state_dir = \"s\"\nunknown_key = 1\n",
        ] {
            let config_path = write_config(&dir, body);
            assert!(
                load(Some(config_path), Overrides::default()).is_err(),
                "accepted {body:?}"
            );
        }
    }

    #[test]
    fn ensure_state_dir_creates_directory() {
        let dir = TempDir::new().unwrap();
        let state = dir.path().join("nested").join("state");
        ensure_state_dir(&state).unwrap();
        assert!(state.is_dir());
    }

    #[test]
    fn env_config_path_used_when_no_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("slurm-spawner.toml");
        fs::write(&config_path, "state_dir = \"s\"\nworkers = 3\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, config_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(config.settings.workers, 3);
        assert_eq!(config.config_path, Some(config_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn cli_config_path_takes_precedence_over_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("env.toml");
        let cli_path = dir.path().join("cli.toml");
        fs::write(&env_path, "state_dir = \"s\"\nworkers = 3\n").unwrap();
        fs::write(&cli_path, "state_dir = \"s\"\nworkers = 5\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, env_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(Some(cli_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.settings.workers, 5);
        assert_eq!(config.config_path, Some(cli_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Override));
    }

    #[test]
    fn empty_env_config_path_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, "");
        assert!(load_with_report(None, Overrides::default()).is_err());
    }
}
