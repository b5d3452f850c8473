// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::BTreeMap;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::services::shell::{sh_double_quote, sh_quote_if_needed};
use crate::app::types::{LaunchSpec, OwnerIdentity};

pub const PORT_PLACEHOLDER: &str = "{port}";

/// The host environment plus the owner's `USER` and `HOME`.
pub fn owner_environment(
    env: &BTreeMap<String, String>,
    owner: &OwnerIdentity,
) -> BTreeMap<String, String> {
    let mut out = env.clone();
    out.insert("USER".to_string(), owner.name.clone());
    out.insert(
        "HOME".to_string(),
        owner.home.to_string_lossy().into_owned(),
    );
    out
}

/// Builds `export K="v" ...;cmd args...`.
///
/// The first `;` separates the export prefix from the server command, so no
/// exported value may contain one.
pub fn compose_command_line(
    launch: &LaunchSpec,
    owner: &OwnerIdentity,
    export_keys: &[String],
    port: u16,
) -> AppResult<String> {
    if launch.cmd.is_empty() {
        return Err(invalid_argument("launch command is empty"));
    }
    let env = owner_environment(&launch.env, owner);

    let mut keys: Vec<&str> = vec!["USER", "HOME"];
    for key in export_keys {
        if !keys.contains(&key.as_str()) {
            keys.push(key.as_str());
        }
    }

    let mut assignments = Vec::with_capacity(keys.len());
    for key in keys {
        let value = env
            .get(key)
            .ok_or_else(|| invalid_argument(format!("launch environment is missing {key}")))?;
        if value.contains(';') {
            return Err(invalid_argument(format!(
                "exported variable {key} must not contain ';'"
            )));
        }
        assignments.push(format!("{key}={}", sh_double_quote(value)));
    }

    let port = port.to_string();
    let words: Vec<String> = launch
        .cmd
        .iter()
        .chain(launch.args.iter())
        .map(|word| sh_quote_if_needed(&word.replace(PORT_PLACEHOLDER, &port)))
        .collect();

    Ok(format!("export {};{}", assignments.join(" "), words.join(" ")))
}

fn invalid_argument(message: impl Into<String>) -> AppError {
    AppError::with_message(
        AppErrorKind::InvalidArgument,
        codes::INVALID_ARGUMENT,
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn alice() -> OwnerIdentity {
        OwnerIdentity {
            name: "alice".to_string(),
            uid: 1001,
            gid: 100,
            home: PathBuf::from("/home/alice"),
        }
    }

    fn server_launch() -> LaunchSpec {
        LaunchSpec {
            cmd: vec!["jupyterhub-singleuser".to_string()],
            args: vec!["--port={port}".to_string(), "--ip=0.0.0.0".to_string()],
            env: BTreeMap::from([("JPY_API_TOKEN".to_string(), "abc123".to_string())]),
        }
    }

    #[test]
    fn composes_export_prefix_and_command() {
        let line =
            compose_command_line(&server_launch(), &alice(), &["JPY_API_TOKEN".to_string()], 9123)
                .unwrap();
        assert_eq!(
            line,
            "export USER=\"alice\" HOME=\"/home/alice\" JPY_API_TOKEN=\"abc123\";jupyterhub-singleuser --port=9123 --ip=0.0.0.0"
        );
        let (prefix, command) = line.split_once(';').unwrap();
        assert!(prefix.starts_with("export "));
        assert!(command.starts_with("jupyterhub-singleuser"));
    }

    #[test]
    fn missing_export_key_is_rejected() {
        let err = compose_command_line(&server_launch(), &alice(), &["MISSING".to_string()], 9123)
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);
        assert!(err.message().contains("MISSING"));
    }

    #[test]
    fn exported_value_with_separator_is_rejected() {
        let mut launch = server_launch();
        launch.env
            .insert("JPY_API_TOKEN".to_string(), "a;b".to_string());
        let err = compose_command_line(&launch, &alice(), &["JPY_API_TOKEN".to_string()], 1)
            .unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_command_is_rejected() {
        let launch = LaunchSpec::default();
        assert!(compose_command_line(&launch, &alice(), &[], 1).is_err());
    }

    #[test]
    fn owner_environment_overrides_user_and_home() {
        let env = BTreeMap::from([("USER".to_string(), "root".to_string())]);
        let env = owner_environment(&env, &alice());
        assert_eq!(env.get("USER").map(String::as_str), Some("alice"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/alice"));
    }
}
