// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error as ThisError;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{IdentityPort, SchedulerExecPort};
use crate::app::services::shell::sh_escape;
use crate::app::types::OwnerIdentity;

#[derive(ThisError, Debug, PartialEq, Eq)]
pub enum PasswdParseError {
    #[error("passwd entry has {0} fields, expected 7")]
    FieldCount(usize),
    #[error("passwd entry has a non-numeric {0}")]
    NotANumber(&'static str),
}

/// Parses one `name:passwd:uid:gid:gecos:home:shell` line.
pub fn parse_passwd_entry(line: &str) -> Result<OwnerIdentity, PasswdParseError> {
    let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(':').collect();
    if fields.len() != 7 {
        return Err(PasswdParseError::FieldCount(fields.len()));
    }
    let uid = fields[2]
        .parse::<u32>()
        .map_err(|_| PasswdParseError::NotANumber("uid"))?;
    let gid = fields[3]
        .parse::<u32>()
        .map_err(|_| PasswdParseError::NotANumber("gid"))?;
    Ok(OwnerIdentity {
        name: fields[0].to_string(),
        uid,
        gid,
        home: PathBuf::from(fields[5]),
    })
}

/// Looks owners up in the hub host's account database via `getent passwd`.
#[derive(Clone)]
pub struct GetentIdentity {
    exec: Arc<dyn SchedulerExecPort>,
}

impl GetentIdentity {
    pub fn new(exec: Arc<dyn SchedulerExecPort>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl IdentityPort for GetentIdentity {
    #[tracing::instrument(name = "identity", level = "debug", skip(self))]
    async fn lookup_owner(&self, name: &str) -> AppResult<OwnerIdentity> {
        let capture = self
            .exec
            .exec_capture(&format!("getent passwd {}", sh_escape(name)), None)
            .await?;
        let entry = capture.text();
        if !capture.success() || entry.is_empty() {
            return Err(AppError::with_message(
                AppErrorKind::NotFound,
                codes::NOT_FOUND,
                format!("no account found for user {name}"),
            ));
        }
        let line = entry.lines().next().unwrap_or_default();
        parse_passwd_entry(line).map_err(|err| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::LOCAL_ERROR,
                format!("account entry for {name} is malformed: {err}"),
            )
        })
    }
}
