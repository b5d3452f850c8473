// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::types::PersistedState;

/// Per-owner JSON files holding what a host would persist between restarts.
#[derive(Debug, Clone)]
pub struct StateFiles {
    dir: PathBuf,
}

impl StateFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, owner: &str) -> AppResult<PathBuf> {
        if owner.is_empty() || owner.starts_with('.') || owner.contains(['/', '\\']) {
            return Err(AppError::with_message(
                AppErrorKind::InvalidArgument,
                codes::INVALID_ARGUMENT,
                format!("'{owner}' is not a usable user name"),
            ));
        }
        Ok(self.dir.join(format!("{owner}.json")))
    }

    pub fn load(&self, owner: &str) -> AppResult<PersistedState> {
        let path = self.path_for(owner)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(PersistedState::default()),
            Err(err) => return Err(local_error("read", &path, err)),
        };
        serde_json::from_str(&raw).map_err(|err| local_error("parse", &path, err))
    }

    /// Writes the state, or removes the file once nothing is left to remember.
    pub fn save(&self, owner: &str, state: &PersistedState) -> AppResult<()> {
        let path = self.path_for(owner)?;
        if state.slurm_job_id.is_none() {
            return match std::fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                Err(err) => Err(local_error("remove", &path, err)),
            };
        }
        let body = serde_json::to_string_pretty(state)
            .map_err(|err| local_error("encode", &path, err))?;
        std::fs::write(&path, body).map_err(|err| local_error("write", &path, err))
    }
}

fn local_error(action: &str, path: &Path, err: impl std::fmt::Display) -> AppError {
    AppError::with_message(
        AppErrorKind::Internal,
        codes::LOCAL_ERROR,
        format!("failed to {action} state file {}: {err}", path.display()),
    )
}
