// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::LocalFilesystemPort;

mod state;

pub use state::StateFiles;

#[derive(Clone, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

fn local_error(action: &str, path: &Path, err: std::io::Error) -> AppError {
    AppError::with_message(
        AppErrorKind::Internal,
        codes::LOCAL_ERROR,
        format!("failed to {action} {}: {err}", path.display()),
    )
}

#[async_trait]
impl LocalFilesystemPort for LocalFilesystem {
    #[tracing::instrument(name = "fs", level = "debug", skip(self, path), fields(op = "read_optional", path = %path.display()))]
    async fn read_optional(&self, path: &Path) -> AppResult<Option<String>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(local_error("read", path, err)),
        }
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, dir), fields(op = "ensure_dir", path = %dir.display()))]
    async fn ensure_dir(&self, dir: &Path) -> AppResult<()> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| local_error("create directory", dir, err))
    }

    #[tracing::instrument(name = "fs", level = "debug", skip(self, path, contents), fields(op = "write_truncate", path = %path.display()))]
    async fn write_truncate(&self, path: &Path, contents: &str) -> AppResult<()> {
        tokio::fs::write(path, contents)
            .await
            .map_err(|err| local_error("write", path, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_optional_distinguishes_missing_files() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let path = dir.path().join("extra_launch_script");

        assert_eq!(fs.read_optional(&path).await.unwrap(), None);
        std::fs::write(&path, "module load python\n").unwrap();
        assert_eq!(
            fs.read_optional(&path).await.unwrap().as_deref(),
            Some("module load python\n")
        );
    }

    #[tokio::test]
    async fn read_optional_reports_other_errors() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let err = fs.read_optional(dir.path()).await.unwrap_err();
        assert_eq!(err.code(), codes::LOCAL_ERROR);
    }

    #[tokio::test]
    async fn write_truncate_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let nested = dir.path().join("a/b");
        fs.ensure_dir(&nested).await.unwrap();
        let path = nested.join("1001");

        fs.write_truncate(&path, "15").await.unwrap();
        fs.write_truncate(&path, "1").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
    }
}
