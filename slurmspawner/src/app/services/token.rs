// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Admission token handed to the scheduler-side job_submit policy.
//!
//! The token is the sum of the decimal digits of the listen port. It proves
//! only that the port was chosen by code that ran this writer; it carries no
//! secret.

use std::path::{Path, PathBuf};

use crate::app::errors::{AppError, AppResult};
use crate::app::ports::LocalFilesystemPort;

pub fn port_checksum(port: u16) -> String {
    port.to_string()
        .chars()
        .filter_map(|c| c.to_digit(10))
        .sum::<u32>()
        .to_string()
}

/// `<token_dir>/<uid>`
pub fn token_path(token_dir: &Path, uid: u32) -> PathBuf {
    token_dir.join(uid.to_string())
}

/// Overwrites the owner's token file with the checksum of `port`.
pub async fn write_token(
    fs: &dyn LocalFilesystemPort,
    token_dir: &Path,
    uid: u32,
    port: u16,
) -> AppResult<PathBuf> {
    fs.ensure_dir(token_dir).await.map_err(|err| {
        AppError::token_write(format!(
            "failed to create token directory {}: {}",
            token_dir.display(),
            err.message()
        ))
    })?;
    let path = token_path(token_dir, uid);
    fs.write_truncate(&path, &port_checksum(port))
        .await
        .map_err(|err| {
            AppError::token_write(format!(
                "error opening token file '{}' for writing: {}",
                path.display(),
                err.message()
            ))
        })?;
    tracing::debug!("wrote admission token for uid {uid} to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fs::LocalFilesystem;
    use crate::app::errors::AppErrorKind;
    use tempfile::TempDir;

    #[test]
    fn checksum_sums_port_digits() {
        assert_eq!(port_checksum(9123), "15");
        assert_eq!(port_checksum(1), "1");
        assert_eq!(port_checksum(65535), "24");
        assert_eq!(port_checksum(10000), "1");
    }

    #[tokio::test]
    async fn write_token_creates_directory_and_file() {
        let dir = TempDir::new().unwrap();
        let token_dir = dir.path().join("jupyter");
        let fs = LocalFilesystem::new();

        let path = write_token(&fs, &token_dir, 1001, 9123).await.unwrap();
        assert_eq!(path, token_dir.join("1001"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "15");
    }

    #[tokio::test]
    async fn write_token_is_deterministic_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();

        let path = write_token(&fs, dir.path(), 7, 65535).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        write_token(&fs, dir.path(), 7, 65535).await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);

        write_token(&fs, dir.path(), 7, 10).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
    }

    #[tokio::test]
    async fn unwritable_directory_is_token_write_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let fs = LocalFilesystem::new();

        let err = write_token(&fs, &blocker, 7, 9123).await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::TokenWrite);
    }
}
