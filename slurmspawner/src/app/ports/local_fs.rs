// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::Path;

use async_trait::async_trait;

use crate::app::errors::AppResult;

#[async_trait]
/// Local filesystem boundary for the core.
/// Reads the admin launch snippet and persists admission tokens.
pub trait LocalFilesystemPort: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    async fn read_optional(&self, path: &Path) -> AppResult<Option<String>>;
    async fn ensure_dir(&self, dir: &Path) -> AppResult<()>;
    /// Creates or truncates `path` and writes `contents`.
    async fn write_truncate(&self, path: &Path, contents: &str) -> AppResult<()>;
}
