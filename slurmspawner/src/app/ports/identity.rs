// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;

use crate::app::errors::AppResult;
use crate::app::types::OwnerIdentity;

#[async_trait]
/// Resolves an owner name to numeric ids and home directory.
pub trait IdentityPort: Send + Sync {
    async fn lookup_owner(&self, name: &str) -> AppResult<OwnerIdentity>;
}
