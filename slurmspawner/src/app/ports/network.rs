// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use async_trait::async_trait;
use std::net::IpAddr;

use crate::app::errors::AppResult;

#[async_trait]
pub trait NodeResolverPort: Send + Sync {
    async fn resolve_node_addr(&self, node_name: &str) -> AppResult<IpAddr>;
}
