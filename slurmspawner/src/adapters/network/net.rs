// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::io;
use std::net::IpAddr;

use thiserror::Error as ThisError;
use tokio::net::lookup_host;

#[derive(ThisError, Debug)]
pub enum NetError {
    #[error("DNS name not found for {0}")]
    DnsNotFound(String),

    #[error("couldn't resolve node: {0:?}")]
    Resolve(io::Error),

    #[error("no addresses resolved from {0}")]
    NoAddrs(String),
}

/// First address the system resolver returns for `node`.
pub async fn lookup_node_addr(node: &str) -> Result<IpAddr, NetError> {
    let mut addrs = lookup_host((node, 0)).await.map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => NetError::DnsNotFound(node.to_owned()),
        _ => NetError::Resolve(e),
    })?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| NetError::NoAddrs(node.to_owned()))
}
