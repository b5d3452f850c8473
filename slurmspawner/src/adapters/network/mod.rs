// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};
use crate::app::ports::{NodeResolverPort, SchedulerExecPort};
use crate::app::services::slurm;

mod net;

fn unresolved(node: &str, detail: impl std::fmt::Display) -> AppError {
    AppError::with_message(
        AppErrorKind::NodeUnavailable,
        codes::NODE_UNAVAILABLE,
        format!("could not resolve node {node}: {detail}"),
    )
}

/// Resolves node names with the `host` utility, as the cluster's DNS sees them.
#[derive(Clone)]
pub struct HostCommandResolver {
    exec: Arc<dyn SchedulerExecPort>,
}

impl HostCommandResolver {
    pub fn new(exec: Arc<dyn SchedulerExecPort>) -> Self {
        Self { exec }
    }
}

#[async_trait]
impl NodeResolverPort for HostCommandResolver {
    #[tracing::instrument(name = "resolve", level = "debug", skip(self))]
    async fn resolve_node_addr(&self, node_name: &str) -> AppResult<IpAddr> {
        let capture = self
            .exec
            .exec_capture(&slurm::host_lookup_command(node_name), None)
            .await?;
        let output = capture.text();
        tracing::debug!("host lookup output: {output}");
        slurm::parse_host_lookup(&output).ok_or_else(|| {
            if output.is_empty() {
                unresolved(node_name, capture.stderr_text())
            } else {
                unresolved(node_name, output)
            }
        })
    }
}

/// Resolves node names through the system resolver.
#[derive(Clone, Default)]
pub struct DnsResolver;

impl DnsResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NodeResolverPort for DnsResolver {
    #[tracing::instrument(name = "resolve", level = "debug", skip(self))]
    async fn resolve_node_addr(&self, node_name: &str) -> AppResult<IpAddr> {
        net::lookup_node_addr(node_name)
            .await
            .map_err(|err| unresolved(node_name, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::ExecCapture;
    use std::net::Ipv4Addr;

    struct CannedHost(&'static str);

    #[async_trait]
    impl SchedulerExecPort for CannedHost {
        async fn exec_capture(&self, command: &str, _stdin: Option<&str>) -> AppResult<ExecCapture> {
            assert_eq!(command, "host 'node01'");
            Ok(ExecCapture {
                stdout: self.0.as_bytes().to_vec(),
                ..ExecCapture::default()
            })
        }
    }

    #[tokio::test]
    async fn host_command_takes_address_token() {
        let resolver = HostCommandResolver::new(Arc::new(CannedHost(
            "node01.cluster has address 10.0.0.5\n",
        )));
        let addr = resolver.resolve_node_addr("node01").await.unwrap();
        assert_eq!(addr, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[tokio::test]
    async fn host_command_without_address_is_node_unavailable() {
        let resolver = HostCommandResolver::new(Arc::new(CannedHost(
            "Host node01 not found: 3(NXDOMAIN)",
        )));
        let err = resolver.resolve_node_addr("node01").await.unwrap_err();
        assert_eq!(err.kind(), AppErrorKind::NodeUnavailable);
    }

    #[tokio::test]
    async fn dns_resolver_resolves_localhost() {
        let addr = DnsResolver::new().resolve_node_addr("localhost").await.unwrap();
        assert!(addr.is_loopback());
    }
}
