// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use crate::app::ports::{TelemetryEvent, TelemetryPort};

#[derive(Clone, Default)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetryPort for TracingTelemetry {
    fn event(&self, name: &'static str, fields: TelemetryEvent) {
        let TelemetryEvent {
            owner,
            job_id,
            port,
            node,
            state,
        } = fields;

        tracing::info!(
            target: "slurmspawner::telemetry",
            event = name,
            owner = owner.as_deref(),
            job_id = job_id.as_deref(),
            port = port,
            node = node.as_deref(),
            state = state.as_deref(),
        );
    }
}
