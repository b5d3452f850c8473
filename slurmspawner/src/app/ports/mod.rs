// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod identity;
pub mod local_fs;
pub mod network;
pub mod scheduler_exec;
pub mod telemetry;

pub use identity::IdentityPort;
pub use local_fs::LocalFilesystemPort;
pub use network::NodeResolverPort;
pub use scheduler_exec::{ExecCapture, SchedulerExecPort};
pub use telemetry::{NoopTelemetry, TelemetryEvent, TelemetryPort};
