// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Job lifecycle engine that runs one interactive notebook server per owner
//! as a Slurm batch job.
//!
//! [`app::usecases::UseCases`] is the engine; hosts obtain a
//! [`app::usecases::SpawnerSession`] per owner and drive it with
//! `start`, `poll` and `stop`.

pub mod adapters;
pub mod app;
pub mod config;
pub mod logging;
