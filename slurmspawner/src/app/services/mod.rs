// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod launch;
pub mod listen_port;
pub mod resources;
pub mod script;
pub mod shell;
pub mod slurm;
pub mod token;

#[cfg(test)]
mod proptest_resources;
#[cfg(test)]
mod proptest_slurm;
