// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use thiserror::Error as ThisError;

use crate::app::types::{ResourceOverrides, ResourceRequest};

pub const MAX_CPUS: i64 = 32;
pub const MAX_TASKS: i64 = 128;
pub const MAX_NODES: i64 = 32;
pub const MAX_WALL_DAYS: u32 = 14;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum WallTimeError {
    #[error("expected days-hours:minutes:seconds, got '{0}'")]
    WrongFormat(String),

    #[error("'{0}' is not a number")]
    NotANumber(String),
}

/// A wall-time limit in `days-hours:minutes:seconds` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallTime {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

pub fn parse_wall_time(raw: &str) -> Result<WallTime, WallTimeError> {
    let raw = raw.trim();
    let wrong_format = || WallTimeError::WrongFormat(raw.to_string());

    let (days, hms) = raw.split_once('-').ok_or_else(wrong_format)?;
    let mut parts = hms.split(':');
    let (hours, minutes, seconds) = (
        parts.next().ok_or_else(wrong_format)?,
        parts.next().ok_or_else(wrong_format)?,
        parts.next().ok_or_else(wrong_format)?,
    );
    if parts.next().is_some() {
        return Err(wrong_format());
    }

    let number = |value: &str| {
        value
            .parse::<u32>()
            .map_err(|_| WallTimeError::NotANumber(value.to_string()))
    };
    Ok(WallTime {
        days: number(days)?,
        hours: number(hours)?,
        minutes: number(minutes)?,
        seconds: number(seconds)?,
    })
}

/// Applies each in-bounds override on top of the operator defaults.
///
/// Out-of-bounds or unparsable values fall back to the default without error.
pub fn select_resources(
    defaults: &ResourceRequest,
    overrides: Option<&ResourceOverrides>,
) -> ResourceRequest {
    let mut selected = defaults.clone();
    let Some(overrides) = overrides else {
        return selected;
    };

    if let Some(memory) = overrides.memory.filter(|m| *m > 0) {
        selected.mem = memory as u64;
    }
    if let Some(cpus) = overrides.cpus.filter(|c| (1..=MAX_CPUS).contains(c)) {
        selected.cpus_per_task = cpus as u32;
    }
    if let Some(tasks) = overrides.tasks.filter(|t| (1..=MAX_TASKS).contains(t)) {
        selected.ntasks = tasks as u32;
    }
    if let Some(nodes) = overrides.nodes.filter(|n| (1..=MAX_NODES).contains(n)) {
        selected.nodes = nodes as u32;
    }
    if let Some(time) = overrides.time.as_deref() {
        match parse_wall_time(time) {
            Ok(wall) if wall.days <= MAX_WALL_DAYS => selected.time = time.trim().to_string(),
            Ok(wall) => {
                tracing::debug!("ignoring wall time {time}: {} days exceeds limit", wall.days)
            }
            Err(err) => tracing::debug!("ignoring wall time override: {err}"),
        }
    }
    selected
}
