// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::collections::HashMap;
use std::sync::Mutex;

use rand::Rng;

use crate::app::errors::{AppError, AppErrorKind, AppResult, codes};

const RANDOM_ATTEMPTS: usize = 64;

/// Listen ports held by live job records, keyed by owner.
#[derive(Debug)]
pub struct PortRegistry {
    start: u16,
    end: u16,
    held: Mutex<HashMap<u16, String>>,
}

impl PortRegistry {
    /// Ports are drawn from `start..end`.
    pub fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            held: Mutex::new(HashMap::new()),
        }
    }

    /// Picks a random free port for `owner`, releasing whatever it held before.
    pub fn reserve(&self, owner: &str) -> AppResult<u16> {
        let mut held = self.lock()?;
        held.retain(|_, holder| holder != owner);
        if self.start >= self.end {
            return Err(exhausted(self.start, self.end));
        }

        let mut rng = rand::rng();
        for _ in 0..RANDOM_ATTEMPTS {
            let port = rng.random_range(self.start..self.end);
            if !held.contains_key(&port) {
                held.insert(port, owner.to_string());
                return Ok(port);
            }
        }
        let port = (self.start..self.end)
            .find(|port| !held.contains_key(port))
            .ok_or_else(|| exhausted(self.start, self.end))?;
        held.insert(port, owner.to_string());
        Ok(port)
    }

    /// Records a port adopted from the scheduler or from persisted state.
    pub fn claim(&self, owner: &str, port: u16) {
        if let Ok(mut held) = self.lock() {
            held.retain(|_, holder| holder != owner);
            if let Some(previous) = held.insert(port, owner.to_string()) {
                if previous != owner {
                    tracing::warn!("port {port} was held by {previous}, now claimed by {owner}");
                }
            }
        }
    }

    pub fn release(&self, owner: &str) {
        if let Ok(mut held) = self.lock() {
            held.retain(|_, holder| holder != owner);
        }
    }

    pub fn holder(&self, port: u16) -> Option<String> {
        self.lock().ok().and_then(|held| held.get(&port).cloned())
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<u16, String>>> {
        self.held.lock().map_err(|_| {
            AppError::with_message(
                AppErrorKind::Internal,
                codes::INTERNAL_ERROR,
                "port registry lock poisoned",
            )
        })
    }
}

fn exhausted(start: u16, end: u16) -> AppError {
    AppError::with_message(
        AppErrorKind::Internal,
        codes::INTERNAL_ERROR,
        format!("no free listen port in {start}..{end}"),
    )
}
