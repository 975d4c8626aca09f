// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexSpaces.
//
// PlexSpaces is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexSpaces is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexSpaces. If not, see <https://www.gnu.org/licenses/>.

//! In-memory lock instance implementation (for testing).

use crate::instance::LockInstance;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// In-memory emulation of one Redis-like instance (for testing).
///
/// ## Purpose
/// Provides a process-local [`LockInstance`] honoring the same command
/// semantics as a real node: NX + PX on set, token-guarded delete, and a
/// token-guarded expiry reset that never recreates an expired key. Keys
/// expire lazily, the way Redis evicts on access.
///
/// ## Fault Injection
/// - [`set_unavailable`](Self::set_unavailable): every command fails, as if
///   the node were unreachable
/// - [`set_latency`](Self::set_latency): every command stalls first, as if
///   the node were slow
/// - [`purge`](Self::purge): drop a key outright, as if it expired or was
///   evicted server-side
///
/// ## Limitations
/// - Not persistent, not distributed; a test double only.
#[derive(Clone, Default)]
pub struct MemoryLockInstance {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Entry>,
    unavailable: bool,
    latency: Option<Duration>,
    delete_calls: u64,
}

impl MemoryState {
    /// Redis evicts expired keys lazily on access; mirror that here. An
    /// expired key is gone for every command, including the expiry reset.
    fn purge_expired(&mut self, key: &str) {
        if self.entries.get(key).map_or(false, |entry| entry.is_expired()) {
            self.entries.remove(key);
        }
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

impl MemoryLockInstance {
    /// Create a new in-memory instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent command fail (`true`) or behave normally
    /// (`false`).
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    /// Stall every subsequent command by `latency` before it executes.
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.inner.write().await.latency = latency;
    }

    /// Drop `key` outright, simulating server-side expiry or eviction.
    pub async fn purge(&self, key: &str) {
        self.inner.write().await.entries.remove(key);
    }

    /// Current live value of `key`, if present and unexpired.
    pub async fn value_of(&self, key: &str) -> Option<String> {
        let state = self.inner.read().await;
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    /// Number of compare-and-delete commands issued against this instance.
    pub async fn delete_calls(&self) -> u64 {
        self.inner.read().await.delete_calls
    }

    async fn simulate_latency(&self) {
        let latency = self.inner.read().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl LockInstance for MemoryLockInstance {
    async fn try_set_nx_px(&self, key: &str, token: &str, expiry_ms: u64) -> bool {
        self.simulate_latency().await;
        let mut state = self.inner.write().await;
        if state.unavailable {
            return false;
        }
        state.purge_expired(key);
        if state.entries.contains_key(key) {
            return false;
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: token.to_string(),
                expires_at: Instant::now() + Duration::from_millis(expiry_ms),
            },
        );
        true
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> bool {
        self.simulate_latency().await;
        let mut state = self.inner.write().await;
        state.delete_calls += 1;
        if state.unavailable {
            return false;
        }
        state.purge_expired(key);
        let matched = state
            .entries
            .get(key)
            .map_or(false, |entry| entry.value == token);
        if matched {
            state.entries.remove(key);
        }
        matched
    }

    async fn compare_and_pexpire(&self, key: &str, token: &str, expiry_ms: u64) -> bool {
        self.simulate_latency().await;
        let mut state = self.inner.write().await;
        if state.unavailable {
            return false;
        }
        // XX semantics: the purge means an expired key can never be
        // recreated by a reset.
        state.purge_expired(key);
        match state.entries.get_mut(key) {
            Some(entry) if entry.value == token => {
                entry.expires_at = Instant::now() + Duration::from_millis(expiry_ms);
                true
            }
            _ => false,
        }
    }
}
