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

//! Factory binding an instance set to mutex construction.

use crate::instance::LockInstance;
use crate::mutex::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Per-mutex configuration.
///
/// The closed set of user-tunable knobs; quorum and the instance list are
/// fixed at factory construction and not overridable per mutex.
#[derive(Debug, Clone, PartialEq)]
pub struct LockOptions {
    /// Lock TTL set on acquire and on extend.
    pub expiry: Duration,
    /// Maximum acquisition attempts before giving up.
    pub tries: u32,
    /// Sleep between acquisition attempts.
    pub retry_delay: Duration,
    /// Fraction of the expiry subtracted as clock-drift allowance.
    pub drift_factor: f64,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(8),
            tries: 32,
            retry_delay: Duration::from_millis(500),
            drift_factor: 0.01,
        }
    }
}

/// Factory for distributed mutexes sharing one instance set.
///
/// ## Purpose
/// Captures the fan-out set once and hands out [`Mutex`] values that share
/// it by reference. The quorum is fixed at the majority of the instance
/// count.
///
/// ## Examples
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use plexspaces_redlock::memory::MemoryLockInstance;
/// use plexspaces_redlock::{LockInstance, LockOptions, Redlock};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let instances: Vec<Arc<dyn LockInstance>> = (0..5)
///     .map(|_| Arc::new(MemoryLockInstance::new()) as Arc<dyn LockInstance>)
///     .collect();
/// let redlock = Redlock::new(instances);
///
/// let mutex = redlock.new_mutex_with(
///     "scheduler:lease",
///     LockOptions {
///         expiry: Duration::from_secs(2),
///         ..Default::default()
///     },
/// );
/// mutex.acquire().await?;
/// # Ok(())
/// # }
/// ```
pub struct Redlock {
    instances: Arc<[Arc<dyn LockInstance>]>,
    quorum: usize,
}

impl Redlock {
    /// Create a factory over the given instance set.
    ///
    /// The quorum is `N/2 + 1` where `N` is the instance count.
    pub fn new(instances: Vec<Arc<dyn LockInstance>>) -> Self {
        let quorum = instances.len() / 2 + 1;
        Self {
            instances: instances.into(),
            quorum,
        }
    }

    /// Create a mutex for `name` with default options.
    pub fn new_mutex(&self, name: impl Into<String>) -> Mutex {
        self.new_mutex_with(name, LockOptions::default())
    }

    /// Create a mutex for `name` with explicit options.
    pub fn new_mutex_with(&self, name: impl Into<String>, options: LockOptions) -> Mutex {
        Mutex::new(name.into(), options, self.quorum, Arc::clone(&self.instances))
    }

    /// Number of instances in the fan-out set.
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Minimum successful instances required for a lock decision.
    pub fn quorum(&self) -> usize {
        self.quorum
    }
}

impl std::fmt::Debug for Redlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redlock")
            .field("instances", &self.instances.len())
            .field("quorum", &self.quorum)
            .finish()
    }
}
