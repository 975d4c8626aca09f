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

//! # PlexSpaces Redlock
//!
//! ## Purpose
//! Distributed mutual-exclusion locks over multiple independent Redis-like
//! instances, implementing the Redlock algorithm: a lock is held when the
//! same key carries the same owner token on a majority of instances, and
//! only for the drift-adjusted remainder of its TTL.
//!
//! ## Architecture Context
//! The quorum protocol lives in [`Mutex`] and knows nothing about sockets.
//! It fans three logical commands out to every [`LockInstance`]:
//! conditional set-if-absent with expiry, compare-and-delete, and
//! compare-and-reset-expiry; the latter two run server-side as single
//! atomic scripts. Instances are bound once in a [`Redlock`] factory and
//! shared read-only by every mutex derived from it.
//!
//! ## Design Decisions
//! - **Quorum over errors**: instance failures are never surfaced; every
//!   command collapses to a boolean and only the count of confirmations
//!   decides the outcome
//! - **Token-guarded mutation**: a 32-byte CSPRNG token proves ownership,
//!   so a release or extend can never touch a peer's lock
//! - **Drift-aware validity**: the usable window is the TTL minus the
//!   acquisition round-trip, a configurable clock-drift allowance, and a
//!   2ms safety margin
//! - **Best-effort rollback**: a failed attempt deletes its partial
//!   acquisitions instead of letting them block contenders for a full TTL
//!
//! ## Backend Support
//! - **Memory**: in-process emulation with fault injection (feature:
//!   `memory-backend`, for testing)
//! - **Redis**: `redis` crate with async connection manager and cached
//!   guard scripts (feature: `redis-backend`)
//!
//! ## Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use plexspaces_redlock::redis::RedisLockInstance;
//! use plexspaces_redlock::{LockInstance, Redlock};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut instances: Vec<Arc<dyn LockInstance>> = Vec::new();
//! for url in ["redis://10.0.0.1", "redis://10.0.0.2", "redis://10.0.0.3"] {
//!     instances.push(Arc::new(RedisLockInstance::new(url).await?));
//! }
//! let redlock = Redlock::new(instances);
//!
//! let mutex = redlock.new_mutex("orders:reconcile");
//! mutex.acquire().await?;
//! // ... critical section, bounded by mutex.valid_until() ...
//! mutex.release().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod factory;
pub mod instance;
pub mod mutex;

#[cfg(feature = "memory-backend")]
pub mod memory;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use error::{RedlockError, RedlockResult};
pub use factory::{LockOptions, Redlock};
pub use instance::LockInstance;
pub use mutex::Mutex;
