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

//! Per-instance command executor trait.

use async_trait::async_trait;

/// Trait for the three commands the mutex issues against one Redis-like
/// key/value endpoint.
///
/// ## Purpose
/// Decouples the quorum protocol from the wire protocol: the mutex fans
/// these commands out to every instance and counts `true` replies. The
/// implementation owns its connection source and exposes no state.
///
/// ## Error Handling
/// Every operation returns a plain boolean. Transport errors, timeouts,
/// and negative replies all collapse into `false`; the caller's
/// correctness depends only on the quorum count, not on distinguishing
/// "rejected" from "unreachable".
///
/// ## Atomicity
/// `compare_and_delete` and `compare_and_pexpire` MUST execute server-side
/// as a single atomic unit (Lua script or an engine primitive with the same
/// guarantee). A client-side read-then-write emulation breaks the token
/// guard under concurrency.
#[async_trait]
pub trait LockInstance: Send + Sync {
    /// Set `key = token` only if the key does not already exist, with a
    /// millisecond expiry.
    ///
    /// ## Returns
    /// `true` iff the instance confirmed the write ("OK").
    async fn try_set_nx_px(&self, key: &str, token: &str, expiry_ms: u64) -> bool;

    /// Atomically delete `key` iff its current value equals `token`.
    ///
    /// Equivalent to the script:
    /// `GET k; if == arg1 then DEL k else 0`
    ///
    /// ## Returns
    /// `true` iff the key existed with a matching token and was deleted.
    async fn compare_and_delete(&self, key: &str, token: &str) -> bool;

    /// Atomically reset the expiry of `key` to `expiry_ms` iff its current
    /// value equals `token`.
    ///
    /// Equivalent to the script:
    /// `GET k; if == arg1 then SET k arg1 XX PX arg2 else "ERR"`
    ///
    /// The `XX` ensures the reset cannot recreate a key that expired between
    /// the GET and the SET; only an unexpired owner can extend.
    ///
    /// ## Returns
    /// `true` iff the token matched and the expiry was reset.
    async fn compare_and_pexpire(&self, key: &str, token: &str, expiry_ms: u64) -> bool;
}
