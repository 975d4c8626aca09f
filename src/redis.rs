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

//! Redis-backed lock instance implementation.

use crate::error::RedlockResult;
use crate::instance::LockInstance;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script, Value};
use tracing::{debug, instrument};

/// Token-guarded delete: one GET + conditional DEL, atomic on the server.
const DELETE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end"#;

/// Token-guarded expiry reset. `XX` ensures the reset cannot recreate a key
/// that expired between the GET and the SET.
const PEXPIRE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("SET", KEYS[1], ARGV[1], "XX", "PX", ARGV[2])
else
    return "ERR"
end"#;

/// Redis-backed [`LockInstance`].
///
/// ## Architecture
/// - Uses the `redis` crate with async `ConnectionManager` (automatic
///   reconnection, cheap clones per command)
/// - The two guard scripts are held as [`redis::Script`] objects, so each
///   is compiled once and invoked by SHA afterwards (with automatic reload
///   if the server loses its script cache)
///
/// ## Error Handling
/// Every transport or protocol error collapses into `false`, traced at
/// debug level. The quorum count upstream is the sole correctness oracle,
/// so this boundary never distinguishes "rejected" from "unreachable".
#[derive(Clone)]
pub struct RedisLockInstance {
    manager: ConnectionManager,
    delete_script: Script,
    pexpire_script: Script,
}

impl RedisLockInstance {
    /// Create a lock instance for one Redis endpoint.
    ///
    /// `url` is any valid `redis` crate URL, e.g.:
    /// - `redis://127.0.0.1:6379`
    /// - `redis+tls://host:6379/`
    ///
    /// ## Errors
    /// - [`RedlockError::BackendError`](crate::RedlockError::BackendError):
    ///   if the client cannot be created or the connection cannot be
    ///   established
    #[instrument(skip(url))]
    pub async fn new(url: &str) -> RedlockResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::with_manager(manager))
    }

    /// Create a lock instance over an existing connection manager.
    pub fn with_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            delete_script: Script::new(DELETE_SCRIPT),
            pexpire_script: Script::new(PEXPIRE_SCRIPT),
        }
    }
}

#[async_trait]
impl LockInstance for RedisLockInstance {
    async fn try_set_nx_px(&self, key: &str, token: &str, expiry_ms: u64) -> bool {
        let mut conn = self.manager.clone();
        let reply: redis::RedisResult<Value> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(expiry_ms)
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(Value::Okay) => true,
            Ok(_) => false,
            Err(e) => {
                debug!(key = %key, error = %e, "SET NX PX failed");
                false
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> bool {
        let mut conn = self.manager.clone();
        let reply: redis::RedisResult<i64> = self
            .delete_script
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await;
        match reply {
            Ok(deleted) => deleted != 0,
            Err(e) => {
                debug!(key = %key, error = %e, "compare-and-delete failed");
                false
            }
        }
    }

    async fn compare_and_pexpire(&self, key: &str, token: &str, expiry_ms: u64) -> bool {
        let mut conn = self.manager.clone();
        let reply: redis::RedisResult<Value> = self
            .pexpire_script
            .key(key)
            .arg(token)
            .arg(expiry_ms)
            .invoke_async(&mut conn)
            .await;
        match reply {
            Ok(Value::Okay) => true,
            Ok(_) => false,
            Err(e) => {
                debug!(key = %key, error = %e, "compare-and-pexpire failed");
                false
            }
        }
    }
}
