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

//! Error types for distributed mutex operations.

use thiserror::Error;

/// Result type for redlock operations.
pub type RedlockResult<T> = Result<T, RedlockError>;

/// Errors that can occur during redlock operations.
///
/// Instance-level failures (transport, timeout, protocol) are deliberately
/// absent: each instance command collapses into a per-operation boolean and
/// the quorum count is the sole correctness oracle.
#[derive(Error, Debug)]
pub enum RedlockError {
    /// The CSPRNG refused to produce token bytes. Not retryable at this layer.
    #[error("randomness unavailable: {0}")]
    RandomnessUnavailable(String),

    /// The retry budget was exhausted without reaching quorum, or every
    /// attempt's validity window closed before commit. Retryable by the caller.
    #[error("failed to acquire lock '{name}': quorum not reached within {tries} tries")]
    AcquireFailed { name: String, tries: u32 },

    /// Backend error while constructing an instance client (connection setup).
    #[error("backend error: {0}")]
    BackendError(String),
}

#[cfg(feature = "redis-backend")]
impl From<redis::RedisError> for RedlockError {
    fn from(err: redis::RedisError) -> Self {
        RedlockError::BackendError(format!("Redis error: {}", err))
    }
}
