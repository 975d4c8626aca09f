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

//! Distributed mutex implementing the Redlock quorum protocol.

use crate::error::{RedlockError, RedlockResult};
use crate::factory::LockOptions;
use crate::instance::LockInstance;
use base64::{engine::general_purpose, Engine as _};
use futures::future::join_all;
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Token size before base64 encoding. CSPRNG output of this width makes a
/// token collision between contenders vanishingly unlikely, which is what
/// the compare-and-delete guard relies on.
const TOKEN_BYTES: usize = 32;

/// Safety margin subtracted from every validity window on top of the drift
/// allowance, covering sub-millisecond timing noise.
const VALIDITY_MARGIN: Duration = Duration::from_millis(2);

/// A distributed mutual-exclusion lock over a set of independent Redis-like
/// instances.
///
/// ## Purpose
/// Establishes ownership of a named key on a quorum of instances with a
/// unique per-acquire token and a TTL, computes the drift-adjusted validity
/// window, and releases or extends ownership under the token guard.
///
/// ## Concurrency
/// Thread-safe at mutex granularity: every public operation holds an
/// internal async guard for its full duration, so two operations on the
/// same `Mutex` serialize. Distinct `Mutex` values are independent.
///
/// ## Limitations
/// - Not reentrant: acquiring an already-held mutex from the same process
///   is undefined (the fresh token would orphan the previous one).
/// - No fairness between contenders.
/// - A process restart loses the token; the keys then expire on their own.
pub struct Mutex {
    name: String,
    expiry: Duration,
    tries: u32,
    retry_delay: Duration,
    drift_factor: f64,
    quorum: usize,
    instances: Arc<[Arc<dyn LockInstance>]>,
    held: tokio::sync::Mutex<HeldState>,
}

/// Owner state, meaningful only between a successful acquire and the next
/// release.
#[derive(Default)]
struct HeldState {
    token: Option<String>,
    valid_until: Option<Instant>,
}

impl Mutex {
    pub(crate) fn new(
        name: String,
        options: LockOptions,
        quorum: usize,
        instances: Arc<[Arc<dyn LockInstance>]>,
    ) -> Self {
        Self {
            name,
            expiry: options.expiry,
            tries: options.tries,
            retry_delay: options.retry_delay,
            drift_factor: options.drift_factor,
            quorum,
            instances,
            held: tokio::sync::Mutex::new(HeldState::default()),
        }
    }

    /// Acquire the lock.
    ///
    /// ## Behavior
    /// Generates a fresh random token, then attempts up to the configured
    /// number of tries (sleeping the retry delay between attempts) to SET
    /// the key on a quorum of instances. An attempt commits only if quorum
    /// was reached *and* the drift-adjusted validity window is still open;
    /// otherwise the partial acquisition is rolled back with token-guarded
    /// deletes before the next attempt.
    ///
    /// ## Returns
    /// - `Ok(())`: lock held; [`valid_until`](Self::valid_until) gives the
    ///   deadline until which ownership may be assumed
    /// - `Err(RedlockError::RandomnessUnavailable)`: no token bytes
    /// - `Err(RedlockError::AcquireFailed)`: retry budget exhausted
    pub async fn acquire(&self) -> RedlockResult<()> {
        let mut held = self.held.lock().await;
        let token = generate_token()?;

        for attempt in 0..self.tries {
            if attempt != 0 {
                tokio::time::sleep(self.retry_delay).await;
            }

            let start = Instant::now();
            let confirmed = self.set_all(&token).await;
            let elapsed = start.elapsed();

            if confirmed >= self.quorum {
                if let Some(deadline) = self.validity_deadline(start, elapsed) {
                    if deadline > Instant::now() {
                        debug!(
                            key = %self.name,
                            attempt,
                            instances = confirmed,
                            quorum = self.quorum,
                            "lock acquired"
                        );
                        held.token = Some(token);
                        held.valid_until = Some(deadline);
                        return Ok(());
                    }
                }
                debug!(
                    key = %self.name,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "validity window closed before commit"
                );
            }

            // Partial acquisitions would block contenders for a full TTL;
            // delete them by token. No peer can hold the same token.
            self.delete_all(&token).await;
        }

        warn!(
            key = %self.name,
            tries = self.tries,
            "lock acquisition failed: retry budget exhausted"
        );
        Err(RedlockError::AcquireFailed {
            name: self.name.clone(),
            tries: self.tries,
        })
    }

    /// Release the lock.
    ///
    /// ## Behavior
    /// Fans out a token-guarded delete to every instance. The local held
    /// state is cleared regardless of the outcome, so a second release
    /// observes no token and returns `false` without touching any instance.
    /// The validity deadline is not consulted: a release after local expiry
    /// is still correct because the compare-and-delete guards ownership.
    ///
    /// ## Returns
    /// `true` iff a quorum of instances confirmed the delete. A `false`
    /// does not mean the lock is still held by this process; any keys left
    /// behind expire on their own.
    pub async fn release(&self) -> bool {
        let mut held = self.held.lock().await;
        let token = match held.token.take() {
            Some(token) => token,
            None => return false,
        };
        held.valid_until = None;

        let confirmed = self.delete_all(&token).await;
        if confirmed >= self.quorum {
            debug!(key = %self.name, instances = confirmed, "lock released");
            true
        } else {
            warn!(
                key = %self.name,
                instances = confirmed,
                quorum = self.quorum,
                "release quorum not reached; remaining keys will expire"
            );
            false
        }
    }

    /// Extend the lock's expiry.
    ///
    /// ## Behavior
    /// Fans out a token-guarded expiry reset to every instance. The reset
    /// uses `XX` semantics on the instance side, so a key that already
    /// expired is never resurrected. On a quorum-met extend the validity
    /// deadline is refreshed with the same drift-adjusted formula as
    /// acquire, measured around this fan-out; on failure it is untouched.
    ///
    /// ## Returns
    /// `true` iff a quorum of instances confirmed the reset.
    pub async fn extend(&self) -> bool {
        let mut held = self.held.lock().await;
        let token = match held.token.as_ref() {
            Some(token) => token.clone(),
            None => return false,
        };

        let start = Instant::now();
        let confirmed = self.pexpire_all(&token).await;
        let elapsed = start.elapsed();

        if confirmed < self.quorum {
            warn!(
                key = %self.name,
                instances = confirmed,
                quorum = self.quorum,
                "extend quorum not reached"
            );
            return false;
        }

        if let Some(deadline) = self.validity_deadline(start, elapsed) {
            held.valid_until = Some(deadline);
        }
        debug!(key = %self.name, instances = confirmed, "lock extended");
        true
    }

    /// The lock's key name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this mutex currently holds an owner token.
    ///
    /// Local state only; the token may already have expired on the
    /// instances. Compare [`valid_until`](Self::valid_until) against now
    /// before relying on ownership.
    pub async fn is_held(&self) -> bool {
        self.held.lock().await.token.is_some()
    }

    /// Deadline until which ownership may safely be assumed, if held.
    pub async fn valid_until(&self) -> Option<Instant> {
        self.held.lock().await.valid_until
    }

    /// Validity deadline for an attempt that started at `start` and whose
    /// fan-out took `elapsed`:
    /// `start + expiry - elapsed - drift_factor * expiry - 2ms`.
    /// `None` means the window already closed.
    fn validity_deadline(&self, start: Instant, elapsed: Duration) -> Option<Instant> {
        let drift = self.expiry.mul_f64(self.drift_factor);
        let window = self.expiry.checked_sub(elapsed + drift + VALIDITY_MARGIN)?;
        Some(start + window)
    }

    fn expiry_ms(&self) -> u64 {
        self.expiry.as_millis() as u64
    }

    async fn set_all(&self, token: &str) -> usize {
        let replies = join_all(
            self.instances
                .iter()
                .map(|instance| instance.try_set_nx_px(&self.name, token, self.expiry_ms())),
        )
        .await;
        replies.into_iter().filter(|ok| *ok).count()
    }

    async fn delete_all(&self, token: &str) -> usize {
        let replies = join_all(
            self.instances
                .iter()
                .map(|instance| instance.compare_and_delete(&self.name, token)),
        )
        .await;
        replies.into_iter().filter(|ok| *ok).count()
    }

    async fn pexpire_all(&self, token: &str) -> usize {
        let replies = join_all(
            self.instances
                .iter()
                .map(|instance| instance.compare_and_pexpire(&self.name, token, self.expiry_ms())),
        )
        .await;
        replies.into_iter().filter(|ok| *ok).count()
    }
}

impl std::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutex")
            .field("name", &self.name)
            .field("expiry", &self.expiry)
            .field("tries", &self.tries)
            .field("retry_delay", &self.retry_delay)
            .field("drift_factor", &self.drift_factor)
            .field("quorum", &self.quorum)
            .field("instances", &self.instances.len())
            .finish()
    }
}

/// Generate a fresh owner token: 32 CSPRNG bytes, standard base64.
fn generate_token() -> RedlockResult<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| RedlockError::RandomnessUnavailable(e.to_string()))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_32_bytes_base64() {
        let token = generate_token().unwrap();
        let decoded = general_purpose::STANDARD.decode(&token).unwrap();
        assert_eq!(decoded.len(), TOKEN_BYTES);
    }

    #[test]
    fn test_token_uniqueness() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100_000 {
            assert!(seen.insert(generate_token().unwrap()));
        }
    }
}
