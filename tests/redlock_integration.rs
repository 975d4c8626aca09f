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

//! Redlock mutex integration tests over in-memory instances.
//!
//! These tests verify:
//! - Quorum acquisition, release, and extension across five instances
//! - Rollback of partial acquisitions on failed attempts
//! - The drift-adjusted validity window
//! - Token-guarded deletes under contention
//! - Extension behavior when an instance lost its key

#[cfg(feature = "memory-backend")]
mod tests {
    use plexspaces_redlock::memory::MemoryLockInstance;
    use plexspaces_redlock::{LockInstance, LockOptions, Redlock, RedlockError};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Five shared-handle in-memory instances plus a factory over them.
    fn cluster(n: usize) -> (Vec<MemoryLockInstance>, Redlock) {
        let nodes: Vec<MemoryLockInstance> = (0..n).map(|_| MemoryLockInstance::new()).collect();
        let redlock = Redlock::new(
            nodes
                .iter()
                .map(|node| Arc::new(node.clone()) as Arc<dyn LockInstance>)
                .collect(),
        );
        (nodes, redlock)
    }

    fn options(expiry_ms: u64, tries: u32, retry_delay_ms: u64) -> LockOptions {
        LockOptions {
            expiry: Duration::from_millis(expiry_ms),
            tries,
            retry_delay: Duration::from_millis(retry_delay_ms),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_happy_path_acquire_and_release() {
        let (nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex_with("jobs:report", options(1000, 1, 50));

        mutex.acquire().await.unwrap();
        assert!(mutex.is_held().await);

        // Every instance carries the same owner token.
        let token = nodes[0].value_of("jobs:report").await.unwrap();
        for node in &nodes {
            assert_eq!(node.value_of("jobs:report").await.as_deref(), Some(token.as_str()));
        }

        // Validity window is the TTL shrunk by drift allowance, margin, and
        // the acquisition round-trip: strictly below expiry − 1% − 2ms.
        let valid_until = mutex.valid_until().await.unwrap();
        assert!(valid_until > Instant::now());
        assert!(valid_until <= Instant::now() + Duration::from_millis(988));

        assert!(mutex.release().await);
        assert!(!mutex.is_held().await);
        for node in &nodes {
            assert!(node.value_of("jobs:report").await.is_none());
        }
    }

    #[tokio::test]
    async fn test_minority_failure_still_acquires() {
        let (nodes, redlock) = cluster(5);
        nodes[0].set_unavailable(true).await;
        nodes[1].set_unavailable(true).await;

        let mutex = redlock.new_mutex_with("jobs:compact", options(1000, 1, 50));
        mutex.acquire().await.unwrap();

        for node in &nodes[2..] {
            assert!(node.value_of("jobs:compact").await.is_some());
        }
        assert!(mutex.release().await);
    }

    #[tokio::test]
    async fn test_majority_failure_then_retry_succeeds() {
        let (nodes, redlock) = cluster(5);
        for node in &nodes[2..] {
            node.set_unavailable(true).await;
        }

        // Heal the majority while the first attempt's retry sleep runs.
        let healer: Vec<MemoryLockInstance> = nodes[2..].to_vec();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            for node in &healer {
                node.set_unavailable(false).await;
            }
        });

        let mutex = redlock.new_mutex_with("jobs:rollup", options(1000, 3, 150));
        mutex.acquire().await.unwrap();

        // The failed first attempt rolled back with a token-guarded delete
        // fanned out to every instance.
        for node in &nodes {
            assert!(node.delete_calls().await >= 1);
        }
        assert!(mutex.release().await);
    }

    #[tokio::test]
    async fn test_validity_window_closed_rejects_and_rolls_back() {
        let (nodes, redlock) = cluster(5);
        for node in &nodes {
            node.set_latency(Some(Duration::from_millis(1200))).await;
        }

        let mutex = redlock.new_mutex_with("jobs:slow", options(1000, 1, 50));
        let result = mutex.acquire().await;
        assert!(matches!(result, Err(RedlockError::AcquireFailed { .. })));
        assert!(!mutex.is_held().await);

        for node in &nodes {
            assert_eq!(node.delete_calls().await, 1);
            assert!(node.value_of("jobs:slow").await.is_none());
        }
    }

    #[tokio::test]
    async fn test_contention_has_exactly_one_winner() {
        let (nodes, redlock) = cluster(5);
        let first = redlock.new_mutex_with("jobs:exclusive", options(10_000, 1, 50));
        let second = redlock.new_mutex_with("jobs:exclusive", options(10_000, 1, 50));

        let (a, b) = tokio::join!(first.acquire(), second.acquire());
        assert!(a.is_ok() != b.is_ok(), "exactly one contender must win");

        // The loser rolled back, so every remaining key carries the winner's
        // token, and at least a quorum of instances carry it.
        let mut values = Vec::new();
        for node in &nodes {
            if let Some(value) = node.value_of("jobs:exclusive").await {
                values.push(value);
            }
        }
        assert!(values.len() >= 3);
        assert!(values.windows(2).all(|pair| pair[0] == pair[1]));

        let winner = if a.is_ok() { &first } else { &second };
        assert!(winner.release().await);
    }

    #[tokio::test]
    async fn test_extend_survives_one_evicted_instance() {
        let (nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex_with("jobs:lease", options(10_000, 1, 50));
        mutex.acquire().await.unwrap();

        // Instance 3 evicted the key on its own.
        nodes[2].purge("jobs:lease").await;

        assert!(mutex.extend().await);
        assert!(nodes[2].value_of("jobs:lease").await.is_none());

        // A contender reaches only the evicted instance: no quorum, and its
        // rollback leaves that instance free again.
        let contender = redlock.new_mutex_with("jobs:lease", options(10_000, 1, 50));
        let result = contender.acquire().await;
        assert!(matches!(result, Err(RedlockError::AcquireFailed { .. })));
        assert!(nodes[2].value_of("jobs:lease").await.is_none());

        // The holder still commands a quorum.
        assert!(mutex.extend().await);
        assert!(mutex.release().await);
    }

    #[tokio::test]
    async fn test_extend_refreshes_validity_deadline() {
        let (_nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex_with("jobs:heartbeat", options(1000, 1, 50));
        mutex.acquire().await.unwrap();

        let before = mutex.valid_until().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mutex.extend().await);
        let after = mutex.valid_until().await.unwrap();
        assert!(after > before);

        assert!(mutex.release().await);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex_with("jobs:once", options(10_000, 1, 50));
        mutex.acquire().await.unwrap();

        assert!(mutex.release().await);
        let deletes_after_first = delete_call_counts(&nodes).await;

        // Second release observes no token and touches no instance.
        assert!(!mutex.release().await);
        assert_eq!(delete_call_counts(&nodes).await, deletes_after_first);
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_a_no_op() {
        let (nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex("jobs:never");
        assert!(!mutex.release().await);
        for node in &nodes {
            assert_eq!(node.delete_calls().await, 0);
        }
    }

    #[tokio::test]
    async fn test_extend_without_acquire_is_a_no_op() {
        let (_nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex("jobs:never");
        assert!(!mutex.extend().await);
    }

    #[tokio::test]
    async fn test_mutex_is_reusable_after_release() {
        let (nodes, redlock) = cluster(5);
        let mutex = redlock.new_mutex_with("jobs:cycle", options(10_000, 1, 50));

        mutex.acquire().await.unwrap();
        let first_token = nodes[0].value_of("jobs:cycle").await.unwrap();
        assert!(mutex.release().await);

        mutex.acquire().await.unwrap();
        let second_token = nodes[0].value_of("jobs:cycle").await.unwrap();
        assert_ne!(first_token, second_token);
        assert!(mutex.release().await);
    }

    #[tokio::test]
    async fn test_foreign_token_is_never_released() {
        let (nodes, redlock) = cluster(5);
        let holder = redlock.new_mutex_with("jobs:guarded", options(10_000, 1, 50));
        holder.acquire().await.unwrap();
        let token = nodes[0].value_of("jobs:guarded").await.unwrap();

        // A contender fails and rolls back with its own token; the holder's
        // keys are untouched.
        let contender = redlock.new_mutex_with("jobs:guarded", options(10_000, 1, 50));
        assert!(contender.acquire().await.is_err());
        for node in &nodes {
            assert_eq!(node.value_of("jobs:guarded").await.as_deref(), Some(token.as_str()));
        }

        assert!(holder.release().await);
    }

    async fn delete_call_counts(nodes: &[MemoryLockInstance]) -> Vec<u64> {
        let mut counts = Vec::with_capacity(nodes.len());
        for node in nodes {
            counts.push(node.delete_calls().await);
        }
        counts
    }
}
