// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-process challenge store.
//!
//! Every read-modify cycle on a challenge happens inside one mutex-guarded
//! critical section: two concurrent verifies for the same id can never both
//! flip the used flag, and the sweeper cannot delete an entry out from
//! under a verifier that already acquired the lock. Challenges never
//! survive a restart.

use clnp_core::challenge::{Challenge, Mode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Used challenges stay queryable for ten minutes, then vanish.
pub const USED_RETENTION_MS: u64 = 600_000;
/// Unused challenges linger one minute past expiry so late submissions see
/// a clean 410 instead of a 404.
pub const EXPIRED_GRACE_MS: u64 = 60_000;
pub const SWEEP_INTERVAL_MS: u64 = 30_000;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|v| v.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
struct StoredChallenge {
    challenge: Challenge,
    used: bool,
    used_at_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    NotFound,
    WrongMode,
    AlreadyUsed,
    Expired,
}

pub struct ChallengeStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<String, StoredChallenge>>,
}

impl ChallengeStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, challenge: Challenge) {
        self.inner.lock().insert(
            challenge.id.clone(),
            StoredChallenge {
                challenge,
                used: false,
                used_at_ms: None,
            },
        );
    }

    /// Unused, unexpired challenges awaiting a submission.
    pub fn pending_count(&self) -> usize {
        let now = self.clock.now_ms();
        self.inner
            .lock()
            .values()
            .filter(|entry| !entry.used && now <= entry.challenge.expires_at_ms)
            .count()
    }

    /// Read-only validation ladder: exists → mode → used → expired. An
    /// expired entry is consumed on sight so it cannot be retried.
    pub fn peek(&self, id: &str, expected_mode: Mode) -> Result<Challenge, StoreError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let entry = inner.get_mut(id).ok_or(StoreError::NotFound)?;
        if entry.challenge.mode != expected_mode {
            return Err(StoreError::WrongMode);
        }
        if entry.used {
            return Err(StoreError::AlreadyUsed);
        }
        if now > entry.challenge.expires_at_ms {
            entry.used = true;
            entry.used_at_ms = Some(now);
            return Err(StoreError::Expired);
        }
        Ok(entry.challenge.clone())
    }

    /// Compare-and-set of the used flag. The winner of a race gets the
    /// challenge; every other caller observes `AlreadyUsed`.
    pub fn consume(&self, id: &str) -> Result<Challenge, StoreError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let entry = inner.get_mut(id).ok_or(StoreError::NotFound)?;
        if entry.used {
            return Err(StoreError::AlreadyUsed);
        }
        entry.used = true;
        entry.used_at_ms = Some(now);
        if now > entry.challenge.expires_at_ms {
            return Err(StoreError::Expired);
        }
        Ok(entry.challenge.clone())
    }

    /// Evicts used challenges past the retention window and unused ones
    /// past expiry plus grace. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|_, entry| {
            if entry.used {
                entry
                    .used_at_ms
                    .map(|at| now < at + USED_RETENTION_MS)
                    .unwrap_or(false)
            } else {
                now < entry.challenge.expires_at_ms + EXPIRED_GRACE_MS
            }
        });
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clnp_core::challenge;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::sync::atomic::{AtomicU64, Ordering};

    pub struct FixedClock {
        now: AtomicU64,
    }

    impl FixedClock {
        pub fn new(initial: u64) -> Self {
            Self {
                now: AtomicU64::new(initial),
            }
        }

        pub fn set(&self, value: u64) {
            self.now.store(value, Ordering::Relaxed);
        }
    }

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.now.load(Ordering::Relaxed)
        }
    }

    fn setup() -> (Arc<FixedClock>, ChallengeStore, String) {
        let clock = Arc::new(FixedClock::new(1_000));
        let store = ChallengeStore::new(clock.clone());
        let ch = challenge::standalone(&mut ChaCha8Rng::seed_from_u64(1), 1_000, 180_000);
        let id = ch.id.clone();
        store.insert(ch);
        (clock, store, id)
    }

    #[test]
    fn consume_is_single_use() {
        let (_, store, id) = setup();
        assert!(store.consume(&id).is_ok());
        assert!(matches!(
            store.consume(&id),
            Err(StoreError::AlreadyUsed)
        ));
        assert!(matches!(
            store.peek(&id, Mode::Standalone),
            Err(StoreError::AlreadyUsed)
        ));
    }

    #[test]
    fn concurrent_consumers_cannot_both_win() {
        let (_, store, id) = setup();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = id.clone();
            handles.push(std::thread::spawn(move || store.consume(&id).is_ok()));
        }
        let wins = handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn expired_peek_consumes_the_challenge() {
        let (clock, store, id) = setup();
        clock.set(1_000 + 180_001);
        assert!(matches!(
            store.peek(&id, Mode::Standalone),
            Err(StoreError::Expired)
        ));
        // A retry now reports used, not expired.
        assert!(matches!(
            store.peek(&id, Mode::Standalone),
            Err(StoreError::AlreadyUsed)
        ));
    }

    #[test]
    fn wrong_mode_is_detected_before_use_state() {
        let (_, store, id) = setup();
        assert!(matches!(
            store.peek(&id, Mode::Embed),
            Err(StoreError::WrongMode)
        ));
        // Mode check never consumes.
        assert!(store.peek(&id, Mode::Standalone).is_ok());
    }

    #[test]
    fn sweeper_honors_retention_windows() {
        let (clock, store, id) = setup();
        store.consume(&id).ok();
        clock.set(1_000 + USED_RETENTION_MS - 1);
        assert_eq!(store.sweep(), 0);
        clock.set(1_000 + USED_RETENTION_MS + 1);
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn unused_challenges_evict_after_expiry_grace() {
        let (clock, store, _) = setup();
        clock.set(1_000 + 180_000 + EXPIRED_GRACE_MS - 1);
        assert_eq!(store.sweep(), 0);
        clock.set(1_000 + 180_000 + EXPIRED_GRACE_MS + 1);
        assert_eq!(store.sweep(), 1);
    }

    #[test]
    fn pending_count_excludes_used_and_expired() {
        let (clock, store, id) = setup();
        assert_eq!(store.pending_count(), 1);
        let other = challenge::standalone(&mut ChaCha8Rng::seed_from_u64(2), 1_000, 180_000);
        store.insert(other);
        store.consume(&id).ok();
        assert_eq!(store.pending_count(), 1);
        clock.set(400_000);
        assert_eq!(store.pending_count(), 0);
    }
}
