//! Sliding-window rate limiting for auth flows.
//!
//! Attempts are kept as millisecond timestamps per key, pruned to the
//! configured window on every read. State is process-local only; nothing is
//! persisted or shared across instances.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Upper bound on distinct keys kept in memory. Once reached, fully expired
/// keys are swept and, if needed, the stalest key is evicted.
const MAX_TRACKED_KEYS: usize = 4096;

#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub max_attempts: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
        }
    }
}

/// In-memory sliding-window limiter, shared across handlers via `Mutex`.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_attempts: usize,
    window_ms: u64,
    attempts: Mutex<HashMap<String, Vec<u64>>>,
}

impl SlidingWindowLimiter {
    /// Degenerate configs are clamped to the smallest valid values so a
    /// misconfigured limiter can never disable limiting outright.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let max_attempts = config.max_attempts.max(1);
        let window_ms = u64::try_from(config.window.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);

        if max_attempts != config.max_attempts || config.window.as_millis() == 0 {
            warn!(
                max_attempts,
                window_ms, "Rate limit config clamped to minimum valid values"
            );
        }

        Self {
            max_attempts,
            window_ms,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Check-and-record: returns `true` when the key is over the limit.
    ///
    /// A rejected attempt is not recorded, so hammering a limited key does
    /// not push the reset time further out.
    pub fn is_rate_limited(&self, key: &str) -> bool {
        self.check_at(key, now_ms())
    }

    /// Attempts left in the current window. Does not consume an attempt.
    pub fn remaining_attempts(&self, key: &str) -> usize {
        self.remaining_at(key, now_ms())
    }

    /// Time until the oldest recorded attempt leaves the window. Zero when
    /// the key has no live attempts.
    pub fn time_until_reset(&self, key: &str) -> Duration {
        self.reset_at(key, now_ms())
    }

    /// Unconditionally forget a key.
    pub fn clear(&self, key: &str) {
        let mut attempts = lock_attempts(&self.attempts);
        attempts.remove(key);
    }

    fn check_at(&self, key: &str, now: u64) -> bool {
        let mut attempts = lock_attempts(&self.attempts);

        match attempts.get_mut(key) {
            Some(log) => {
                log.retain(|&at| now.saturating_sub(at) < self.window_ms);

                if log.len() >= self.max_attempts {
                    return true;
                }

                log.push(now);
            }
            None => {
                if attempts.len() >= MAX_TRACKED_KEYS {
                    evict(&mut attempts, now, self.window_ms);
                }
                attempts.insert(key.to_string(), vec![now]);
            }
        }

        false
    }

    fn remaining_at(&self, key: &str, now: u64) -> usize {
        let mut attempts = lock_attempts(&self.attempts);

        let Some(log) = attempts.get_mut(key) else {
            return self.max_attempts;
        };

        log.retain(|&at| now.saturating_sub(at) < self.window_ms);

        self.max_attempts.saturating_sub(log.len())
    }

    fn reset_at(&self, key: &str, now: u64) -> Duration {
        let mut attempts = lock_attempts(&self.attempts);

        let Some(log) = attempts.get_mut(key) else {
            return Duration::ZERO;
        };

        // Prune here as well, a stale oldest entry would over-report the
        // remaining time.
        log.retain(|&at| now.saturating_sub(at) < self.window_ms);

        let Some(&oldest) = log.iter().min() else {
            return Duration::ZERO;
        };

        Duration::from_millis(self.window_ms.saturating_sub(now.saturating_sub(oldest)))
    }
}

/// Drop keys whose attempts have all expired; if none qualified, evict the
/// key whose most recent attempt is oldest.
fn evict(attempts: &mut HashMap<String, Vec<u64>>, now: u64, window_ms: u64) {
    let before = attempts.len();
    attempts.retain(|_, log| log.iter().any(|&at| now.saturating_sub(at) < window_ms));

    if attempts.len() < before {
        debug!(swept = before - attempts.len(), "Swept expired rate-limit keys");
        return;
    }

    let stalest = attempts
        .iter()
        .map(|(key, log)| (key.clone(), log.iter().max().copied().unwrap_or(0)))
        .min_by_key(|(_, newest)| *newest);

    if let Some((key, _)) = stalest {
        warn!(key, "Rate limiter at capacity, evicting stalest key");
        attempts.remove(&key);
    }
}

fn lock_attempts(
    attempts: &Mutex<HashMap<String, Vec<u64>>>,
) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u64>>> {
    // A poisoned lock only means another handler panicked mid-update; the
    // map itself is still a valid attempt log.
    attempts.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000_000;

    fn limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn admits_up_to_max_then_limits() {
        let limiter = limiter();

        for attempt in 0..5 {
            assert!(
                !limiter.check_at("k", NOW + attempt),
                "attempt {attempt} should be admitted"
            );
        }

        assert!(limiter.check_at("k", NOW + 5));
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = limiter();

        for _ in 0..5 {
            assert!(!limiter.check_at("k", NOW));
        }
        assert!(limiter.check_at("k", NOW + 1));

        // One past the window, all previous attempts are pruned.
        assert!(!limiter.check_at("k", NOW + 60_001));
    }

    #[test]
    fn rejected_attempts_are_not_recorded() {
        let limiter = limiter();

        for _ in 0..5 {
            limiter.check_at("k", NOW);
        }

        for _ in 0..10 {
            assert!(limiter.check_at("k", NOW + 1));
        }

        assert_eq!(limiter.remaining_at("k", NOW + 1), 0);
        // The rejected attempts did not extend the window.
        assert!(!limiter.check_at("k", NOW + 60_001));
    }

    #[test]
    fn same_millisecond_attempts_count_individually() {
        let limiter = limiter();

        for _ in 0..5 {
            assert!(!limiter.check_at("k", NOW));
        }
        assert!(limiter.check_at("k", NOW));
    }

    #[test]
    fn remaining_attempts_does_not_consume() {
        let limiter = limiter();

        assert_eq!(limiter.remaining_at("k", NOW), 5);
        assert_eq!(limiter.remaining_at("k", NOW), 5);

        limiter.check_at("k", NOW);
        limiter.check_at("k", NOW);

        assert_eq!(limiter.remaining_at("k", NOW), 3);
        assert_eq!(limiter.remaining_at("k", NOW), 3);
    }

    #[test]
    fn clear_resets_fully() {
        let limiter = limiter();

        for _ in 0..5 {
            limiter.check_at("k", NOW);
        }
        assert_eq!(limiter.remaining_at("k", NOW), 0);

        limiter.clear("k");

        assert_eq!(limiter.remaining_at("k", NOW), 5);
        assert!(!limiter.check_at("k", NOW));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter();

        for _ in 0..5 {
            limiter.check_at("a", NOW);
        }
        assert!(limiter.check_at("a", NOW));

        assert!(!limiter.check_at("b", NOW));
        assert_eq!(limiter.remaining_at("b", NOW), 4);
    }

    #[test]
    fn time_until_reset_tracks_oldest_live_attempt() {
        let limiter = limiter();

        assert_eq!(limiter.reset_at("k", NOW), Duration::ZERO);

        limiter.check_at("k", NOW);
        limiter.check_at("k", NOW + 10_000);

        assert_eq!(
            limiter.reset_at("k", NOW + 20_000),
            Duration::from_millis(40_000)
        );
    }

    #[test]
    fn time_until_reset_prunes_stale_entries() {
        let limiter = limiter();

        limiter.check_at("k", NOW);
        limiter.check_at("k", NOW + 30_000);

        // The first attempt has left the window; the reset time follows the
        // surviving one instead of over-reporting from stale data.
        assert_eq!(
            limiter.reset_at("k", NOW + 61_000),
            Duration::from_millis(29_000)
        );

        // All attempts expired.
        assert_eq!(limiter.reset_at("k", NOW + 120_000), Duration::ZERO);
    }

    #[test]
    fn capacity_sweeps_expired_keys() {
        let limiter = limiter();

        for i in 0..MAX_TRACKED_KEYS {
            limiter.check_at(&format!("k{i}"), NOW);
        }

        // Well past the window, the next unseen key sweeps the expired ones.
        assert!(!limiter.check_at("fresh", NOW + 120_000));

        let attempts = lock_attempts(&limiter.attempts);
        assert_eq!(attempts.len(), 1);
        assert!(attempts.contains_key("fresh"));
    }

    #[test]
    fn capacity_evicts_stalest_live_key() {
        let limiter = limiter();

        limiter.check_at("oldest", NOW);
        for i in 1..MAX_TRACKED_KEYS {
            limiter.check_at(&format!("k{i}"), NOW + 1);
        }

        // Everything is still inside the window, so the key with the oldest
        // most recent attempt goes first.
        assert!(!limiter.check_at("fresh", NOW + 2));

        let attempts = lock_attempts(&limiter.attempts);
        assert!(!attempts.contains_key("oldest"));
        assert!(attempts.contains_key("fresh"));
    }

    #[test]
    fn degenerate_config_is_clamped() {
        let limiter = SlidingWindowLimiter::new(RateLimitConfig {
            max_attempts: 0,
            window: Duration::ZERO,
        });

        assert!(!limiter.check_at("k", NOW));
        assert!(limiter.check_at("k", NOW));
    }
}
