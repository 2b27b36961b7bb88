//! Rate limiting for external API calls and chat sends.
//!
//! Each target key has a minimum interval between granted reservations.
//! A reservation claims the next free slot under a short lock and then sleeps
//! outside of it, so callers on the same key are granted in arrival order and
//! never overlap, while other keys are never held up.
//!
//! Quota-metered targets can additionally track cumulative usage per window.
//! Quota is advisory: crossing the warning ratio or the limit is reported to
//! the caller, but never blocks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{trace, warn};

/// Well-known target keys.
pub mod keys {
    /// Twitch Helix REST API.
    pub const TWITCH_API: &str = "twitch-api";
    /// YouTube Data API.
    pub const YOUTUBE_API: &str = "youtube-api";
    /// Outbound Twitch chat messages.
    pub const TWITCH_CHAT: &str = "chat:twitch";
}

/// Usage ceiling for a quota-metered target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuotaConfig {
    /// Units allowed per window.
    pub limit: u64,
    /// Fraction of `limit` at which a warning is reported.
    pub warn_ratio: f64,
    /// Length of a usage window.
    pub window: Duration,
}

impl QuotaConfig {
    /// A daily quota with the default 80% warning threshold.
    pub fn daily(limit: u64) -> Self {
        Self {
            limit,
            warn_ratio: 0.8,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Result of recording usage against a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum QuotaStatus {
    /// No quota configured for the key.
    Untracked,
    Within { used: u64, limit: u64 },
    Warning { used: u64, limit: u64 },
    Exceeded { used: u64, limit: u64 },
}

impl QuotaStatus {
    /// Whether the caller should surface a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, QuotaStatus::Warning { .. } | QuotaStatus::Exceeded { .. })
    }
}

#[derive(Debug)]
struct QuotaState {
    config: QuotaConfig,
    used: u64,
    window_start: Instant,
}

impl QuotaState {
    fn status(&self) -> QuotaStatus {
        let (used, limit) = (self.used, self.config.limit);
        if used > limit {
            QuotaStatus::Exceeded { used, limit }
        } else if used as f64 >= limit as f64 * self.config.warn_ratio {
            QuotaStatus::Warning { used, limit }
        } else {
            QuotaStatus::Within { used, limit }
        }
    }

    fn roll_window(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.config.window {
            self.used = 0;
            self.window_start = now;
        }
    }
}

/// Per-target minimum-interval gate with optional quota tracking.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Interval for keys without an explicit one.
    default_interval: Duration,
    /// Key-specific intervals.
    intervals: Arc<RwLock<HashMap<String, Duration>>>,
    /// Last granted slot per key.
    grants: Arc<Mutex<HashMap<String, Instant>>>,
    /// Quota usage per key.
    quotas: Arc<Mutex<HashMap<String, QuotaState>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl RateLimiter {
    /// Create a limiter with a default interval for unconfigured keys.
    pub fn new(default_interval: Duration) -> Self {
        Self {
            default_interval,
            intervals: Arc::new(RwLock::new(HashMap::new())),
            grants: Arc::new(Mutex::new(HashMap::new())),
            quotas: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Set the minimum interval between grants for a key.
    pub fn set_interval(&self, key: &str, interval: Duration) {
        self.intervals.write().insert(key.to_string(), interval);
    }

    /// Builder form of [`set_interval`](Self::set_interval).
    pub fn with_interval(self, key: &str, interval: Duration) -> Self {
        self.set_interval(key, interval);
        self
    }

    pub fn interval(&self, key: &str) -> Duration {
        self.intervals
            .read()
            .get(key)
            .copied()
            .unwrap_or(self.default_interval)
    }

    /// Wait until `key` may be used again, then return how long we waited.
    ///
    /// # Cancel Safety
    ///
    /// The slot is claimed before sleeping. Dropping the future leaves the
    /// limiter consistent, but the claimed slot stays consumed, so later
    /// callers are still spaced from it.
    pub async fn reserve(&self, key: &str) -> Duration {
        let interval = self.interval(key);
        let now = Instant::now();

        let slot = {
            let mut grants = self.grants.lock();
            let slot = match grants.get(key) {
                Some(last) => (*last + interval).max(now),
                None => now,
            };
            grants.insert(key.to_string(), slot);
            slot
        }; // Lock released before sleeping

        let wait = slot.saturating_duration_since(now);
        if !wait.is_zero() {
            trace!(key = %key, wait = ?wait, "rate limited");
            tokio::time::sleep_until(slot).await;
        }
        wait
    }

    /// Configure quota tracking for a key. Resets any current usage.
    pub fn set_quota(&self, key: &str, config: QuotaConfig) {
        self.quotas.lock().insert(
            key.to_string(),
            QuotaState {
                config,
                used: 0,
                window_start: Instant::now(),
            },
        );
    }

    /// Record `units` of usage. Never blocks; reports where usage now stands.
    pub fn record_usage(&self, key: &str, units: u64) -> QuotaStatus {
        let mut quotas = self.quotas.lock();
        let Some(state) = quotas.get_mut(key) else {
            return QuotaStatus::Untracked;
        };

        state.roll_window(Instant::now());
        let before = state.status();
        state.used = state.used.saturating_add(units);
        let after = state.status();

        match after {
            QuotaStatus::Warning { used, limit } if !before.is_warning() => {
                warn!(key = %key, used, limit, "API quota usage crossed warning threshold");
            }
            QuotaStatus::Exceeded { used, limit }
                if !matches!(before, QuotaStatus::Exceeded { .. }) =>
            {
                warn!(key = %key, used, limit, "API quota exceeded");
            }
            _ => {}
        }

        after
    }

    /// Current quota standing without recording usage.
    pub fn quota_status(&self, key: &str) -> QuotaStatus {
        let mut quotas = self.quotas.lock();
        match quotas.get_mut(key) {
            Some(state) => {
                state.roll_window(Instant::now());
                state.status()
            }
            None => QuotaStatus::Untracked,
        }
    }
}

#[async_trait]
impl chat_link::SendGate for RateLimiter {
    async fn reserve(&self, key: &str) {
        RateLimiter::reserve(self, key).await;
    }
}
