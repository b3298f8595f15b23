//! Global request pacing and per-DOI cooldowns.
//!
//! One [`RateLimiter`] is shared by every lookup and search in the process.
//! Time comes from a [`Clock`] so tests can drive the limiter without real
//! sleeps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use paperlog_core::RateLimitConfig;

use crate::identifiers::Doi;

// ─── Clock ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock: time only moves when a caller sleeps or the test
/// calls [`ManualClock::advance`]. Every sleep is recorded.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ManualState::default()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.lock().elapsed += by;
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().elapsed
    }

    async fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

// ─── RateLimiter ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub min_global_interval: Duration,
    pub per_doi_cooldown: Duration,
    pub rate_limit_penalty: Duration,
    pub first_lookup_delay: Duration,
    pub ledger_capacity: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimitSettings {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            min_global_interval: Duration::from_millis(config.min_global_interval_ms),
            per_doi_cooldown: Duration::from_secs(config.per_doi_cooldown_secs),
            rate_limit_penalty: Duration::from_secs(config.rate_limit_penalty_secs),
            first_lookup_delay: Duration::from_millis(config.first_lookup_delay_ms),
            ledger_capacity: config.ledger_capacity.max(1),
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    /// Earliest instant the next batch may start.
    next_slot: Option<Instant>,
    /// Last accepted claim per DOI.
    claims: HashMap<Doi, Instant>,
}

pub struct RateLimiter {
    clock: Arc<dyn Clock>,
    settings: RateLimitSettings,
    ledger: Mutex<Ledger>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            settings,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn with_system_clock(settings: RateLimitSettings) -> Self {
        Self::new(settings, Arc::new(SystemClock))
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Record a lookup of `doi` unless one was accepted within the cooldown
    /// window. Check and write happen under one lock, so of two concurrent
    /// callers exactly one wins.
    pub fn claim(&self, doi: &Doi) -> bool {
        let now = self.clock.now();
        let cooldown = self.settings.per_doi_cooldown;
        let capacity = self.settings.ledger_capacity.max(1);
        let mut ledger = self.lock();

        if let Some(last) = ledger.claims.get(doi)
            && now.saturating_duration_since(*last) < cooldown
        {
            tracing::debug!(%doi, "lookup rejected: cooling down");
            return false;
        }

        if !ledger.claims.contains_key(doi) && ledger.claims.len() >= capacity {
            ledger
                .claims
                .retain(|_, at| now.saturating_duration_since(*at) < cooldown);
            let oldest = ledger
                .claims
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(doi, _)| doi.clone());
            if ledger.claims.len() >= capacity
                && let Some(oldest) = oldest
            {
                ledger.claims.remove(&oldest);
            }
        }

        ledger.claims.insert(doi.clone(), now);
        true
    }

    /// Move the claim on `doi` to now, so its cooldown counts from when the
    /// batch actually starts rather than from when the caller queued.
    pub fn restamp(&self, doi: &Doi) {
        let now = self.clock.now();
        if let Some(at) = self.lock().claims.get_mut(doi) {
            *at = now;
        }
    }

    /// Wait for this caller's global slot. The slot is reserved before
    /// sleeping, so concurrent callers are released in arrival order, each at
    /// least `min_global_interval` after the previous one.
    pub async fn acquire_global(&self) {
        let wait = {
            let now = self.clock.now();
            let mut ledger = self.lock();
            let slot = ledger.next_slot.map_or(now, |next| next.max(now));
            ledger.next_slot = Some(slot + self.settings.min_global_interval);
            slot.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "waiting for global slot");
            self.clock.sleep(wait).await;
        }
    }

    /// Push the next global slot back after an upstream answered 429.
    pub fn penalize(&self) {
        let now = self.clock.now();
        let penalty = self.settings.rate_limit_penalty;
        let mut ledger = self.lock();
        let base = ledger.next_slot.map_or(now, |next| next.max(now));
        ledger.next_slot = Some(base + penalty);
        tracing::warn!(penalty_secs = penalty.as_secs(), "upstream rate limit, backing off");
    }

    /// Short pause before the first network lookup of a DOI the store has
    /// never seen.
    pub async fn first_lookup_pause(&self) {
        let delay = self.settings.first_lookup_delay;
        if !delay.is_zero() {
            self.clock.sleep(delay).await;
        }
    }

    pub fn ledger_len(&self) -> usize {
        self.lock().claims.len()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
