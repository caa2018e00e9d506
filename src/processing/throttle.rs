//! Proactive throughput gate shared by every call to one backend.
//!
//! Rate-limit retries react to rejections; this gate tries to avoid them. A backend may
//! declare a tokens-per-minute budget (a token bucket that is allowed to go into debt, so
//! callers queue in arrival order) and/or a fixed minimum spacing between calls. The gate
//! lives on the service, so every chunk of every concurrent document draws from the same
//! budget.

use crate::config::ThroughputLimits;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tiktoken_rs::cl100k_base;
use tokio::time::{Instant, sleep, sleep_until};

/// Counts tokens in a prompt.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Gate awaited before each backend call.
pub struct ThroughputGate {
    bucket: Option<Mutex<TokenBucket>>,
    spacing: Option<CallSpacing>,
    token_counter: TokenCounter,
    max_output_tokens: u32,
}

impl ThroughputGate {
    /// Gate for the given limits; output tokens count toward each call's cost.
    pub fn new(limits: ThroughputLimits, max_output_tokens: u32) -> Self {
        let token_counter = if limits.tokens_per_minute.is_some() {
            build_token_counter()
        } else {
            whitespace_token_counter()
        };
        Self::with_counter(limits, max_output_tokens, token_counter)
    }

    /// Gate with an explicit token counter.
    pub fn with_counter(
        limits: ThroughputLimits,
        max_output_tokens: u32,
        token_counter: TokenCounter,
    ) -> Self {
        Self {
            bucket: limits
                .tokens_per_minute
                .map(|tpm| Mutex::new(TokenBucket::per_minute(tpm))),
            spacing: limits.min_call_interval.map(CallSpacing::new),
            token_counter,
            max_output_tokens,
        }
    }

    /// A gate that never waits.
    pub fn unlimited() -> Self {
        Self::with_counter(ThroughputLimits::default(), 0, whitespace_token_counter())
    }

    /// Estimated token cost of sending `prompt`, including the output allowance.
    pub fn estimate_cost(&self, prompt: &str) -> u64 {
        (self.token_counter)(prompt) as u64 + u64::from(self.max_output_tokens)
    }

    /// Wait until a call carrying `prompt` fits the budget, then claim its share.
    pub async fn acquire(&self, prompt: &str) {
        if let Some(spacing) = &self.spacing {
            spacing.wait_turn().await;
        }
        if let Some(bucket) = &self.bucket {
            let cost = self.estimate_cost(prompt);
            let wait = lock(bucket).reserve(cost, Instant::now());
            if !wait.is_zero() {
                tracing::debug!(
                    cost,
                    delay_ms = wait.as_millis() as u64,
                    "Waiting for backend throughput budget"
                );
                // Dropped mid-wait (cancelled run): hand the tokens back.
                let reservation = Reservation { bucket, cost };
                sleep(wait).await;
                std::mem::forget(reservation);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tokens claimed by a caller that is still waiting for them.
struct Reservation<'a> {
    bucket: &'a Mutex<TokenBucket>,
    cost: u64,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        lock(self.bucket).refund(self.cost);
        tracing::debug!(cost = self.cost, "Returned throughput budget of cancelled call");
    }
}

/// Token bucket whose balance may go negative; the debt is paid off by waiting.
struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn per_minute(tokens_per_minute: u32) -> Self {
        let capacity = f64::from(tokens_per_minute.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    /// Deduct `cost` and return how long the caller must wait before proceeding.
    fn reserve(&mut self, cost: u64, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        // A single request larger than the whole budget waits for one full refill.
        self.tokens -= (cost as f64).min(self.capacity);
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.refill_per_sec)
        }
    }
}

impl TokenBucket {
    /// Give back a reservation that was never used.
    fn refund(&mut self, cost: u64) {
        self.tokens = (self.tokens + (cost as f64).min(self.capacity)).min(self.capacity);
    }
}

/// Hands out call slots at least `interval` apart; the first call goes immediately.
struct CallSpacing {
    interval: Duration,
    next_slot: tokio::sync::Mutex<Option<Instant>>,
}

impl CallSpacing {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: tokio::sync::Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next_slot.map_or(now, |next| next.max(now));
            *next_slot = Some(slot + self.interval);
            slot
        };
        if slot > Instant::now() {
            tracing::info!(
                delay_ms = (slot - Instant::now()).as_millis() as u64,
                "Spacing backend calls to respect rate limits"
            );
            sleep_until(slot).await;
        }
    }
}

/// Token counter backed by `cl100k_base`, falling back to whitespace counting.
pub fn build_token_counter() -> TokenCounter {
    match cl100k_base() {
        Ok(encoding) => {
            let encoding = Arc::new(encoding);
            Arc::new(move |segment: &str| encoding.encode_ordinary(segment).len())
        }
        Err(error) => {
            tracing::warn!(
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_token_counter()
        }
    }
}

fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}
