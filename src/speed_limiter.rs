//! Global bandwidth limit shared by every running task
//!
//! Lock-free token bucket: one token is one byte, the bucket holds at most one
//! second worth of tokens and refills continuously at the configured rate.

use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Longest single sleep while waiting for tokens, so limit changes apply quickly
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Token-bucket limiter; clones share the same bucket
#[derive(Clone, Debug)]
pub struct SpeedLimiter {
    /// Bytes per second, 0 = unlimited
    limit_bps: Arc<AtomicU64>,
    /// Bytes that may be written right now
    tokens: Arc<AtomicU64>,
    /// Monotonic nanos of the last refill
    last_refill: Arc<AtomicU64>,
}

impl SpeedLimiter {
    /// Create a limiter (`None` = unlimited)
    #[must_use]
    pub fn new(limit_bps: Option<u64>) -> Self {
        let limit = limit_bps.unwrap_or(0);
        Self {
            limit_bps: Arc::new(AtomicU64::new(limit)),
            tokens: Arc::new(AtomicU64::new(limit)),
            last_refill: Arc::new(AtomicU64::new(now_nanos())),
        }
    }

    /// Change the limit; takes effect for waiting callers within [`MAX_WAIT`]
    pub fn set_limit(&self, limit_bps: Option<u64>) {
        let new_limit = limit_bps.unwrap_or(0);
        let old_limit = self.limit_bps.swap(new_limit, Ordering::SeqCst);

        if new_limit > old_limit {
            self.tokens
                .fetch_add(new_limit - old_limit, Ordering::SeqCst);
        } else {
            self.tokens.fetch_min(new_limit, Ordering::SeqCst);
        }
    }

    /// Current limit (`None` = unlimited)
    pub fn get_limit(&self) -> Option<u64> {
        match self.limit_bps.load(Ordering::Relaxed) {
            0 => None,
            limit => Some(limit),
        }
    }

    /// Wait until `bytes` may be written
    pub async fn acquire(&self, bytes: u64) {
        let mut remaining = bytes;

        while remaining > 0 {
            let limit = self.limit_bps.load(Ordering::Relaxed);
            if limit == 0 {
                return;
            }

            self.refill(limit);

            let available = self.tokens.load(Ordering::SeqCst);
            let take = remaining.min(available);
            if take > 0 {
                if self
                    .tokens
                    .compare_exchange(
                        available,
                        available - take,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    )
                    .is_ok()
                {
                    remaining -= take;
                }
                continue;
            }

            let wait = Duration::from_secs_f64(remaining as f64 / limit as f64);
            tokio::time::sleep(wait.clamp(Duration::from_millis(10), MAX_WAIT)).await;
        }
    }

    fn refill(&self, limit: u64) {
        let now = now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);
        let elapsed_secs = now.saturating_sub(last) as f64 / 1_000_000_000.0;
        let earned = (limit as f64 * elapsed_secs) as u64;

        if earned == 0 {
            return;
        }
        // Only the caller that wins the timestamp update adds the earned tokens
        if self
            .last_refill
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    Some(current.saturating_add(earned).min(limit))
                });
        }
    }
}

fn now_nanos() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_nanos() as u64
}
