//! Per-venue submission rate limiting.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket with fractional refill.
///
/// `acquire` waits out the refill instead of erroring when the bucket
/// is drained. The wait happens under the internal lock, so contending
/// callers are served in arrival order.
pub(crate) struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub(crate) fn new(capacity: u32, refill_per_sec: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
            }),
            capacity: capacity as f64,
            refill_per_sec: refill_per_sec.max(1) as f64,
        }
    }

    /// Take one token, waiting for the refill when none are left. The
    /// wait is bounded by one full token at the refill rate.
    pub(crate) async fn acquire(&self) {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens < 1.0 {
            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_sec);
            tokio::time::sleep(wait).await;
            self.refill(&mut state);
        }
        state.tokens = (state.tokens - 1.0).max(0.0);
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}
