//! Client-side request throttle owned by a single adapter.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Token bucket shared by every request one adapter makes. Independent of the
/// orchestrator's retry backoff.
#[derive(Clone, Default)]
pub struct Throttle {
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl Throttle {
    /// `None` or zero means no client-side limit.
    pub fn per_minute(requests: Option<u32>) -> Self {
        let limiter = requests
            .and_then(NonZeroU32::new)
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_minute(n))));
        Self { limiter }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_limited(&self) -> bool {
        self.limiter.is_some()
    }

    /// Wait until the bucket allows one more request.
    pub async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle").field("limited", &self.is_limited()).finish()
    }
}
