//! Shared per-API admission control
//!
//! One token bucket per named API, shared by every run. Buckets are
//! governor GCRA cells: burst = bucket capacity, replenish interval =
//! 1 / refill rate, which admits exactly what a continuously refilled token
//! bucket would. The cells are lock-free, so concurrent callers never
//! mutate bucket state directly.

use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

use crate::services::StageError;

/// Bucket name for the strict catalog source
pub const MUSICBRAINZ_API: &str = "musicbrainz";
/// Bucket name for the lenient similarity source
pub const LASTFM_API: &str = "lastfm";

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    pub capacity: u32,
    pub refill_per_second: u32,
}

/// Result of one acquire attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    /// Time until a token is available; 0 when allowed
    pub retry_after_ms: u64,
}

impl Admission {
    fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_ms: 0,
        }
    }
}

pub struct RateLimiter {
    buckets: HashMap<String, DirectLimiter>,
    clock: DefaultClock,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// Limiter without buckets; every API is admitted until registered
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            clock: DefaultClock::default(),
        }
    }

    /// Limiter with the two source buckets
    ///
    /// - musicbrainz: capacity 1, 1 token/s
    /// - lastfm: capacity 5, 5 tokens/s
    pub fn with_defaults() -> Self {
        let mut limiter = Self::new();
        limiter.buckets.insert(
            MUSICBRAINZ_API.to_string(),
            GovernorLimiter::direct(Quota::per_second(NonZeroU32::MIN)),
        );
        limiter.buckets.insert(
            LASTFM_API.to_string(),
            GovernorLimiter::direct(Quota::per_second(FIVE).allow_burst(FIVE)),
        );
        limiter
    }

    /// Add or replace a bucket
    pub fn register(&mut self, api: &str, config: BucketConfig) -> Result<(), StageError> {
        let capacity = NonZeroU32::new(config.capacity).ok_or_else(|| {
            StageError::Validation(format!("bucket {} needs a non-zero capacity", api))
        })?;
        let rate = NonZeroU32::new(config.refill_per_second).ok_or_else(|| {
            StageError::Validation(format!("bucket {} needs a non-zero refill rate", api))
        })?;

        let quota = Quota::per_second(rate).allow_burst(capacity);
        self.buckets
            .insert(api.to_string(), GovernorLimiter::direct(quota));
        Ok(())
    }

    /// Try to take one token from the API's bucket
    pub fn acquire(&self, api: &str) -> Admission {
        let Some(bucket) = self.buckets.get(api) else {
            debug!(api = api, "No bucket registered, admitting");
            return Admission::allowed();
        };

        match bucket.check() {
            Ok(()) => Admission::allowed(),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                Admission {
                    allowed: false,
                    retry_after_ms: ceil_millis(wait).max(1),
                }
            }
        }
    }

    /// Sleep per `retry_after_ms` until a token is granted
    pub async fn until_ready(&self, api: &str) {
        loop {
            let admission = self.acquire(api);
            if admission.allowed {
                return;
            }
            debug!(
                api = api,
                retry_after_ms = admission.retry_after_ms,
                "Rate limited, backing off"
            );
            tokio::time::sleep(Duration::from_millis(admission.retry_after_ms)).await;
        }
    }
}

const FIVE: NonZeroU32 = match NonZeroU32::new(5) {
    Some(n) => n,
    None => NonZeroU32::MIN,
};

fn ceil_millis(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    nanos.div_ceil(1_000_000) as u64
}
