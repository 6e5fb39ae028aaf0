//! Rate limiter (spec §4.C): a global token bucket plus one per tenant.
//! `allow(tenant)` is non-blocking; callers that get `false` sleep
//! `RATE_LIMIT_RETRY_DELAY_MS` and requeue without consuming an attempt.

use governor::{Quota, RateLimiter as GovernorLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;

type KeyedLimiter = GovernorLimiter<String, governor::state::keyed::DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;
type GlobalLimiter = GovernorLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

/// `{capacity, refill_per_second}` for one bucket, global or per-tenant.
#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub capacity: NonZeroU32,
    pub refill_per_second: NonZeroU32,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            capacity: nonzero!(20u32),
            refill_per_second: nonzero!(10u32),
        }
    }
}

impl BucketConfig {
    fn quota(self) -> Quota {
        Quota::per_second(self.refill_per_second).allow_burst(self.capacity)
    }
}

/// Global bucket plus a keyed bucket keyed by tenant id. A request is
/// allowed only when both buckets have capacity.
pub struct RateLimiter {
    global: GlobalLimiter,
    per_tenant: KeyedLimiter,
}

impl RateLimiter {
    pub fn new(global: BucketConfig, per_tenant: BucketConfig) -> Self {
        Self {
            global: GovernorLimiter::direct(global.quota()),
            per_tenant: GovernorLimiter::keyed(per_tenant.quota()),
        }
    }

    /// Non-blocking admission check. Checking the per-tenant bucket first
    /// avoids consuming a global token when the tenant alone is over
    /// budget.
    pub fn allow(&self, tenant: &str) -> bool {
        if self.per_tenant.check_key(&tenant.to_string()).is_err() {
            return false;
        }
        self.global.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_once_capacity_exhausted() {
        let limiter = RateLimiter::new(
            BucketConfig {
                capacity: nonzero!(1000u32),
                refill_per_second: nonzero!(1000u32),
            },
            BucketConfig {
                capacity: nonzero!(2u32),
                refill_per_second: nonzero!(1u32),
            },
        );

        assert!(limiter.allow("tenant-a"));
        assert!(limiter.allow("tenant-a"));
        assert!(!limiter.allow("tenant-a"));
    }

    #[test]
    fn tenants_are_isolated() {
        let limiter = RateLimiter::new(
            BucketConfig {
                capacity: nonzero!(1000u32),
                refill_per_second: nonzero!(1000u32),
            },
            BucketConfig {
                capacity: nonzero!(1u32),
                refill_per_second: nonzero!(1u32),
            },
        );

        assert!(limiter.allow("tenant-a"));
        assert!(!limiter.allow("tenant-a"));
        assert!(limiter.allow("tenant-b"));
    }
}
