//! Rate limiting for inbound satellite traffic.
//!
//! Satellites push from the LAN and may share an address (NAT, DHCP churn),
//! so pushes are limited per authenticated satellite name rather than per
//! peer address. A global limiter caps aggregate throughput. Both are checked
//! after authentication, so unauthenticated requests never spend quota.
//!
//! Both use the governor crate; the keyed limiter is backed by DashMap.

use crate::config::{ConfigError, LimitsConfig};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Type alias for a keyed rate limiter using DashMap.
type KeyedLimiter<K> = RateLimiter<
    K,
    dashmap::DashMap<K, InMemoryState>,
    DefaultClock,
    NoOpMiddleware<governor::clock::QuantaInstant>,
>;

/// Type alias for a direct (non-keyed) rate limiter.
type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiters for the inbound endpoints.
#[derive(Clone)]
pub struct RateLimits {
    /// Limits pushes per satellite name.
    push_limiter: Arc<KeyedLimiter<String>>,
    /// Limits all inbound requests together.
    global_limiter: Arc<DirectLimiter>,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("push_limiter", &"KeyedLimiter<String>")
            .field("global_limiter", &"DirectLimiter")
            .finish()
    }
}

impl RateLimits {
    /// Create rate limiters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a quota is zero.
    pub fn new(config: &LimitsConfig) -> Result<Self, ConfigError> {
        let pushes_per_minute =
            NonZeroU32::new(config.pushes_per_minute).ok_or(ConfigError::Invalid {
                field: "limits.pushes_per_minute",
            })?;
        let global_rps =
            NonZeroU32::new(config.global_requests_per_second).ok_or(ConfigError::Invalid {
                field: "limits.global_requests_per_second",
            })?;

        Ok(Self {
            push_limiter: Arc::new(RateLimiter::keyed(Quota::per_minute(pushes_per_minute))),
            global_limiter: Arc::new(RateLimiter::direct(Quota::per_second(global_rps))),
        })
    }

    /// Check if an authenticated satellite may push again.
    pub fn check_push(&self, satellite: &str) -> Result<(), RateLimitError> {
        self.push_limiter
            .check_key(&satellite.to_string())
            .map_err(|_| RateLimitError::PushLimitExceeded)
    }

    /// Check if the global request rate is within limits.
    pub fn check_global(&self) -> Result<(), RateLimitError> {
        self.global_limiter
            .check()
            .map_err(|_| RateLimitError::GlobalLimitExceeded)
    }

    /// Number of tracked satellite keys (for metrics).
    pub fn push_keys_count(&self) -> usize {
        self.push_limiter.len()
    }

    /// Evict entries whose cells have fully recharged.
    ///
    /// Removed or renamed satellites otherwise leave their keys behind.
    pub fn shrink(&self) {
        self.push_limiter.retain_recent();
    }
}

/// Rate limit error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    /// Too many pushes from this satellite.
    PushLimitExceeded,
    /// Global request rate exceeded across all satellites.
    GlobalLimitExceeded,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PushLimitExceeded => write!(f, "push rate limit exceeded"),
            Self::GlobalLimitExceeded => write!(f, "global rate limit exceeded"),
        }
    }
}

impl std::error::Error for RateLimitError {}
