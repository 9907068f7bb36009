//! Send pacing policies
//!
//! The dispatcher calls [`PacingPolicy::after_send`] once per message sent.
//! - [`BurstPacer`]: fixed-window throttle bounding burst size (default)
//! - [`RatePacer`]: token bucket bounding sustained rate
//! - [`NoPacing`]: never waits

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::info;

use crate::{DispatchError, Result};

#[async_trait]
pub trait PacingPolicy: Send {
    /// Called after each successful send; may suspend.
    async fn after_send(&mut self);

    /// Start a fresh file.
    fn reset(&mut self) {}
}

/// Pauses once more than `threshold` messages went out since the last pause.
///
/// After a pause the counter restarts at 1, not 0: the message that tripped
/// the threshold counts as the first of the next burst.
#[derive(Debug, Clone)]
pub struct BurstPacer {
    threshold: u32,
    pause: Duration,
    count: u32,
}

impl BurstPacer {
    pub const DEFAULT_THRESHOLD: u32 = 10;
    pub const DEFAULT_PAUSE: Duration = Duration::from_secs(10);

    pub fn new(threshold: u32, pause: Duration) -> Self {
        Self {
            threshold,
            pause,
            count: 0,
        }
    }

    /// Count one sent message; returns the pause to take, if any.
    pub fn record_send(&mut self) -> Option<Duration> {
        self.count += 1;
        if self.count > self.threshold {
            self.count = 1;
            Some(self.pause)
        } else {
            None
        }
    }
}

impl Default for BurstPacer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD, Self::DEFAULT_PAUSE)
    }
}

#[async_trait]
impl PacingPolicy for BurstPacer {
    async fn after_send(&mut self) {
        if let Some(pause) = self.record_send() {
            info!(pause_secs = pause.as_secs(), "Burst threshold reached, waiting");
            tokio::time::sleep(pause).await;
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Token bucket allowing `per_second` messages per second on average.
pub struct RatePacer {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RatePacer {
    pub fn per_second(per_second: u32) -> Result<Self> {
        let rate = NonZeroU32::new(per_second).ok_or_else(|| {
            DispatchError::Config("rate_per_second must be at least 1".to_string())
        })?;

        Ok(Self {
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }
}

#[async_trait]
impl PacingPolicy for RatePacer {
    async fn after_send(&mut self) {
        self.limiter.until_ready().await;
    }
}

/// Sends back to back.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPacing;

#[async_trait]
impl PacingPolicy for NoPacing {
    async fn after_send(&mut self) {}
}

/// Build a policy from its configured name.
pub fn from_settings(
    strategy: &str,
    burst_threshold: u32,
    pause: Duration,
    rate_per_second: u32,
) -> Result<Box<dyn PacingPolicy>> {
    match strategy {
        "burst" => {
            if burst_threshold == 0 {
                return Err(DispatchError::Config(
                    "burst_threshold must be at least 1".to_string(),
                ));
            }
            Ok(Box::new(BurstPacer::new(burst_threshold, pause)))
        }
        "rate" => Ok(Box::new(RatePacer::per_second(rate_per_second)?)),
        "none" => Ok(Box::new(NoPacing)),
        other => Err(DispatchError::Config(format!(
            "unknown pacing strategy: {}",
            other
        ))),
    }
}
