use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{CloudWatchError, Result};

/// DescribeLogGroups calls per second
/// https://docs.aws.amazon.com/AmazonCloudWatch/latest/logs/cloudwatch_limits_cwl.html
pub const DESCRIBE_LOG_GROUPS_PER_SECOND: u32 = 10;

/// FilterLogEvents calls per second
pub const FILTER_LOG_EVENTS_PER_SECOND: u32 = 25;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket bounding one class of API calls
#[derive(Debug)]
pub struct RateLimiter {
    /// Call class, for diagnostics
    name: &'static str,

    /// Sustained tokens per second
    rate: f64,

    /// Bucket capacity
    burst: f64,

    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a limiter refilling `rate` tokens per second up to `burst`
    pub fn new(name: &'static str, rate: u32, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            name,
            rate: f64::from(rate.max(1)),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limiter for log group discovery calls
    pub fn describe_log_groups() -> Self {
        Self::new(
            "DescribeLogGroups",
            DESCRIBE_LOG_GROUPS_PER_SECOND,
            DESCRIBE_LOG_GROUPS_PER_SECOND,
        )
    }

    /// Limiter for event filter calls
    pub fn filter_log_events() -> Self {
        Self::new(
            "FilterLogEvents",
            FILTER_LOG_EVENTS_PER_SECOND,
            FILTER_LOG_EVENTS_PER_SECOND,
        )
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Wait for a token, or fail with [`CloudWatchError::Cancelled`]
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(CloudWatchError::Cancelled);
            }

            let wait = match self.try_take(Instant::now()) {
                None => return Ok(()),
                Some(wait) => wait,
            };
            trace!(limiter = self.name, wait_ms = wait.as_millis() as u64, "Rate limited");

            tokio::select! {
                _ = cancel.cancelled() => return Err(CloudWatchError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Take a token if one is available, otherwise return how long until one is
    fn try_take(&self, now: Instant) -> Option<Duration> {
        let mut bucket = self.bucket.lock();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            Some(Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate))
        }
    }
}
