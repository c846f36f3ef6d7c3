use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::limiter::RateLimiter;
use crate::provider::LogsProvider;

/// Confirms that a log group exists before it is scanned
pub struct LogGroupLocator<P> {
    provider: Arc<P>,
    limiter: Arc<RateLimiter>,
}

impl<P: LogsProvider> LogGroupLocator<P> {
    pub fn new(provider: Arc<P>, limiter: Arc<RateLimiter>) -> Self {
        Self { provider, limiter }
    }

    /// Page through the log group listing until `target` is found (exact,
    /// case-sensitive) or the listing is exhausted
    ///
    /// Provider errors are returned as-is; the caller treats them as fatal.
    pub async fn locate(&self, cancel: &CancellationToken, target: &str) -> Result<bool> {
        let mut next_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            self.limiter.acquire(cancel).await?;
            let page = self.provider.describe_log_groups(next_token.take()).await?;
            pages += 1;

            for name in &page.names {
                debug!(log_group = %name, "Parse log group");
                if name == target {
                    debug!(log_group = %name, pages, "Log group found");
                    return Ok(true);
                }
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => {
                    debug!(target_group = %target, pages, "Log group listing exhausted");
                    return Ok(false);
                }
            }
        }
    }
}
