//! Fixed-window request limiter over a [`TtlStore`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::ApiError;
use crate::ttl::TtlStore;

pub struct RateLimiter {
    store: Arc<dyn TtlStore>,
    max_requests: u64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn TtlStore>, max_requests: u64, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Count one request against `key`.
    ///
    /// The first `max_requests` requests in a window pass; later ones get
    /// [`ApiError::RateLimited`] carrying the seconds left in the window.
    pub async fn check(&self, key: &str) -> Result<(), ApiError> {
        let counter = self
            .store
            .increment(&format!("ratelimit:{}", key), self.window)
            .await?;

        if counter.count > self.max_requests {
            let retry_after_secs = counter.resets_in.as_secs_f64().ceil().max(1.0) as u64;
            debug!(key, count = counter.count, retry_after_secs, "rate limited");
            return Err(ApiError::RateLimited { retry_after_secs });
        }
        Ok(())
    }
}
