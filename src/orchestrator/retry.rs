use crate::worker::WorkerError;
use std::time::Duration;
use tokio::time::sleep;

pub struct RetryPolicy {
    max_retries: u8,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u8, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn should_retry(&self, attempt: u8, error: &WorkerError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }

        error.is_retryable()
    }

    pub async fn wait_before_retry(&self, attempt: u8) {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        let delay = self.base_delay.saturating_mul(multiplier);

        tracing::info!(
            "Retrying in {:?} (attempt {})",
            delay,
            attempt + 2
        );
        sleep(delay).await;
    }
}
