// ABOUTME: Delays used by the activation poll and the write retry loop
// ABOUTME: Every wait can be interrupted through the run's cancellation token

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{CopyError, Result};

pub const ACTIVATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

const WRITE_BACKOFF_STEP_MS: u64 = 200;

/// Linear backoff: 200ms per consecutive retry.
pub fn write_backoff(consecutive_retries: u32) -> Duration {
    Duration::from_millis(WRITE_BACKOFF_STEP_MS.saturating_mul(u64::from(consecutive_retries)))
}

/// Sleep for `delay`, or fail with `Cancelled` as soon as `cancel` fires.
pub async fn pause(
    delay: Duration,
    cancel: &CancellationToken,
    operation: &'static str,
    table: &str,
) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CopyError::Cancelled {
            operation,
            table: table.to_string(),
        }),
        _ = sleep(delay) => Ok(()),
    }
}
