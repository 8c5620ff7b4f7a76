use tracing::warn;

use crate::error::{AppError, AppResult};

/// Checks a fixed-window rate limit stored in Redis.
///
/// Uses the INCR + EXPIRE strategy:
/// - Increments a counter for `key`
/// - On first increment, sets TTL to `window_secs`
/// - Fails with `RateLimited` once the counter exceeds `max_attempts`
///
/// Redis being unavailable lets the request through.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    key: &str,
    max_attempts: u64,
    window_secs: u64,
) -> AppResult<()> {
    let count: u64 = match redis::cmd("INCR").arg(key).query_async(redis).await {
        Ok(c) => c,
        Err(e) => {
            warn!("rate limit check skipped for {key}: {e}");
            0
        }
    };

    if count == 1 {
        // Set TTL only on first increment to avoid resetting the window on each attempt
        let _: Result<(), _> = redis::cmd("EXPIRE")
            .arg(key)
            .arg(window_secs)
            .query_async(redis)
            .await;
    }

    if exceeded(count, max_attempts) {
        return Err(AppError::RateLimited);
    }

    Ok(())
}

fn exceeded(count: u64, max_attempts: u64) -> bool {
    count > max_attempts
}
