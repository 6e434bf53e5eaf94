//! Bounded retries
//!
//! Read-plan-commit cycles retry on a stale version; inserts of a freshly
//! generated reference retry when a concurrent insert took the same number.

use std::future::Future;

use tracing::warn;

use crate::error::BillingError;

/// Default number of attempts for a version-checked write
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is used up. Each attempt must re-read its inputs.
pub(crate) async fn with_retry<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    attempt: F,
) -> Result<T, BillingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BillingError>>,
{
    retry_while(operation, max_attempts, BillingError::is_retryable, "version conflict, retrying", attempt).await
}

/// Like [`with_retry`], but retries when the reference number an attempt
/// generated was taken before its insert landed. Each attempt must generate
/// a new reference.
pub(crate) async fn with_fresh_reference<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    attempt: F,
) -> Result<T, BillingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BillingError>>,
{
    retry_while(
        operation,
        max_attempts,
        BillingError::is_reference_clash,
        "reference number taken concurrently, retrying",
        attempt,
    )
    .await
}

async fn retry_while<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    should_retry: fn(&BillingError) -> bool,
    message: &'static str,
    mut attempt: F,
) -> Result<T, BillingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BillingError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(err) if should_retry(&err) && tries < max_attempts => {
                warn!(operation, attempt = tries, max_attempts, error = %err, "{}", message);
                tries += 1;
            }
            result => return result,
        }
    }
}
