//! Jittered exponential backoff for upstream LLM calls, grounded on the
//! teacher's `cache`/HTTP retry pattern. Retries 429/5xx-shaped failures up
//! to a bounded deadline; past the deadline the call fails with
//! `UpstreamTimeout` (spec §4.2).

use crate::error::{GasableError, Result};
use std::future::Future;
use std::time::{Duration, Instant};

/// Retries `f` with jittered exponential backoff (base 200ms, factor 2,
/// capped at 5s per attempt) until `deadline` elapses. `is_retryable`
/// decides whether a given error should be retried at all; non-retryable
/// errors return immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    deadline: Duration,
    is_retryable: impl Fn(&GasableError) -> bool,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if is_retryable(&e) => {
                let elapsed = start.elapsed();
                if elapsed >= deadline {
                    return Err(GasableError::UpstreamTimeout(format!(
                        "exhausted retries after {}ms: {e}",
                        elapsed.as_millis()
                    )));
                }
                let backoff = Duration::from_millis(200u64.saturating_mul(1 << attempt.min(4)));
                let jitter = Duration::from_millis(fastrand_jitter(backoff.as_millis() as u64));
                let sleep_for = backoff.min(Duration::from_secs(5)) + jitter;
                let remaining = deadline.saturating_sub(elapsed);
                tokio::time::sleep(sleep_for.min(remaining)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Deterministic-ish jitter (0..=max/4) without pulling in a dedicated RNG
/// crate for a single call site; good enough to desynchronize retries.
fn fastrand_jitter(max: u64) -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    let h = RandomState::new().build_hasher().finish();
    if max == 0 {
        0
    } else {
        h % (max / 4 + 1)
    }
}

/// True for errors that represent a transient upstream condition worth
/// retrying (timeouts, unavailability) as opposed to caller mistakes.
pub fn is_transient(e: &GasableError) -> bool {
    matches!(
        e,
        GasableError::UpstreamTimeout(_) | GasableError::UpstreamUnavailable(_)
    )
}
