//! Bounded retry with a reset step between attempts
use std::fmt::Display;
use std::future::Future;

/// Run `body` up to `attempts` times.
///
/// `reset` runs after each failed attempt that will be retried, never before the
/// first attempt and never after the last. The last error is returned when every
/// attempt fails. `body` receives the 1-based attempt number.
pub async fn with_retry<T, E, B, BFut, R, RFut>(attempts: u32, mut reset: R, mut body: B) -> Result<T, E>
where
    E: Display,
    B: FnMut(u32) -> BFut,
    BFut: Future<Output = Result<T, E>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = ()>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match body(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => return Err(e),
            Err(e) => {
                tracing::warn!("[Retry] Attempt {}/{} failed: {}", attempt, attempts, e);
                reset().await;
                attempt += 1;
            }
        }
    }
}
