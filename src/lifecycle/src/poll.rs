//! Bounded fixed-interval polling.
//!
//! The credential rendezvous and both readiness checks are the same loop: try,
//! and if the thing is not there yet, sleep and try again until a wall-clock
//! budget runs out. The budget is measured from a single start instant, so a
//! slow attempt eats into it instead of stretching the total wait.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Why a poll loop stopped without a value.
#[derive(Debug)]
pub enum PollError<E> {
    /// The budget ran out while the operation kept reporting "not yet".
    Timeout { waited: Duration, attempts: u32 },
    /// The operation failed with an error that must not be retried.
    Aborted(E),
}

/// Run `op` every `interval` until it yields a value, fails, or `timeout`
/// elapses.
///
/// `op` returns `Ok(Some(value))` when done, `Ok(None)` for "not yet" and
/// `Err` to abort immediately. The first attempt runs without delay. The last
/// sleep is clipped so the final attempt lands on the deadline.
pub async fn poll_until<T, E, F, Fut>(
    interval: Duration,
    timeout: Duration,
    mut op: F,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        if let Some(value) = op().await.map_err(PollError::Aborted)? {
            return Ok(value);
        }

        let waited = start.elapsed();
        if waited >= timeout {
            return Err(PollError::Timeout { waited, attempts });
        }

        sleep(interval.min(timeout - waited)).await;
    }
}
