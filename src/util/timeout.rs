//! Deadline helpers mapping an elapsed bound to [`RelayError::Timeout`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::RelayError;

/// Bound a single request by `duration`.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    with_deadline(Instant::now() + duration, duration, future).await
}

/// Bound `future` by an absolute `deadline`.
///
/// `budget` is the whole allowance the deadline was derived from; it is what
/// the resulting error reports, not the time left when `future` started.
pub async fn with_deadline<T>(
    deadline: Instant,
    budget: Duration,
    future: impl Future<Output = Result<T, RelayError>>,
) -> Result<T, RelayError> {
    tokio::time::timeout_at(deadline, future)
        .await
        .unwrap_or_else(|_| Err(RelayError::Timeout(budget.as_millis() as u64)))
}
