//! Cancellable operation with a deadline.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::NetworkError;

/// Run `operation`, giving up after `timeout` or when `cancel` fires.
///
/// Expiry maps to `NetworkError::Timeout` and cancellation to
/// `NetworkError::Cancelled`, so callers can treat both like any other
/// network failure. The operation is dropped when either fires.
pub async fn with_deadline<F, T>(
    operation: F,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<T, NetworkError>
where
    F: Future<Output = Result<T, NetworkError>>,
{
    let bounded = async {
        tokio::time::timeout(timeout, operation)
            .await
            .unwrap_or(Err(NetworkError::Timeout(timeout)))
    };
    with_cancel(bounded, cancel).await
}

/// Run `operation` with no time limit, stopping only when `cancel` fires.
pub async fn with_cancel<F, T>(operation: F, cancel: Option<&CancellationToken>) -> Result<T, NetworkError>
where
    F: Future<Output = Result<T, NetworkError>>,
{
    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(NetworkError::Cancelled),
                result = operation => result,
            }
        }
        None => operation.await,
    }
}
