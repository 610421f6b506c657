//! Single retry for idempotent reads.

use std::future::Future;

use tracing::warn;

use drivehub_core::result::AppResult;

/// Run an idempotent read, retrying once if it fails with a retryable
/// error. Mutations must never go through here.
pub(crate) async fn read_retry<T, F, Fut>(operation: &'static str, mut read: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match read().await {
        Err(e) if e.kind.is_retryable() => {
            warn!(operation, error = %e, "Transient read failure, retrying once");
            read().await
        }
        other => other,
    }
}
