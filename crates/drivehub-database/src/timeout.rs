//! Bounded execution and error mapping for repository calls.

use std::future::Future;
use std::time::Duration;

use drivehub_core::error::{AppError, ErrorKind};
use drivehub_core::result::AppResult;

/// Run a repository call under `limit`.
///
/// An elapsed call is reported as a `TransientStore` failure. Any open
/// transaction inside `fut` is dropped with it, which rolls it back.
pub(crate) async fn bounded<T, F>(limit: Duration, context: &'static str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::database(format!(
            "{context}: timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

/// Map a driver error. Unique violations become `Conflict`, everything
/// else is a transient store failure.
pub(crate) fn db_error(context: &'static str, err: sqlx::Error) -> AppError {
    let unique = matches!(&err, sqlx::Error::Database(db) if db.is_unique_violation());
    let kind = if unique {
        ErrorKind::Conflict
    } else {
        ErrorKind::TransientStore
    };
    AppError::with_source(kind, context, err)
}
