//! Timeout utilities for page operations
//!
//! Async timeout wrappers that keep page navigation, extraction and
//! in-page scripts from hanging indefinitely.

use std::future::Future;
use std::time::Duration;

use crate::driver::DriverError;

/// Wrap an async page operation with an explicit timeout
///
/// Exceeding the timeout surfaces as [`DriverError::Timeout`], which feeds the
/// normal retry path.
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(DriverError::Timeout {
            operation: operation_name.to_string(),
            after: timeout,
        }),
    }
}
