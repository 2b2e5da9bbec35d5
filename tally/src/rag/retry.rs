use std::future::Future;
use std::time::Duration;

use crate::error::{Result, TallyError};

/// Run `call` under `timeout`, retrying once after `backoff` when the first
/// attempt fails with a transient error (timeout, 5xx, connection loss).
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    backoff: Duration,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retried = false;
    loop {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(TallyError::Timeout {
                operation: operation.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Err(e) if !retried && e.is_transient() => {
                tracing::debug!(operation, error = %e, "Transient failure, retrying once");
                retried = true;
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}
