use std::future::Future;
use std::time::Duration;

use reelpulse_common::{Result, ScrapeError};

/// Run a transport call under a deadline. Running out of time is a transient
/// failure of that call, not of the run.
pub async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ScrapeError::Transient(format!(
            "{what} timed out after {}s",
            limit.as_secs_f64()
        ))),
    }
}
