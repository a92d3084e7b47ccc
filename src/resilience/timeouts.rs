//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A timeout is reported as `AdapterError::Timeout`, distinct from transport errors

use std::future::Future;
use std::time::Duration;

use crate::error::{AdapterError, AdapterResult};

/// Run `fut` with a deadline of `secs` seconds.
pub async fn with_timeout<T, F>(secs: u64, fut: F) -> AdapterResult<T>
where
    F: Future<Output = AdapterResult<T>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(AdapterError::Timeout(secs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        let result: AdapterResult<()> = with_timeout(2, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(AdapterError::Timeout(2)));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: AdapterResult<()> =
            with_timeout(2, async { Err(AdapterError::Http("refused".into())) }).await;
        assert_eq!(result, Err(AdapterError::Http("refused".into())));
    }
}
