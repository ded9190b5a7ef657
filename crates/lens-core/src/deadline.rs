//! Bounded deadlines for calls into external services.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{LensError, LensResult};

/// Run `fut` under `limit`, turning expiry into a retryable
/// [`LensError::Timeout`]. The inner future is dropped on expiry, which
/// cancels the call and releases whatever it held.
pub async fn with_deadline<T, F>(operation: &'static str, limit: Duration, fut: F) -> LensResult<T>
where
    F: Future<Output = LensResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, seconds = limit.as_secs(), "External call exceeded its deadline");
            Err(LensError::Timeout {
                operation,
                seconds: limit.as_secs(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_result_through() {
        let value = with_deadline("noop", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_call_is_retryable_timeout() {
        let result: LensResult<()> = with_deadline("llm", Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        match result {
            Err(err @ LensError::Timeout { operation: "llm", seconds: 2 }) => {
                assert!(err.is_retryable());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
