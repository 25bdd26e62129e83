//! Scoped Timeout (spec §4.1 "Timeout").

use std::future::Future;
use std::time::Duration;

use crate::error::{ClassifiedFailure, FailureKind};

/// Races `op` against `bound`. On expiry, `op`'s future is dropped — since
/// every handler in this crate is plain `async`/`.await` with no raw thread
/// or socket handles kept outside the future, dropping it frees whatever it
/// was awaiting (the cancellation guarantee spec §4.1 asks for).
pub async fn with_timeout<T, F>(bound: Duration, op_name: &str, op: F) -> Result<T, ClassifiedFailure>
where
    F: Future<Output = Result<T, ClassifiedFailure>>,
{
    match tokio::time::timeout(bound, op).await {
        Ok(result) => result,
        Err(_) => Err(ClassifiedFailure::new(
            FailureKind::Timeout,
            format!("'{op_name}' exceeded {bound:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_normally_within_bound() {
        let result = with_timeout(Duration::from_millis(50), "quick", async { Ok::<_, ClassifiedFailure>(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reports_typed_timeout_on_expiry() {
        let result = with_timeout(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ClassifiedFailure>(1)
        });
        let handle = tokio::spawn(result);
        tokio::time::advance(Duration::from_millis(20)).await;
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.unwrap_err().kind, FailureKind::Timeout);
    }
}
