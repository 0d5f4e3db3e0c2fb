//! Runs one stage future under a timeout race and panic guard.

use super::PipelineConfig;
use crate::cancellation::CancellationToken;
use crate::errors::{panic_message, EnrichError, StageFailure};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Checks whether a new stage may start: the run must not be cancelled and
/// must still be within its execution budget.
pub(crate) fn check_launch(
    config: &PipelineConfig,
    cancel: &CancellationToken,
    started: Instant,
) -> Result<(), EnrichError> {
    if cancel.is_cancelled() {
        let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
        return Err(EnrichError::Cancelled(reason));
    }
    config.check_budget(started.elapsed())
}

/// Runs a stage future, normalizing every failure to an [`EnrichError`].
///
/// With a timeout the future races a timer. If the timer wins, the stage's
/// token is cancelled and the future is dropped, so the stage stops at its
/// next suspension point. A panic inside the stage is coerced to a message.
pub(crate) async fn run_guarded<T, F>(
    stage: &str,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
    future: F,
) -> Result<T, EnrichError>
where
    F: Future<Output = Result<T, StageFailure>>,
{
    let guarded = AssertUnwindSafe(future).catch_unwind();

    let settled = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(settled) => settled,
            Err(_) => {
                let timeout_ms =
                    u64::try_from(limit.as_micros().div_ceil(1000)).unwrap_or(u64::MAX);
                cancel.cancel(format!("timed out after {timeout_ms}ms"));
                return Err(EnrichError::StageTimeout {
                    stage: stage.to_string(),
                    timeout_ms,
                });
            }
        },
        None => guarded.await,
    };

    match settled {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(failure)) => Err(EnrichError::stage(stage, failure.message)),
        Err(payload) => Err(EnrichError::stage(stage, panic_message(payload.as_ref()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_through() {
        let token = CancellationToken::new();
        let value = run_guarded("a", None, &token, async { Ok::<_, StageFailure>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_failure_is_normalized() {
        let token = CancellationToken::new();
        let err = run_guarded::<(), _>("a", None, &token, async { Err(StageFailure::new("boom")) })
            .await
            .unwrap_err();
        assert_eq!(err, EnrichError::stage("a", "boom"));
    }

    #[tokio::test]
    async fn test_timeout_cancels_token() {
        let token = CancellationToken::new();
        let start = Instant::now();
        let err = run_guarded::<(), _>(
            "slow",
            Some(Duration::from_millis(50)),
            &token,
            futures::future::pending(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.ledger_message(), "timed out after 50ms");
        assert!(token.is_cancelled());
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_sub_millisecond_timeout_rounds_up() {
        let token = CancellationToken::new();
        let err = run_guarded::<(), _>(
            "quick",
            Some(Duration::from_micros(500)),
            &token,
            futures::future::pending(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.ledger_message(), "timed out after 1ms");
    }

    #[tokio::test]
    async fn test_panic_is_coerced() {
        let token = CancellationToken::new();
        let err = run_guarded("p", None, &token, async {
            if token.reason().is_none() {
                panic!("kaboom");
            }
            Ok::<(), StageFailure>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.ledger_message(), "kaboom");
    }
}
