//! Optimistic-concurrency retry loop.

use std::future::Future;

use crate::error::DocmapResult;

/// Runs `action` until it succeeds or attempts are exhausted.
///
/// [`DocmapError::Retry`](crate::error::DocmapError::Retry) always triggers
/// another attempt; any other error only does so when `retry_on_error` is
/// set. The final attempt's error is returned as-is. `repeats` is treated as
/// at least one.
pub async fn optimistic<T, F, Fut>(
    mut action: F,
    repeats: u32,
    retry_on_error: bool,
) -> DocmapResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DocmapResult<T>>,
{
    let attempts = repeats.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match action().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let exhausted = attempt >= attempts;
                let retryable = err.is_retry() || retry_on_error;
                if exhausted || !retryable {
                    return Err(err);
                }
                tracing::debug!(attempt, error = %err, "retrying optimistic action");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocmapError;
    use futures::executor::block_on;
    use std::cell::Cell;

    #[test]
    fn succeeds_without_retrying() {
        let calls = Cell::new(0);
        let result = block_on(optimistic(
            || {
                calls.set(calls.get() + 1);
                async { Ok(42) }
            },
            3,
            false,
        ));
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retry_signal_repeats_until_success() {
        let calls = Cell::new(0);
        let result = block_on(optimistic(
            || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 3 { Err(DocmapError::Retry) } else { Ok("done") }
                }
            },
            5,
            false,
        ));
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retry_signal_exhausts_attempts() {
        let calls = Cell::new(0);
        let result: DocmapResult<()> = block_on(optimistic(
            || {
                calls.set(calls.get() + 1);
                async { Err(DocmapError::Retry) }
            },
            3,
            false,
        ));
        assert!(matches!(result, Err(DocmapError::Retry)));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn other_errors_fail_fast_by_default() {
        let calls = Cell::new(0);
        let result: DocmapResult<()> = block_on(optimistic(
            || {
                calls.set(calls.get() + 1);
                async { Err(DocmapError::Operation("boom".into())) }
            },
            3,
            false,
        ));
        assert!(matches!(result, Err(DocmapError::Operation(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retry_on_error_covers_other_errors() {
        let calls = Cell::new(0);
        let result = block_on(optimistic(
            || {
                calls.set(calls.get() + 1);
                let attempt = calls.get();
                async move {
                    if attempt < 2 {
                        Err(DocmapError::Operation("transient".into()))
                    } else {
                        Ok(())
                    }
                }
            },
            3,
            true,
        ));
        assert!(result.is_ok());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn zero_repeats_still_runs_once() {
        let calls = Cell::new(0);
        let result = block_on(optimistic(
            || {
                calls.set(calls.get() + 1);
                async { Ok(()) }
            },
            0,
            false,
        ));
        assert!(result.is_ok());
        assert_eq!(calls.get(), 1);
    }
}
