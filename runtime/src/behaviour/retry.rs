use rivulet_core::{Callback, CancelScope, FlowError, RetryPolicy, Value};

/// Wrap a leaf producer so failed attempts are re-run under `policy`.
///
/// Only the producer is re-invoked. Operators above the leaf see a single
/// outcome, so their side effects are not repeated.
pub(super) fn wrap<T: Value>(producer: Callback<(), T>, policy: RetryPolicy) -> Callback<(), T> {
    Callback::scoped(move |(), scope| {
        let producer = producer.clone();
        let policy = policy.clone();
        async move { run_attempts(&producer, &policy, &scope).await }
    })
}

async fn run_attempts<T: Value>(
    producer: &Callback<(), T>,
    policy: &RetryPolicy,
    scope: &CancelScope,
) -> Result<T, FlowError> {
    let mut attempt = 1;
    loop {
        let err = match producer.invoke((), scope).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !policy.is_retryable(&err) {
            tracing::debug!(attempt, error = %err, kind = ?err.kind(), "failure is not retryable");
            return Err(err);
        }
        if attempt >= policy.max_attempts() {
            tracing::warn!(attempts = attempt, error = %err, "retry attempts exhausted");
            return Err(err);
        }
        if scope.is_cancelled() {
            return Err(err);
        }

        tracing::debug!(attempt, max = policy.max_attempts(), error = %err, "attempt failed; retrying");
        if !policy.delay().is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(policy.delay()) => {}
                _ = scope.cancelled() => return Err(err),
            }
        }
        attempt += 1;
    }
}
