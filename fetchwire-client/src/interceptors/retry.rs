//! Retrying transient failures.

use fetchwire_core::{Error, ErrorKind, Request, Response};
use http::Method;

use crate::config::RetryPolicy;
use crate::interceptor::{ApplicationInterceptor, ApplicationNext, BoxFuture};

/// Retry requests that failed with a transient error.
///
/// - `Connection` errors happen before anything is sent and are always
///   retried.
/// - `Socket` and `Timeout` errors may have reached the server and are only
///   retried for idempotent methods.
/// - Every attempt sends a fresh [`try_clone`](Request::try_clone) of the
///   original. Requests with streaming bodies are sent once.
///
/// Waits between attempts follow the policy's backoff and end early if the
/// call is cancelled.
#[derive(Clone, Debug, Default)]
pub struct RetryRequests {
    policy: RetryPolicy,
}

impl RetryRequests {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

fn should_retry(error: &Error, method: &Method) -> bool {
    match error.kind() {
        ErrorKind::Connection => true,
        ErrorKind::Socket | ErrorKind::Timeout => is_idempotent(method),
        _ => false,
    }
}

impl ApplicationInterceptor for RetryRequests {
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let mut backoff = self.policy.backoff();
            loop {
                let Some(attempt) = request.try_clone() else {
                    return next.run(request).await;
                };
                let error = match next.run(attempt).await {
                    Ok(response) => return Ok(response),
                    Err(error) => error,
                };
                if !backoff.can_retry() || !should_retry(&error, request.method()) {
                    return Err(error);
                }

                let delay = backoff.next_delay();
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    uri = %request.uri(),
                    attempt = backoff.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying request"
                );
                tokio::select! {
                    reason = next.cancellation().cancelled() => return Err(reason),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        })
    }

    fn name(&self) -> &str {
        "RetryRequests"
    }
}
