//! Retry with exponential backoff for transient sheet failures.
//!
//! Auth, permission, and not-found errors fail fast; network,
//! rate-limit and 5xx errors are retried up to a fixed count.

use std::future::Future;
use std::time::Duration;

use common::{Error, SheetErrorKind};
use tokio::time::sleep;
use tracing::warn;

/// Map an HTTP status to a sheet error kind.
pub fn classify_status(status: u16) -> SheetErrorKind {
    match status {
        401 => SheetErrorKind::Auth,
        403 => SheetErrorKind::Permission,
        404 => SheetErrorKind::NotFound,
        408 => SheetErrorKind::Timeout,
        429 => SheetErrorKind::RateLimited,
        500..=599 => SheetErrorKind::Server,
        _ => SheetErrorKind::BadRequest,
    }
}

/// Map a reqwest transport error to a sheet error.
pub fn classify_transport(err: reqwest::Error) -> Error {
    let kind = if err.is_timeout() {
        SheetErrorKind::Timeout
    } else if err.is_builder() || err.is_request() {
        // Malformed URL or request — retrying will not help.
        SheetErrorKind::BadRequest
    } else {
        SheetErrorKind::Network
    };
    Error::SheetApi {
        kind,
        message: err.to_string(),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Run `op`, retrying retryable failures with doubling backoff.
    /// The final failure is returned to the caller.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.retryable() && attempt < self.max_attempts => {
                    warn!(
                        "sheet read failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.max_attempts, delay, err
                    );
                    sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> Error {
        Error::SheetApi {
            kind: SheetErrorKind::Server,
            message: "boom".into(),
        }
    }

    fn fatal() -> Error {
        Error::SheetApi {
            kind: SheetErrorKind::Permission,
            message: "forbidden".into(),
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(401), SheetErrorKind::Auth);
        assert_eq!(classify_status(403), SheetErrorKind::Permission);
        assert_eq!(classify_status(404), SheetErrorKind::NotFound);
        assert_eq!(classify_status(429), SheetErrorKind::RateLimited);
        assert_eq!(classify_status(503), SheetErrorKind::Server);
        assert_eq!(classify_status(400), SheetErrorKind::BadRequest);
        assert!(classify_status(429).retryable());
        assert!(!classify_status(403).retryable());
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result = policy
            .run(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_fails_fast() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(fatal()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_reraise_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
