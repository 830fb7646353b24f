use crate::sources::SourceError;
use crate::storage::StorageError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Errors that may succeed when the same call is repeated
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        SourceError::is_transient(self)
    }
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        StorageError::is_transient(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("{what} failed after {attempts} attempts: {last}")]
    Exhausted {
        what: String,
        attempts: u32,
        #[source]
        last: E,
    },

    #[error("{what} failed: {source}")]
    Permanent {
        what: String,
        #[source]
        source: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The error of the final attempt
    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Permanent { source, .. } => source,
        }
    }
}

/// Fixed-interval retry for transient failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    /// `attempts` counts the first call; zero is treated as one
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: Transient + std::error::Error + 'static,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("✅ {} succeeded on attempt {}", what, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    return Err(RetryError::Permanent {
                        what: what.to_string(),
                        source: e,
                    });
                }
                Err(e) if attempt >= self.attempts => {
                    return Err(RetryError::Exhausted {
                        what: what.to_string(),
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    log::warn!(
                        "⏳ {} failed ({}), retry attempt {} of {} in {}ms",
                        what,
                        e,
                        attempt + 1,
                        self.attempts,
                        self.interval.as_millis()
                    );
                    sleep(self.interval).await;
                    attempt += 1;
                }
            }
        }
    }
}
