//! Retry utilities for RPC calls
//!
//! Reads against a chain are wrapped at the call site with [`with_retry`];
//! transaction submission is never retried here because a resend must go
//! through the watcher's sent-at guard.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ChainError;

/// Backoff for chain reads: the delay doubles per attempt up to `max_backoff`
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt + 1`
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

/// Classifies RPC error messages
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Temporary failure (timeout, rate limit, gateway errors, underpriced replacement)
    Transient,
    /// Nonce already used; the transaction may or may not be ours
    NonceTooLow,
    /// The call reverted or could not be executed
    CallException,
    /// Unknown error
    Unknown,
}

/// Classify an RPC error message
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("429")
        || error_lower.contains("502")
        || error_lower.contains("503")
        || error_lower.contains("504")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("header not found")
        || error_lower.contains("underpriced")
        || error_lower.contains("replacement transaction")
    {
        return ErrorClass::Transient;
    }

    if error_lower.contains("nonce too low")
        || error_lower.contains("nonce has already been used")
        || error_lower.contains("already known")
    {
        return ErrorClass::NonceTooLow;
    }

    if error_lower.contains("execution reverted")
        || error_lower.contains("reverted")
        || error_lower.contains("call exception")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
        || error_lower.contains("gas required exceeds")
    {
        return ErrorClass::CallException;
    }

    ErrorClass::Unknown
}

/// Run `operation` until it succeeds, fails with a non-transient error, or
/// the retry budget is spent.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    label: &str,
    mut operation: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && attempt < config.max_retries => {
                let backoff = config.backoff_for_attempt(attempt);
                attempt += 1;
                warn!(
                    call = label,
                    attempt,
                    max = config.max_retries,
                    ?backoff,
                    error = %e,
                    "Retrying after backoff"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => {
                debug!(call = label, attempt, error = %e, "Giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_doubles_until_cap() {
        let config = RetryConfig::default();
        let delays: Vec<u64> = (0..6)
            .map(|n| config.backoff_for_attempt(n).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60]);
        assert_eq!(config.backoff_for_attempt(40), Duration::from_secs(60));
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify_error("connection timeout"), ErrorClass::Transient);
        assert_eq!(
            classify_error("replacement transaction underpriced"),
            ErrorClass::Transient
        );
        assert_eq!(classify_error("nonce too low"), ErrorClass::NonceTooLow);
        assert_eq!(classify_error("execution reverted"), ErrorClass::CallException);
        assert_eq!(classify_error("some unknown error"), ErrorClass::Unknown);
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast(), "getCredit", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ChainError::Transient("503 service unavailable".into()))
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
    async fn test_with_retry_stops_on_permanent() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "bondWithdrawal", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainError::CallException("execution reverted".into())) }
        })
        .await;

        assert!(matches!(result, Err(ChainError::CallException(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast(), "getLogs", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ChainError::Transient("timeout".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
