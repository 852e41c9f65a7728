//! Retry and backoff policy for reasoning-backend calls.

use crate::provider::BackendError;
use crate::types::ErrorKind;
use std::time::Duration;
use tracing::warn;

/// Configuration for the engine's recovery loops.
///
/// Defaults: 3 retries, 2s fixed rate-limit backoff, 3 rejected tool
/// outputs in a row, 3 context minimizations per backend call.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Failed decode or rate-limited attempts tolerated per backend call.
    pub max_retries: usize,
    /// Fixed sleep between rate-limited attempts.
    pub rate_limit_backoff: Duration,
    /// Consecutive tool outputs the context manager may reject before the
    /// agent gives up.
    pub max_rejections: usize,
    /// Context minimizations attempted per backend call.
    pub max_context_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            rate_limit_backoff: Duration::from_secs(2),
            max_rejections: 3,
            max_context_retries: 3,
        }
    }
}

impl RetryConfig {
    /// No retries: the first failure of any kind is terminal.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            max_context_retries: 0,
            ..Default::default()
        }
    }

    pub fn with_rate_limit_backoff(mut self, backoff: Duration) -> Self {
        self.rate_limit_backoff = backoff;
        self
    }
}

/// How the engine recovers from a failed backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Sleep and call again.
    Backoff,
    /// Prune observations and call again.
    Minimize,
    /// Give up immediately.
    Fatal,
}

impl BackendError {
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::RateLimited { .. } => Recovery::Backoff,
            Self::InvalidRequest(_) => Recovery::Minimize,
            _ => Recovery::Fatal,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            _ => ErrorKind::Backend,
        }
    }

    /// If this is a rate limit with a server-specified retry delay, return it.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

/// Log a retry attempt.
pub(crate) fn log_retry(agent: &str, attempt: usize, max: usize, delay: &Duration, error: &str) {
    warn!(
        "[{}] backend error (attempt {}/{}), retrying in {:.1}s: {}",
        agent,
        attempt,
        max,
        delay.as_secs_f64(),
        error
    );
}
