//! Retry classification and exponential backoff
//!
//! Two layers decide whether a task runs again:
//! - [`IsRetryable`] classifies a single transfer failure as transient or permanent.
//!   The worker uses it to pick between [`StatusCode::WaitingToRetry`] and a terminal status.
//! - [`RetryClassifier`] maps the status a worker left behind to what the engine
//!   should do next.
//!
//! [`retry_delay`] computes the backoff the engine waits, outside any
//! execution slot, before a `WaitingToRetry` task rejoins the wait queue.

use crate::config::RetryConfig;
use crate::error::{Error, TransferError};
use crate::types::StatusCode;
use rand::Rng;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, connection resets, 5xx) should return `true`.
/// Permanent failures (4xx, local write errors, bad URLs) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            TransferError::Timeout(_) | TransferError::Connect(_) | TransferError::Stream(_) => {
                true
            }
            // Request timeout and rate limiting are worth another attempt
            TransferError::Http { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            TransferError::InvalidUrl(_) => false,
            // Disk full or permission problems will not fix themselves
            TransferError::Write { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transfer(e) => e.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Config { .. }
            | Error::Storage(_)
            | Error::Fs(_)
            | Error::PostProcess(_)
            | Error::NotFound(_)
            | Error::ShuttingDown
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// What the engine does with a task after its worker exits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Run again once the backoff has elapsed
    RetryNow,
    /// Run again once the network allows it
    RetryAfterNetwork,
    /// Server wants credentials; terminal until the user acts
    NeedsAuthorization,
    /// Proxy wants credentials; terminal until the user acts
    NeedsProxyAuthorization,
    /// Finished successfully
    TerminalSuccess,
    /// Finished with an error
    TerminalError,
    /// Paused, stopped or otherwise not finished; nothing to do
    NoAction,
}

/// Maps a task's stored status to a [`RetryDecision`]
pub struct RetryClassifier;

impl RetryClassifier {
    /// Classify the status a worker left behind
    pub fn classify(status: StatusCode) -> RetryDecision {
        match status {
            StatusCode::WaitingToRetry => RetryDecision::RetryNow,
            StatusCode::WaitingForNetwork => RetryDecision::RetryAfterNetwork,
            StatusCode::Unauthorized => RetryDecision::NeedsAuthorization,
            StatusCode::ProxyAuthRequired => RetryDecision::NeedsProxyAuthorization,
            StatusCode::Success => RetryDecision::TerminalSuccess,
            StatusCode::Error | StatusCode::ChecksumError | StatusCode::Http(_) => {
                RetryDecision::TerminalError
            }
            StatusCode::Queued
            | StatusCode::Running
            | StatusCode::Paused
            | StatusCode::Stopped => RetryDecision::NoAction,
        }
    }
}

/// Backoff before retry number `attempt` (1-based)
///
/// Grows by `backoff_multiplier` per attempt, capped at `max_delay`, with
/// optional jitter on top.
pub fn retry_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let secs = config.initial_delay.as_secs_f64() * config.backoff_multiplier.powi(exponent);
    let delay = Duration::from_secs_f64(secs.min(config.max_delay.as_secs_f64()));

    if config.jitter {
        add_jitter(delay)
    } else {
        delay
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay.
/// This means the actual delay will be between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
