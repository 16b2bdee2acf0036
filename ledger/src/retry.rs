//! Classification of provider errors and the bounded back-off schedule.

use std::time::Duration;

/// How a failed RPC call should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Operator nonce collision; reset the nonce manager and retry.
    Nonce,
    /// Provider rate limit (code -32007 or equivalent); back off and retry.
    RateLimit,
    /// Transport-level failure; back off and retry.
    Transport,
    /// Revert or other chain rejection; do not retry.
    Terminal,
}

/// Providers disagree on error shapes, so classification is by message.
pub fn classify(message: &str) -> ErrorClass {
    let msg = message.to_ascii_lowercase();
    if msg.contains("nonce too low")
        || msg.contains("nonce already used")
        || msg.contains("already known")
        || msg.contains("replacement transaction underpriced")
        || msg.contains("invalid nonce")
    {
        ErrorClass::Nonce
    } else if msg.contains("-32007")
        || msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("429")
    {
        ErrorClass::RateLimit
    } else if msg.contains("revert") || msg.contains("execution reverted") {
        ErrorClass::Terminal
    } else if msg.contains("timed out")
        || msg.contains("timeout")
        || msg.contains("connection")
        || msg.contains("transport")
        || msg.contains("error sending request")
    {
        ErrorClass::Transport
    } else {
        ErrorClass::Terminal
    }
}

pub const MAX_ATTEMPTS: u32 = 3;

pub const NONCE_BACKOFF_CAP: Duration = Duration::from_secs(3);
pub const RATE_LIMIT_BACKOFF_CAP: Duration = Duration::from_secs(5);

/// Exponential back-off for the given (0-based) attempt, capped.
pub fn backoff_delay(attempt: u32, cap: Duration) -> Duration {
    let base = Duration::from_millis(250u64.saturating_mul(1 << attempt.min(6)));
    base.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(classify("nonce too low"), ErrorClass::Nonce);
        assert_eq!(classify("server returned -32007"), ErrorClass::RateLimit);
        assert_eq!(classify("Too Many Requests"), ErrorClass::RateLimit);
        assert_eq!(classify("execution reverted: pool closed"), ErrorClass::Terminal);
        assert_eq!(classify("error sending request"), ErrorClass::Transport);
        assert_eq!(classify("something else entirely"), ErrorClass::Terminal);
    }

    #[test]
    fn test_backoff_is_capped() {
        assert_eq!(backoff_delay(0, NONCE_BACKOFF_CAP), Duration::from_millis(250));
        assert_eq!(backoff_delay(1, NONCE_BACKOFF_CAP), Duration::from_millis(500));
        assert_eq!(backoff_delay(10, NONCE_BACKOFF_CAP), NONCE_BACKOFF_CAP);
        assert_eq!(backoff_delay(10, RATE_LIMIT_BACKOFF_CAP), RATE_LIMIT_BACKOFF_CAP);
    }
}
