use std::time::{Duration, SystemTime};

use crate::{is_success_status, Method, TransportErrorKind};

/// Transport-level classification of a finished attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttemptResult {
    /// A status code was obtained and the body was processed.
    Success,
    /// No status code: DNS, connect, timeout or cancellation.
    ConnectionError,
    /// The server answered with a non-2xx status code.
    ProtocolError,
    /// A status code was obtained but the body could not be processed.
    DataProcessingError,
}

/// Everything known about one attempt, handed to the retry predicate.
#[derive(Clone, Debug)]
pub struct AttemptOutcome {
    pub attempt: u32,
    pub max_attempts: u32,
    pub method: Method,
    pub url: String,
    pub duration: Duration,
    pub timestamp: SystemTime,
    pub result: AttemptResult,
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub transport_error: Option<TransportErrorKind>,
    /// Rendered error of the attempt, if any.
    pub error: Option<String>,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        self.result == AttemptResult::Success && self.status.is_some_and(is_success_status)
    }
}

/// Decides whether a failed attempt is followed by another one.
///
/// Only consulted while attempts remain and no abort was raised.
pub trait RetryPredicate: Send + Sync {
    fn should_retry(&self, outcome: &AttemptOutcome) -> bool;
}

impl<F> RetryPredicate for F
where
    F: Fn(&AttemptOutcome) -> bool + Send + Sync,
{
    fn should_retry(&self, outcome: &AttemptOutcome) -> bool {
        self(outcome)
    }
}

/// Default policy: retry any failure of GET, HEAD and OPTIONS, never retry other methods.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdempotentRetry;

impl RetryPredicate for IdempotentRetry {
    fn should_retry(&self, outcome: &AttemptOutcome) -> bool {
        outcome.method.is_idempotent() && !outcome.is_success()
    }
}

/// Retries every failed attempt regardless of method.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysRetry;

impl RetryPredicate for AlwaysRetry {
    fn should_retry(&self, outcome: &AttemptOutcome) -> bool {
        !outcome.is_success()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::{Duration, SystemTime};

    use super::{AlwaysRetry, AttemptOutcome, AttemptResult, IdempotentRetry, RetryPredicate};
    use crate::{Method, TransportErrorKind};

    pub(crate) fn outcome(method: Method, result: AttemptResult, status: Option<u16>) -> AttemptOutcome {
        AttemptOutcome {
            attempt: 1,
            max_attempts: 3,
            method,
            url: "http://localhost/items".to_owned(),
            duration: Duration::from_millis(3),
            timestamp: SystemTime::now(),
            result,
            status,
            headers: vec![],
            body: vec![],
            transport_error: (result == AttemptResult::ConnectionError)
                .then_some(TransportErrorKind::Connect),
            error: None,
        }
    }

    #[test]
    fn idempotent_methods_retry_any_failure() {
        for method in [Method::Get, Method::Head, Method::Options] {
            assert!(IdempotentRetry.should_retry(&outcome(method, AttemptResult::ConnectionError, None)));
            assert!(IdempotentRetry.should_retry(&outcome(method, AttemptResult::ProtocolError, Some(503))));
            assert!(!IdempotentRetry.should_retry(&outcome(method, AttemptResult::Success, Some(200))));
        }
    }

    #[test]
    fn non_idempotent_methods_never_retry_by_default() {
        for method in [Method::Post, Method::Put, Method::Patch, Method::Delete] {
            assert!(!IdempotentRetry.should_retry(&outcome(method, AttemptResult::ConnectionError, None)));
            assert!(!IdempotentRetry.should_retry(&outcome(method, AttemptResult::ProtocolError, Some(500))));
        }
        assert!(AlwaysRetry.should_retry(&outcome(Method::Post, AttemptResult::ProtocolError, Some(500))));
    }

    #[test]
    fn closures_are_predicates() {
        let only_503 = |outcome: &AttemptOutcome| outcome.status == Some(503);
        assert!(only_503.should_retry(&outcome(Method::Post, AttemptResult::ProtocolError, Some(503))));
        assert!(!only_503.should_retry(&outcome(Method::Get, AttemptResult::ProtocolError, Some(500))));
    }
}
