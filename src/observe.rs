use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::{is_success_status, mime, Method};

/// Snapshot of a request handed to lifecycle observers.
#[derive(Clone, Debug, Default)]
pub struct RequestInfo {
    pub url: String,
    pub method: Method,
    pub attempt: u32,
    pub request_body: Option<String>,
    pub request_headers: Vec<(String, String)>,
    /// `None` until a status code is known.
    pub status: Option<u16>,
    pub response_body: Option<String>,
    pub response_headers: Vec<(String, String)>,
    pub elapsed: Duration,
    /// Response size in bytes.
    pub size: usize,
    /// Coarse category of the response content type, e.g. `json` or `texture`.
    pub kind: String,
    pub error: Option<String>,
}

impl RequestInfo {
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(is_success_status)
    }

    pub fn time_label(&self) -> String {
        format!("{:.1} s", self.elapsed.as_secs_f64())
    }

    pub(crate) fn set_response_kind(&mut self) {
        let content_type = self
            .response_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.as_str())
            .unwrap_or_default();
        self.kind = mime::friendly_content_type(content_type).to_owned();
    }
}

/// Request lifecycle hooks. Every method defaults to a no-op.
pub trait Observer: Send + Sync {
    fn on_request_start(&self, _info: &RequestInfo) {}

    /// Called once per attempt, whatever the outcome.
    fn on_request_finish(&self, _info: &RequestInfo) {}

    fn on_retry_scheduled(&self, _info: &RequestInfo, _delay: Duration) {}
}

pub(crate) fn notify<F>(observers: &[Arc<dyn Observer>], event: F)
where
    F: Fn(&dyn Observer),
{
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| event(observer.as_ref()))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("request observer panicked");
        }
    }
}

/// Logs the request lifecycle through `tracing`.
#[cfg(feature = "tracing")]
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

#[cfg(feature = "tracing")]
impl Observer for TracingObserver {
    fn on_request_start(&self, info: &RequestInfo) {
        tracing::debug!(
            method = %info.method,
            url = %info.url,
            attempt = info.attempt,
            "request started"
        );
    }

    fn on_request_finish(&self, info: &RequestInfo) {
        match (&info.error, info.status) {
            (Some(error), _) => tracing::warn!(
                method = %info.method,
                url = %info.url,
                attempt = info.attempt,
                elapsed = %info.time_label(),
                error = %error,
                "request failed"
            ),
            (None, status) => tracing::debug!(
                method = %info.method,
                url = %info.url,
                attempt = info.attempt,
                status = status.unwrap_or_default(),
                size = info.size,
                kind = %info.kind,
                elapsed = %info.time_label(),
                "request finished"
            ),
        }
    }

    fn on_retry_scheduled(&self, info: &RequestInfo, delay: Duration) {
        tracing::info!(
            method = %info.method,
            url = %info.url,
            attempt = info.attempt,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
    }
}
