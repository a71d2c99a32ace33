use std::sync::Arc;
use std::time::{Instant, SystemTime};

use serde::de::DeserializeOwned;

use crate::handler::{run_chain, HandlerInput};
use crate::negotiate::{negotiate_options, EncodedBody};
use crate::observe::{notify, Observer, RequestInfo};
use crate::query::build_url;
use crate::response::ResponseMeta;
use crate::retry::{AttemptOutcome, AttemptResult};
use crate::transport::{RequestDescriptor, Transport, TransportFailure};
use crate::{
    is_success_status, AbortController, Body, FetchError, Method, RequestOptions, Response,
    ResponseProcessor, Result, StatusPolicy, TransportErrorKind,
};

/// What to call, independent of configuration.
#[derive(Clone, Debug)]
pub(crate) struct Call<'a> {
    pub(crate) method: Method,
    pub(crate) path: &'a str,
    pub(crate) body: Option<&'a Body>,
    /// Used for content type negotiation only.
    pub(crate) file_name: Option<&'a str>,
}

impl<'a> Call<'a> {
    pub(crate) fn new(method: Method, path: &'a str) -> Self {
        Self {
            method,
            path,
            body: None,
            file_name: None,
        }
    }

    pub(crate) fn body(mut self, body: Option<&'a Body>) -> Self {
        self.body = body;
        self
    }

    pub(crate) fn file_name(mut self, file_name: Option<&'a str>) -> Self {
        self.file_name = file_name;
        self
    }
}

/// Drives one logical call through its attempts.
#[derive(Clone)]
pub(crate) struct Engine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) observers: Vec<Arc<dyn Observer>>,
}

fn snapshot<F>(options: &RequestOptions, configure: &F) -> RequestOptions
where
    F: Fn(&mut RequestOptions),
{
    let mut snapshot = options.clone();
    configure(&mut snapshot);
    snapshot
}

fn is_aborted(abort: Option<&AbortController>) -> bool {
    abort.is_some_and(AbortController::is_aborted)
}

fn aborted(method: Method, url: &str, attempt: u32) -> FetchError {
    #[cfg(feature = "tracing")]
    tracing::debug!(%method, url, attempt, "request aborted");
    #[cfg(not(feature = "tracing"))]
    let _ = (method, url);
    FetchError::Aborted { attempt }
}

impl Engine {
    /// Runs `call` until it succeeds, the retry predicate declines, attempts
    /// run out or the abort signal is raised.
    ///
    /// `configure` is applied to a fresh clone of `options` before every
    /// attempt, so dynamic values are recomputed each time.
    pub(crate) async fn execute<T, F>(
        &self,
        options: &RequestOptions,
        call: Call<'_>,
        configure: F,
    ) -> Result<Response<T>>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(&mut RequestOptions) + Send + Sync,
    {
        let preflight = snapshot(options, &configure);
        let retry_count = u32::try_from(preflight.retry_count).map_err(|_| {
            FetchError::Configuration(format!(
                "retry count must not be negative, got {}",
                preflight.retry_count
            ))
        })?;
        let max_attempts = retry_count.saturating_add(1);
        drop(preflight);

        let mut status_policy = StatusPolicy::Response;
        let mut last: Option<Result<Response<T>>> = None;

        for attempt in 1..=max_attempts {
            let mut snapshot = snapshot(options, &configure);
            let abort = snapshot.abort_controller.clone();
            if is_aborted(abort.as_ref()) {
                return Err(aborted(call.method, call.path, attempt));
            }
            status_policy = snapshot.status_policy;

            let url = build_url(
                &snapshot.base_url,
                call.path,
                &snapshot.route_parameters,
                &snapshot.query_parameters,
            )?;
            let encoded = match call.body {
                Some(body) => Some(negotiate_options(&mut snapshot, body, call.file_name)?),
                None => None,
            };
            let processor = ResponseProcessor::select(call.method, &snapshot.artifact);
            let headers = snapshot.headers.resolve();
            let request_body = encoded.as_ref().map(EncodedBody::describe);
            let (content_type, body_bytes) = match encoded {
                Some(encoded) => (Some(encoded.content_type), Some(encoded.bytes)),
                None => (snapshot.content_type(), None),
            };
            let descriptor = RequestDescriptor::new(
                call.method,
                url.clone(),
                content_type,
                body_bytes,
                headers.clone(),
                snapshot.timeout,
            );

            let mut info = RequestInfo {
                url: url.clone(),
                method: call.method,
                attempt,
                request_body,
                request_headers: headers.clone(),
                ..RequestInfo::default()
            };
            notify(&self.observers, |observer| observer.on_request_start(&info));

            let timestamp = SystemTime::now();
            let started = Instant::now();
            let sent = match &abort {
                Some(abort) => tokio::select! {
                    biased;
                    _ = abort.aborted() => Err(TransportFailure::new(
                        TransportErrorKind::Cancelled,
                        "request aborted",
                    )),
                    sent = self.transport.send(&descriptor) => sent,
                },
                None => self.transport.send(&descriptor).await,
            };
            let duration = started.elapsed();
            info.elapsed = duration;

            let mut outcome = AttemptOutcome {
                attempt,
                max_attempts,
                method: call.method,
                url: url.clone(),
                duration,
                timestamp,
                result: AttemptResult::ConnectionError,
                status: None,
                headers: Vec::new(),
                body: Vec::new(),
                transport_error: None,
                error: None,
            };

            match sent {
                Err(failure) => {
                    info.error = Some(failure.to_string());
                    notify(&self.observers, |observer| observer.on_request_finish(&info));

                    outcome.transport_error = Some(failure.kind);
                    outcome.error = Some(failure.to_string());
                    last = Some(Err(FetchError::Transport {
                        kind: failure.kind,
                        method: call.method,
                        url: url.clone(),
                        message: failure.message,
                    }));
                }
                Ok(received) => {
                    let raw_content = processor.raw_text(&received.body);
                    info.status = Some(received.status);
                    info.size = received.downloaded_bytes();
                    info.response_headers = received.headers.clone();
                    info.response_body = raw_content.clone();
                    info.set_response_kind();
                    notify(&self.observers, |observer| observer.on_request_finish(&info));

                    let meta = ResponseMeta {
                        status: received.status,
                        raw_content,
                        request_headers: headers,
                        response_headers: received.headers.clone(),
                        method: call.method,
                        duration,
                        timestamp,
                        attempts: attempt,
                    };
                    outcome.status = Some(received.status);
                    outcome.headers = received.headers;

                    let success = is_success_status(received.status);
                    let materialized = if success {
                        processor
                            .materialize::<T>(
                                &received.body,
                                snapshot.serializer.as_ref(),
                                &snapshot.flags,
                                snapshot.artifact_decoder.as_ref(),
                            )
                            .map(|materialized| (materialized.content, materialized.artifact))
                    } else {
                        Ok((
                            processor.materialize_lenient::<T>(
                                &received.body,
                                snapshot.serializer.as_ref(),
                                &snapshot.flags,
                            ),
                            None,
                        ))
                    };
                    outcome.body = received.body;

                    match materialized {
                        Ok((content, artifact)) => {
                            outcome.result = if success {
                                AttemptResult::Success
                            } else {
                                AttemptResult::ProtocolError
                            };
                            let response = Response::from_parts(meta, content, artifact);
                            let handlers = if success {
                                &snapshot.success_handlers
                            } else {
                                &snapshot.error_handlers
                            };
                            let input = HandlerInput {
                                typed: &response,
                                meta: response.meta(),
                            };
                            run_chain(handlers, &input, snapshot.serializer.as_ref(), &snapshot.flags);
                            last = Some(Ok(response));
                        }
                        Err(err) => {
                            outcome.result = AttemptResult::DataProcessingError;
                            outcome.error = Some(err.to_string());
                            last = Some(Err(err));
                        }
                    }
                }
            }

            if outcome.is_success() {
                break;
            }
            if is_aborted(abort.as_ref()) {
                return Err(aborted(call.method, &url, attempt));
            }
            if attempt >= max_attempts || !snapshot.retry_predicate.should_retry(&outcome) {
                break;
            }

            let delay = snapshot.retry_delay;
            #[cfg(feature = "tracing")]
            tracing::debug!(
                method = %call.method,
                url = %url,
                attempt,
                "retrying request after {} ms",
                delay.as_millis()
            );
            notify(&self.observers, |observer| observer.on_retry_scheduled(&info, delay));

            match &abort {
                Some(abort) => {
                    tokio::select! {
                        biased;
                        _ = abort.aborted() => return Err(aborted(call.method, &url, attempt)),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }

        match last {
            Some(Ok(response)) if status_policy == StatusPolicy::Error && !response.is_success() => {
                Err(FetchError::Status {
                    status: response.status(),
                    body: response.raw_content().unwrap_or_default().to_owned(),
                })
            }
            Some(result) => result,
            None => Err(FetchError::Configuration(
                "request finished without any attempt".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{Call, Engine};
    use crate::transport::{RequestDescriptor, Transport, TransportFailure, TransportResponse};
    use crate::{
        AbortController, Body, FetchError, Method, Observer, RequestInfo, RequestOptions,
        StatusPolicy, TransportErrorKind,
    };

    /// Replays canned results in order and records every request it sees.
    #[derive(Default)]
    struct Scripted {
        script: Mutex<Vec<Result<TransportResponse, TransportFailure>>>,
        seen: Mutex<Vec<RequestDescriptor>>,
    }

    impl Scripted {
        fn new(mut script: Vec<Result<TransportResponse, TransportFailure>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(
            &self,
            request: &RequestDescriptor,
        ) -> Result<TransportResponse, TransportFailure> {
            self.seen.lock().expect("lock").push(request.clone());
            self.script
                .lock()
                .expect("lock")
                .pop()
                .unwrap_or_else(|| Ok(TransportResponse::new(200, "null")))
        }
    }

    fn refused() -> Result<TransportResponse, TransportFailure> {
        Err(TransportFailure::new(TransportErrorKind::Connect, "connection refused"))
    }

    fn engine(transport: Arc<Scripted>) -> Engine {
        Engine {
            transport,
            observers: Vec::new(),
        }
    }

    fn options(retry_count: i32) -> RequestOptions {
        let mut options = RequestOptions::new();
        options.set_base_url("http://api.test").set_retry_count(retry_count);
        options
    }

    #[tokio::test]
    async fn negative_retry_count_fails_before_io() {
        let transport = Scripted::new(vec![]);
        let err = engine(transport.clone())
            .execute::<Value, _>(&options(-1), Call::new(Method::Get, "items"), |_| {})
            .await
            .expect_err("must fail");
        assert!(matches!(err, FetchError::Configuration(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn get_retries_transport_failures_until_success() {
        let transport = Scripted::new(vec![
            refused(),
            refused(),
            Ok(TransportResponse::new(200, r#"{"id":1}"#)),
        ]);
        let response = engine(transport.clone())
            .execute::<Value, _>(&options(2), Call::new(Method::Get, "items/1"), |_| {})
            .await
            .expect("third attempt must succeed");

        assert!(response.is_success());
        assert_eq!(response.attempts(), 3);
        assert_eq!(response.content(), Some(&json!({"id": 1})));
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn post_is_not_retried_by_default() {
        let transport = Scripted::new(vec![refused(), Ok(TransportResponse::new(200, "{}"))]);
        let err = engine(transport.clone())
            .execute::<Value, _>(
                &options(3),
                Call::new(Method::Post, "items").body(Some(&Body::Value(json!({"a": 1})))),
                |_| {},
            )
            .await
            .expect_err("transport error must surface");

        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Connect));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_unsuccessful_response() {
        let transport = Scripted::new(vec![
            Ok(TransportResponse::new(503, "busy")),
            Ok(TransportResponse::new(503, "still busy")),
        ]);
        let response = engine(transport.clone())
            .execute::<Value, _>(&options(1), Call::new(Method::Get, "items"), |_| {})
            .await
            .expect("protocol failure is a response");

        assert_eq!(response.status(), 503);
        assert_eq!(response.raw_content(), Some("still busy"));
        assert_eq!(response.attempts(), 2);
        assert!(response.content().is_none());
    }

    #[tokio::test]
    async fn status_policy_error_turns_final_response_into_error() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(404, "missing"))]);
        let mut options = options(0);
        options.set_status_policy(StatusPolicy::Error);
        let err = engine(transport)
            .execute::<Value, _>(&options, Call::new(Method::Get, "items/9"), |_| {})
            .await
            .expect_err("must fail");
        assert!(matches!(err, FetchError::Status { status: 404, ref body } if body == "missing"));
    }

    #[tokio::test]
    async fn configure_runs_for_every_attempt() {
        let transport = Scripted::new(vec![refused(), Ok(TransportResponse::new(200, "1"))]);
        let counter = Arc::new(AtomicUsize::new(0));
        let source = counter.clone();
        engine(transport.clone())
            .execute::<u32, _>(&options(1), Call::new(Method::Get, "count"), move |options| {
                let attempt = source.fetch_add(1, Ordering::SeqCst);
                options.set_header("X-Attempt", attempt.to_string());
            })
            .await
            .expect("must succeed");

        let seen = transport.seen.lock().expect("lock");
        let attempt_headers: Vec<_> = seen
            .iter()
            .map(|request| {
                request
                    .headers()
                    .iter()
                    .find(|(name, _)| name == "X-Attempt")
                    .map(|(_, value)| value.clone())
            })
            .collect();
        // one preflight run validates the retry count before the first attempt
        assert_eq!(attempt_headers, [Some("1".to_owned()), Some("2".to_owned())]);
    }

    #[tokio::test]
    async fn content_type_and_url_reach_the_transport() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(201, "{}"))]);
        let mut options = options(0);
        options.add_route_parameter(5).add_query_parameter("full", true);
        engine(transport.clone())
            .execute::<Value, _>(
                &options,
                Call::new(Method::Put, "users/{id}").body(Some(&Body::text("hello"))),
                |_| {},
            )
            .await
            .expect("must succeed");

        let seen = transport.seen.lock().expect("lock");
        assert_eq!(seen[0].url(), "http://api.test/users/5?full=true");
        assert_eq!(seen[0].content_type(), Some("text/plain"));
        assert_eq!(seen[0].body(), Some(&b"hello"[..]));
        assert!(seen[0]
            .headers()
            .iter()
            .any(|(name, value)| name == "Content-Type" && value == "text/plain"));
    }

    #[tokio::test]
    async fn argument_errors_surface_without_io() {
        let transport = Scripted::new(vec![]);
        let mut options = options(2);
        options.set_content_type("application/graphql");
        let err = engine(transport.clone())
            .execute::<Value, _>(
                &options,
                Call::new(Method::Get, "graphql").body(Some(&Body::Value(json!({"q": 1})))),
                |_| {},
            )
            .await
            .expect_err("must fail");
        assert!(matches!(err, FetchError::Argument(_)));
        assert_eq!(transport.calls(), 0);
    }

    struct AbortOnFinish(AbortController);

    impl Observer for AbortOnFinish {
        fn on_request_finish(&self, _info: &RequestInfo) {
            self.0.abort();
        }
    }

    #[tokio::test]
    async fn abort_takes_precedence_over_retry() {
        let transport = Scripted::new(vec![refused(), Ok(TransportResponse::new(200, "{}"))]);
        let controller = AbortController::new();
        let mut options = options(3);
        options.set_abort_controller(controller.clone());
        let engine = Engine {
            transport: transport.clone(),
            observers: vec![Arc::new(AbortOnFinish(controller))],
        };

        let err = engine
            .execute::<Value, _>(&options, Call::new(Method::Get, "items"), |_| {})
            .await
            .expect_err("must abort");
        assert!(matches!(err, FetchError::Aborted { attempt: 1 }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn abort_cancels_retry_delay() {
        let transport = Scripted::new(vec![refused()]);
        let controller = AbortController::new();
        let mut options = options(1);
        options
            .set_abort_controller(controller.clone())
            .set_retry_delay(Duration::from_secs(30));

        let trigger = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.abort();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            engine(transport).execute::<Value, _>(&options, Call::new(Method::Get, "items"), |_| {}),
        )
        .await
        .expect("abort must interrupt the delay")
        .expect_err("must abort");
        assert!(matches!(err, FetchError::Aborted { attempt: 1 }));
    }

    #[tokio::test]
    async fn decode_failure_on_success_status_is_an_error() {
        let transport = Scripted::new(vec![Ok(TransportResponse::new(200, "not json"))]);
        let err = engine(transport)
            .execute::<Value, _>(&options(0), Call::new(Method::Get, "items"), |_| {})
            .await
            .expect_err("must fail");
        assert!(matches!(err, FetchError::Decode(_)));
    }
}
