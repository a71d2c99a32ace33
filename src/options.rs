use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::handler::{Callback, ResponseHandler, TypedHandler};
use crate::{
    AbortController, ApiErrorResponse, ArtifactDecoder, ArtifactKind, DefaultArtifactDecoder,
    FetchError, IdempotentRetry, JsonSerializer, Response, Result, RetryPredicate, Serializer,
    SerializerFlags, TextureParams, Value,
};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const AUTHORIZATION: &str = "Authorization";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Header value, either fixed or recomputed for every attempt.
#[derive(Clone)]
pub enum HeaderValue {
    Static(String),
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl HeaderValue {
    pub fn resolve(&self) -> String {
        match self {
            Self::Static(value) => value.clone(),
            Self::Dynamic(compute) => compute(),
        }
    }
}

impl fmt::Debug for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(<dynamic>)"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Static(value.to_owned())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Static(value)
    }
}

/// Ordered header map with case-insensitive names.
#[derive(Clone, Default)]
pub struct Headers {
    entries: Vec<(String, HeaderValue)>,
}

impl fmt::Debug for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.entries {
            if name.eq_ignore_ascii_case(AUTHORIZATION) {
                map.entry(name, &"<redacted>");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header. The first spelling of the name is kept.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn remove(&mut self, name: &str) -> Option<HeaderValue> {
        let index = self
            .entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluates every value, dynamic ones included.
    pub fn resolve(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.clone(), value.resolve()))
            .collect()
    }
}

/// How non-2xx responses surface to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Return the `Response` with `is_success() == false`.
    #[default]
    Response,
    /// Turn the final non-2xx response into `FetchError::Status`.
    Error,
}

/// Mutable request configuration.
///
/// The engine clones it at the start of every attempt, so the clone it works
/// on is never shared with another attempt or call.
#[derive(Clone)]
pub struct RequestOptions {
    pub(crate) base_url: String,
    pub(crate) route_parameters: Vec<String>,
    pub(crate) query_parameters: Vec<(String, Value)>,
    pub(crate) headers: Headers,
    pub(crate) timeout: Duration,
    pub(crate) serializer: Arc<dyn Serializer>,
    pub(crate) flags: SerializerFlags,
    pub(crate) success_handlers: Vec<Arc<dyn ResponseHandler>>,
    pub(crate) error_handlers: Vec<Arc<dyn ResponseHandler>>,
    pub(crate) abort_controller: Option<AbortController>,
    pub(crate) artifact: ArtifactKind,
    pub(crate) artifact_decoder: Arc<dyn ArtifactDecoder>,
    pub(crate) retry_count: i32,
    pub(crate) retry_delay: Duration,
    pub(crate) retry_predicate: Arc<dyn RetryPredicate>,
    pub(crate) status_policy: StatusPolicy,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            route_parameters: Vec::new(),
            query_parameters: Vec::new(),
            headers: Headers::new(),
            timeout: DEFAULT_TIMEOUT,
            serializer: Arc::new(JsonSerializer),
            flags: SerializerFlags::new(),
            success_handlers: Vec::new(),
            error_handlers: Vec::new(),
            abort_controller: None,
            artifact: ArtifactKind::Json,
            artifact_decoder: Arc::new(DefaultArtifactDecoder),
            retry_count: 0,
            retry_delay: Duration::ZERO,
            retry_predicate: Arc::new(IdempotentRetry),
            status_policy: StatusPolicy::Response,
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("base_url", &self.base_url)
            .field("route_parameters", &self.route_parameters)
            .field("query_parameters", &self.query_parameters)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("flags", &self.flags)
            .field("success_handlers", &self.success_handlers.len())
            .field("error_handlers", &self.error_handlers.len())
            .field("abort_controller", &self.abort_controller)
            .field("artifact", &self.artifact)
            .field("retry_count", &self.retry_count)
            .field("retry_delay", &self.retry_delay)
            .field("status_policy", &self.status_policy)
            .finish()
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn route_parameters(&self) -> &[String] {
        &self.route_parameters
    }

    pub fn query_parameters(&self) -> &[(String, Value)] {
        &self.query_parameters
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn flags(&self) -> &SerializerFlags {
        &self.flags
    }

    pub fn abort_controller(&self) -> Option<&AbortController> {
        self.abort_controller.as_ref()
    }

    pub fn artifact(&self) -> &ArtifactKind {
        &self.artifact
    }

    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn status_policy(&self) -> StatusPolicy {
        self.status_policy
    }

    /// Explicit `Content-Type` header, if one was set.
    pub fn content_type(&self) -> Option<String> {
        self.headers.get(CONTENT_TYPE).map(HeaderValue::resolve)
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) -> &mut Self {
        self.base_url = base_url.into();
        self
    }

    /// Appends a positional route value, consumed by `{placeholder}`s or appended as a segment.
    pub fn add_route_parameter(&mut self, value: impl ToString) -> &mut Self {
        self.route_parameters.push(value.to_string());
        self
    }

    /// Sets a query parameter, replacing an earlier value of the same name.
    pub fn add_query_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.query_parameters.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.query_parameters.push((name, value)),
        }
        self
    }

    /// Adds every field of a serializable struct or map as a query parameter.
    pub fn add_parameters<P: Serialize + ?Sized>(&mut self, parameters: &P) -> Result<&mut Self> {
        let value = serde_json::to_value(parameters)
            .map_err(|err| FetchError::Serialize(format!("parameters are not serializable: {err}")))?;
        match value {
            Value::Object(map) => {
                for (name, value) in map {
                    self.add_query_parameter(name, value);
                }
                Ok(self)
            }
            Value::Null => Ok(self),
            other => Err(FetchError::Argument(format!(
                "query parameters must serialize to an object, got {other}"
            ))),
        }
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name, HeaderValue::Static(value.into()));
        self
    }

    /// Sets a header whose value is computed again for every attempt.
    pub fn set_dynamic_header<F>(&mut self, name: impl Into<String>, compute: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.headers.insert(name, HeaderValue::Dynamic(Arc::new(compute)));
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// Sets `Authorization: Bearer <token>`, keeping an existing `Bearer ` prefix.
    pub fn set_bearer_token(&mut self, token: impl AsRef<str>) -> &mut Self {
        self.set_header(AUTHORIZATION, normalize_bearer_authorization(token.as_ref()))
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.set_header(CONTENT_TYPE, content_type)
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn set_serializer<S: Serializer + 'static>(&mut self, serializer: S) -> &mut Self {
        self.serializer = Arc::new(serializer);
        self
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.flags.insert(name.into(), value.into());
        self
    }

    /// Runs `callback` with every 2xx response that decodes as `T`.
    pub fn on_success<T, F>(&mut self, callback: F) -> &mut Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&Response<T>) + Send + Sync + 'static,
    {
        self.success_handlers
            .push(Arc::new(TypedHandler::<T>::new(Callback::Response(Box::new(callback)))));
        self
    }

    pub fn on_success_content<T, F>(&mut self, callback: F) -> &mut Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.success_handlers
            .push(Arc::new(TypedHandler::<T>::new(Callback::Content(Box::new(callback)))));
        self
    }

    /// Runs `callback` with every non-2xx response whose body decodes as `T`.
    pub fn on_error<T, F>(&mut self, callback: F) -> &mut Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&Response<T>) + Send + Sync + 'static,
    {
        self.error_handlers
            .push(Arc::new(TypedHandler::<T>::new(Callback::Response(Box::new(callback)))));
        self
    }

    pub fn on_error_content<T, F>(&mut self, callback: F) -> &mut Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.error_handlers
            .push(Arc::new(TypedHandler::<T>::new(Callback::Content(Box::new(callback)))));
        self
    }

    /// Shorthand for an error handler decoding problem-details bodies.
    pub fn on_api_error<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&ApiErrorResponse) + Send + Sync + 'static,
    {
        self.on_error_content::<ApiErrorResponse, _>(callback)
    }

    pub fn clear_handlers(&mut self) -> &mut Self {
        self.success_handlers.clear();
        self.error_handlers.clear();
        self
    }

    pub fn set_abort_controller(&mut self, controller: AbortController) -> &mut Self {
        self.abort_controller = Some(controller);
        self
    }

    pub fn use_json(&mut self) -> &mut Self {
        self.artifact = ArtifactKind::Json;
        self
    }

    pub fn use_texture(&mut self, params: TextureParams) -> &mut Self {
        self.artifact = ArtifactKind::Texture(params);
        self
    }

    pub fn use_file(&mut self, path: impl Into<PathBuf>, append: bool) -> &mut Self {
        self.artifact = ArtifactKind::File {
            path: path.into(),
            append,
        };
        self
    }

    pub fn use_no_artifact(&mut self) -> &mut Self {
        self.artifact = ArtifactKind::None;
        self
    }

    pub fn set_artifact_decoder<D: ArtifactDecoder + 'static>(&mut self, decoder: D) -> &mut Self {
        self.artifact_decoder = Arc::new(decoder);
        self
    }

    /// Number of retries after the first attempt. Negative values are rejected when the call runs.
    pub fn set_retry_count(&mut self, retry_count: i32) -> &mut Self {
        self.retry_count = retry_count;
        self
    }

    pub fn set_retry_delay(&mut self, retry_delay: Duration) -> &mut Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn set_retry_predicate<P: RetryPredicate + 'static>(&mut self, predicate: P) -> &mut Self {
        self.retry_predicate = Arc::new(predicate);
        self
    }

    pub fn set_status_policy(&mut self, policy: StatusPolicy) -> &mut Self {
        self.status_policy = policy;
        self
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
