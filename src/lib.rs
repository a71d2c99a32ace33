//! `fetchkit-http` is a declarative async HTTP request client.
//!
//! Callers describe an endpoint (method, path template, body, options) and the
//! crate takes care of:
//! - content negotiation for request bodies ([`negotiate()`])
//! - per-attempt execution with retries and abort signals ([`FetchClient`])
//! - typed responses, texture and file artifacts ([`Response`], [`ResponseProcessor`])
//! - route templates for resource-oriented services ([`ServiceClient`], [`RestResource`])
//!
//! ```no_run
//! use fetchkit_http::{FetchClient, Value};
//!
//! # async fn run() -> fetchkit_http::Result<()> {
//! let mut client = FetchClient::with_base_url("https://api.example.com");
//! client.options_mut().set_retry_count(2);
//!
//! let users = client.get::<Value>("users").await?;
//! if users.is_success() {
//!     println!("{:?}", users.content());
//! }
//! # Ok(())
//! # }
//! ```

mod abort;
mod body;
mod client;
mod engine;
mod error;
mod handler;
mod method;
pub mod mime;
mod negotiate;
mod observe;
mod options;
mod processor;
pub mod query;
mod response;
mod retry;
pub mod route;
mod serializer;
mod service;
mod transport;

pub use abort::AbortController;
pub use body::{Body, MultipartForm, Part};
pub use client::{
    FetchClient, ENV_BASE_URL, ENV_RETRY_COUNT, ENV_RETRY_DELAY_MS, ENV_TIMEOUT_MS,
};
pub use error::{FetchError, TransportErrorKind};
pub use method::Method;
pub use negotiate::{negotiate, EncodedBody, EncodingStrategy, Negotiated};
#[cfg(feature = "tracing")]
pub use observe::TracingObserver;
pub use observe::{Observer, RequestInfo};
pub use options::{
    HeaderValue, Headers, RequestOptions, StatusPolicy, AUTHORIZATION, CONTENT_TYPE,
    DEFAULT_TIMEOUT,
};
pub use processor::{
    Artifact, ArtifactDecoder, ArtifactKind, DecodedImage, DefaultArtifactDecoder, ImageFormat,
    Materialized, ResponseProcessor, TextureParams,
};
pub use response::{is_success_status, ApiErrorResponse, Response};
pub use retry::{AlwaysRetry, AttemptOutcome, AttemptResult, IdempotentRetry, RetryPredicate};
pub use route::{ParamRole, ParamSpec, ResolvedRoute};
pub use serializer::{JsonSerializer, Serializer, SerializerFlags, PRETTY_FLAG};
pub use service::{ActionDescriptor, ActionTable, RestResource, ServiceClient};
pub use transport::{
    ReqwestTransport, RequestDescriptor, Transport, TransportFailure, TransportResponse,
};

pub use serde_json::Value;

pub type Result<T> = std::result::Result<T, FetchError>;
