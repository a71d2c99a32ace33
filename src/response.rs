use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::{Artifact, Method, Value};

/// `true` for 2xx status codes.
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Untyped part of a completed response, shared by typed views.
#[derive(Clone, Debug)]
pub(crate) struct ResponseMeta {
    pub(crate) status: u16,
    pub(crate) raw_content: Option<String>,
    pub(crate) request_headers: Vec<(String, String)>,
    pub(crate) response_headers: Vec<(String, String)>,
    pub(crate) method: Method,
    pub(crate) duration: Duration,
    pub(crate) timestamp: SystemTime,
    pub(crate) attempts: u32,
}

/// Response of a completed attempt with optional typed content.
#[derive(Clone, Debug)]
pub struct Response<T> {
    meta: ResponseMeta,
    content: Option<T>,
    artifact: Option<Artifact>,
}

impl<T> Response<T> {
    pub(crate) fn from_parts(
        meta: ResponseMeta,
        content: Option<T>,
        artifact: Option<Artifact>,
    ) -> Self {
        Self {
            meta,
            content,
            artifact,
        }
    }

    pub(crate) fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn status(&self) -> u16 {
        self.meta.status
    }

    pub fn is_success(&self) -> bool {
        is_success_status(self.meta.status)
    }

    /// Response body as text. `None` when a texture or file strategy consumed it.
    pub fn raw_content(&self) -> Option<&str> {
        self.meta.raw_content.as_deref()
    }

    pub fn request_headers(&self) -> &[(String, String)] {
        &self.meta.request_headers
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.meta.response_headers
    }

    /// Case-insensitive response header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta
            .response_headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn method(&self) -> Method {
        self.meta.method
    }

    pub fn duration(&self) -> Duration {
        self.meta.duration
    }

    pub fn timestamp(&self) -> SystemTime {
        self.meta.timestamp
    }

    /// Number of attempts made to obtain this response (1-based).
    pub fn attempts(&self) -> u32 {
        self.meta.attempts
    }

    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<T> {
        self.content
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifact.as_ref()
    }

    /// Re-types the response with different content, keeping metadata and artifact.
    pub fn with_content<U>(self, content: Option<U>) -> Response<U> {
        Response {
            meta: self.meta,
            content,
            artifact: self.artifact,
        }
    }
}

/// RFC 7807 style problem details, usable with `RequestOptions::on_api_error`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, Value>,
}
