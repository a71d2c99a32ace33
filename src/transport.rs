use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::{Method, TransportErrorKind};

/// Fully built wire request for one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
    method: Method,
    url: String,
    content_type: Option<String>,
    body: Option<Vec<u8>>,
    headers: Vec<(String, String)>,
    timeout: Duration,
}

impl RequestDescriptor {
    pub(crate) fn new(
        method: Method,
        url: String,
        content_type: Option<String>,
        body: Option<Vec<u8>>,
        headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Self {
        Self {
            method,
            url,
            content_type,
            body,
            headers,
            timeout,
        }
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Resolved headers, `Content-Type` included when a body is sent.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Status, headers and body of a completed exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn downloaded_bytes(&self) -> usize {
        self.body.len()
    }
}

/// Exchange that ended without a status code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

/// Performs one HTTP exchange. The engine handles retries and cancellation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &RequestDescriptor,
    ) -> std::result::Result<TransportResponse, TransportFailure>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
    ) -> std::result::Result<TransportResponse, TransportFailure> {
        let mut builder = self
            .http
            .request(request.method().into(), request.url())
            .timeout(request.timeout());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_body() || err.is_decode() {
        TransportErrorKind::Data
    } else {
        TransportErrorKind::Other
    };
    TransportFailure::new(kind, err.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{RequestDescriptor, Transport, TransportResponse};
    use crate::{Method, ReqwestTransport, TransportErrorKind};

    #[test]
    fn response_helpers() {
        let response = TransportResponse::new(201, "abc").with_header("ETag", "v1");
        assert_eq!(response.downloaded_bytes(), 3);
        assert_eq!(response.headers, [("ETag".to_owned(), "v1".to_owned())]);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connect_failure() {
        let request = RequestDescriptor::new(
            Method::Get,
            "http://127.0.0.1:9/unreachable".to_owned(),
            None,
            None,
            vec![],
            Duration::from_secs(2),
        );
        let failure = ReqwestTransport::new()
            .send(&request)
            .await
            .expect_err("port 9 must refuse connections");
        assert!(matches!(
            failure.kind,
            TransportErrorKind::Connect | TransportErrorKind::Timeout
        ));
    }
}
