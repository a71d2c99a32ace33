use std::fmt;

use crate::Method;

/// Why a transport call produced no status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// DNS, TCP or TLS setup failed.
    Connect,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// The call was cancelled through an abort signal.
    Cancelled,
    /// Bytes were exchanged but could not be processed.
    Data,
    /// Any other failure reported by the transport.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Data => "data",
            Self::Other => "other",
        };
        f.write_str(text)
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Invalid client or action configuration, raised before any I/O.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Request body shape does not fit the negotiated encoding.
    #[error("invalid argument: {0}")]
    Argument(String),
    /// No status code could be obtained for the request.
    #[error("transport error ({kind}) for {method} {url}: {message}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        url: String,
        message: String,
    },
    /// Cancellation was observed while the call was in progress.
    #[error("request aborted during attempt {attempt}")]
    Aborted { attempt: u32 },
    /// Non-success HTTP status surfaced as an error (opt-in, see `StatusPolicy::Error`).
    #[error("http error {status}: {body}")]
    Status { status: u16, body: String },
    /// Request body or parameters could not be serialized.
    #[error("serialize error: {0}")]
    Serialize(String),
    /// Response payload could not be decoded into the requested type.
    #[error("decode error: {0}")]
    Decode(String),
    /// Texture or file artifact could not be produced.
    #[error("artifact error: {0}")]
    Artifact(String),
}

impl FetchError {
    /// Returns the transport failure kind when this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns `true` for errors raised before any network attempt.
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Argument(_))
    }
}
