//! Relay error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error used for pipeline and body failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a relay failure, for choosing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErrorKind {
    /// The backend could not be reached.
    DialFailure,
    /// The outbound request could not be built.
    RequestConstructionFailure,
    /// The response body broke off mid-flight.
    StreamFailure,
    /// The backend produced no usable response. Aborts the current relay only.
    BackendProtocolViolation,
}

impl RelayErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayErrorKind::DialFailure => "dial_failure",
            RelayErrorKind::RequestConstructionFailure => "request_construction_failure",
            RelayErrorKind::StreamFailure => "stream_failure",
            RelayErrorKind::BackendProtocolViolation => "backend_protocol_violation",
        }
    }
}

impl std::fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("while dial: {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("while dial: {address}: handshake failed: {source}")]
    Handshake {
        address: String,
        #[source]
        source: hyper::Error,
    },

    #[error("while pipe req: {0}")]
    RequestPipe(#[source] BoxError),

    #[error("while creating HTTP request to target: {0}")]
    RequestConstruction(#[from] axum::http::Error),

    #[error("backend protocol violation: {0}")]
    Protocol(#[source] hyper::Error),

    #[error("while pipe resp: {source}")]
    Stream {
        written: u64,
        #[source]
        source: BoxError,
    },
}

impl RelayError {
    pub(crate) fn stream(written: u64, source: impl Into<BoxError>) -> Self {
        RelayError::Stream {
            written,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> RelayErrorKind {
        match self {
            RelayError::Dial { .. } | RelayError::Handshake { .. } => RelayErrorKind::DialFailure,
            RelayError::RequestPipe(_) | RelayError::RequestConstruction(_) => {
                RelayErrorKind::RequestConstructionFailure
            }
            RelayError::Stream { .. } => RelayErrorKind::StreamFailure,
            RelayError::Protocol(_) => RelayErrorKind::BackendProtocolViolation,
        }
    }

    /// True for backend protocol violations, which are reported loudly.
    pub fn is_fatal(&self) -> bool {
        self.kind() == RelayErrorKind::BackendProtocolViolation
    }

    /// Body bytes that reached the sink before the failure.
    pub fn bytes_written(&self) -> u64 {
        match self {
            RelayError::Stream { written, .. } => *written,
            _ => 0,
        }
    }

    /// Status reported to the original caller.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
