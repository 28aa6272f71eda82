//! Transport errors
//!
//! A transport error means the fetch failed outright. A remote that answers
//! "no such collection" is not an error at this layer; it is reported as
//! `found: false`.

/// The fetch failed at the network or protocol level
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Remote answered with an unexpected status
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Connection, DNS, TLS or similar failure
    #[error("network failure: {0}")]
    Network(String),

    /// Body did not match the expected shape
    #[error("malformed response: {0}")]
    Decode(String),

    /// No answer within the configured deadline
    #[error("no response after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// Source could not be constructed or is unusable
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Create network error
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Create decode error
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Whether the remote never answered
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_timeout() {
            Self::Network(format!("timed out: {err}"))
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                url: err.url().map(ToString::to_string).unwrap_or_default(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}
