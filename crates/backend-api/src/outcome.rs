//! Tagged outcome for one backend call.

/// Result of a single HTTP call, folded into data.
///
/// `Http` covers every non-2xx response. `Timeout` and `ConnectionFailed`
/// cover transport failures where no response arrived at all. The
/// distinction carries weight downstream: an HTTP error proves the backend
/// saw the request, a transport failure proves nothing either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOutcome<T> {
    /// 2xx with a parsed body.
    Success(T),
    /// Any non-2xx HTTP response, body preserved for classification.
    Http { status: u16, body: String },
    /// The request timed out before a response arrived.
    Timeout,
    /// Connection-level failure (DNS, refused, reset).
    ConnectionFailed(String),
}

impl<T> NetworkOutcome<T> {
    /// Folds a reqwest transport error into the outcome.
    pub(crate) fn from_transport_error(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::ConnectionFailed(err.to_string())
        }
    }

    /// True for timeout and connection failures.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailed(_))
    }

    /// The success value, if this outcome carries one.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }
}
