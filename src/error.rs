use reqwest::StatusCode;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Request options failed validation at construction time.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Server rejected the credentials or the session cookie (HTTP 401).
    #[error("unauthorized {status} {status_text}: {body}")]
    Unauthorized {
        status: u16,
        status_text: String,
        body: String,
    },
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status} {status_text}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },
    /// Network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// Transport failure reported by a non-`reqwest` transport.
    #[error("network error: {0}")]
    Network(String),
    /// Response body did not match the requested data type.
    #[error("decode error: {0}")]
    Decode(String),
    /// Cookie store rejected an operation.
    #[error("cookie error: {0}")]
    Cookie(String),
}

impl RequestError {
    /// Builds the error for a non-success status, classifying 401 as an auth failure.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let status_text = status.canonical_reason().unwrap_or_default().to_owned();
        if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized {
                status: status.as_u16(),
                status_text,
                body,
            }
        } else {
            Self::Http {
                status: status.as_u16(),
                status_text,
                body,
            }
        }
    }

    /// Whether the failure may be caused by a stale session cookie.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Short status text in the style of `"error"`, `"timeout"` or `"parsererror"`.
    pub fn status_text(&self) -> &str {
        match self {
            Self::Unauthorized { status_text, .. } | Self::Http { status_text, .. } => {
                status_text.as_str()
            }
            Self::Transport(err) if err.is_timeout() => "timeout",
            Self::Decode(_) => "parsererror",
            _ => "error",
        }
    }
}
