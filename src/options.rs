use std::{collections::BTreeMap, fmt};

use reqwest::Method;

use crate::{RequestError, Response};

/// Receives the terminal successful response.
pub type SuccessHandler = Box<dyn FnOnce(Response) + Send>;
/// Receives the terminal failure.
pub type ErrorHandler = Box<dyn FnOnce(RequestError) + Send>;

/// Options for one logical request.
///
/// `url`, `success` and `error` are required; [`crate::RequestClient::new`]
/// rejects options missing any of them.
#[derive(Default)]
pub struct RequestOptions {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Response data type, `"json"` when unset.
    pub data_type: Option<String>,
    pub data: Option<BTreeMap<String, String>>,
    pub method: Method,
    pub success: Option<SuccessHandler>,
    pub error: Option<ErrorHandler>,
}

impl RequestOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Adds one field to the request payload.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn on_success(mut self, handler: impl FnOnce(Response) + Send + 'static) -> Self {
        self.success = Some(Box::new(handler));
        self
    }

    pub fn on_error(mut self, handler: impl FnOnce(RequestError) + Send + 'static) -> Self {
        self.error = Some(Box::new(handler));
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("data_type", &self.data_type)
            .field("data", &self.data)
            .field("method", &self.method)
            .field("success", &self.success.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Controls the stale session cookie retry.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionOptions {
    /// Cookie cleared before the single retry of an unauthorized request.
    /// `None` disables the retry.
    pub session_cookie: Option<String>,
}

impl SessionOptions {
    pub fn with_session_cookie(name: impl Into<String>) -> Self {
        Self {
            session_cookie: Some(name.into()),
        }
    }
}

/// Configures the `reqwest` transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

impl TransportOptions {
    /// Reads `AUTHSESSION_TIMEOUT_MS`, falling back to the default when unset.
    pub fn from_env() -> std::result::Result<Self, String> {
        match std::env::var("AUTHSESSION_TIMEOUT_MS") {
            Ok(value) => {
                let timeout_ms = value.trim().parse::<u64>().map_err(|err| {
                    format!("AUTHSESSION_TIMEOUT_MS must be a number of milliseconds: {err}")
                })?;
                Ok(Self { timeout_ms })
            }
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(err) => Err(format!("AUTHSESSION_TIMEOUT_MS could not be read: {err}")),
        }
    }
}
