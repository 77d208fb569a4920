//! `authsession-http` is the request layer for APIs that authenticate with a
//! session cookie and accept an `os_authType` escalation field.
//!
//! A [`RequestClient`] sends one logical request through an injected
//! [`Transport`]. When the server rejects a stale session cookie with `401`,
//! the client removes that cookie from the injected [`CookieStore`] and
//! retries exactly once before reporting the outcome.
//!
//! [`ReqwestTransport`] and [`SessionCookieJar`] are the production
//! collaborators; they share the jar so removals are seen by the next
//! dispatch.

mod client;
mod cookies;
mod error;
mod options;
mod params;
mod transport;
mod types;

pub use client::RequestClient;
pub use cookies::{Cookie, CookieDetails, CookieStore, SessionCookieJar};
pub use error::RequestError;
pub use options::{ErrorHandler, RequestOptions, SessionOptions, SuccessHandler, TransportOptions};
pub use params::{
    accept_for, Credentials, HeaderSetter, TransportParams, AUTH_TYPE_BASIC, AUTH_TYPE_FIELD,
    DEFAULT_DATA_TYPE,
};
pub use transport::{ReqwestTransport, Transport};
pub use types::{RawResponse, Response, ResponseBody};

pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, RequestError>;
