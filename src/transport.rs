use std::{fmt, future::Future, sync::Arc, time::Duration};

use reqwest::header::HeaderMap;

use crate::{
    RawResponse, RequestError, Response, ResponseBody, Result, SessionCookieJar, TransportOptions,
    TransportParams,
};

/// Sends one attempt of a request.
///
/// Non-success responses must be reported as errors; a `401` must map to
/// [`RequestError::Unauthorized`] for the session retry to kick in.
pub trait Transport {
    fn send(&self, params: &TransportParams) -> impl Future<Output = Result<Response>>;
}

/// [`Transport`] backed by `reqwest`, sharing a [`SessionCookieJar`].
#[derive(Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    cookies: Arc<SessionCookieJar>,
    options: TransportOptions,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("cookies", &self.cookies.len())
            .field("options", &self.options)
            .finish()
    }
}

impl ReqwestTransport {
    /// Creates a transport with a fresh cookie jar.
    pub fn new() -> Result<Self> {
        Self::with_cookie_jar(Arc::new(SessionCookieJar::new()), TransportOptions::default())
    }

    /// Creates a transport that reads and writes cookies through `cookies`.
    pub fn with_cookie_jar(cookies: Arc<SessionCookieJar>, options: TransportOptions) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .build()
            .map_err(RequestError::Transport)?;
        Ok(Self {
            http,
            cookies,
            options,
        })
    }

    /// The jar this transport sends cookies from.
    pub fn cookie_jar(&self) -> &Arc<SessionCookieJar> {
        &self.cookies
    }

    async fn dispatch(&self, params: &TransportParams) -> Result<Response> {
        let mut headers = HeaderMap::new();
        params.before_send(&mut headers);

        let mut request = self
            .http
            .request(params.method.clone(), &params.url)
            .headers(headers)
            .timeout(Duration::from_millis(self.options.timeout_ms));

        if let Some(credentials) = &params.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        if let Some(data) = &params.data {
            request = if params.data_in_query() {
                request.query(data)
            } else {
                request.form(data)
            };
        }

        let response = request.send().await.map_err(RequestError::Transport)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await.map_err(RequestError::Transport)?;

        if !status.is_success() {
            return Err(RequestError::from_status(status, body));
        }

        Ok(Response {
            body: decode_body(&params.data_type, body)?,
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            raw: RawResponse {
                status: status.as_u16(),
                headers,
            },
        })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, params: &TransportParams) -> Result<Response> {
        self.dispatch(params).await
    }
}

/// Decodes a success body for the requested data type.
///
/// An empty body decodes to JSON `null` rather than a parse error.
pub(crate) fn decode_body(data_type: &str, body: String) -> Result<ResponseBody> {
    if !data_type.eq_ignore_ascii_case("json") {
        return Ok(ResponseBody::Text(body));
    }
    if body.trim().is_empty() {
        return Ok(ResponseBody::Json(serde_json::Value::Null));
    }
    serde_json::from_str(&body)
        .map(ResponseBody::Json)
        .map_err(|err| RequestError::Decode(format!("invalid JSON response: {err}; body: {body}")))
}
