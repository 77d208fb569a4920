use std::{collections::BTreeMap, fmt};

use reqwest::{header::HeaderValue, Method};

use crate::{
    accept_for, params::DEFAULT_DATA_TYPE, CookieDetails, CookieStore, Credentials, ErrorHandler,
    RequestError, RequestOptions, Response, Result, SessionOptions, SuccessHandler, Transport,
    TransportParams,
};

/// Attempt budget for one logical request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Attempts {
    count: usize,
    max: usize,
}

impl Attempts {
    fn new(retry_enabled: bool) -> Self {
        Self {
            count: 0,
            max: if retry_enabled { 2 } else { 1 },
        }
    }

    fn begin(&mut self) {
        debug_assert!(self.count < self.max);
        self.count += 1;
    }

    fn exhausted(&self) -> bool {
        self.count >= self.max
    }
}

/// One logical request against a session-cookie API.
///
/// Built per request from validated [`RequestOptions`], then consumed by
/// [`RequestClient::send`]. If the server answers `401` and a session cookie
/// is configured, the cookie is removed from the store and the request is
/// dispatched once more; the second outcome is final.
pub struct RequestClient<'a, T, C: ?Sized> {
    transport: &'a T,
    cookies: &'a C,
    url: String,
    method: Method,
    data_type: String,
    credentials: Option<Credentials>,
    data: Option<BTreeMap<String, String>>,
    session_cookie: Option<String>,
    success: SuccessHandler,
    error: ErrorHandler,
}

impl<T, C: ?Sized> fmt::Debug for RequestClient<'_, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("data_type", &self.data_type)
            .field("credentials", &self.credentials)
            .field("data", &self.data)
            .field("session_cookie", &self.session_cookie)
            .finish_non_exhaustive()
    }
}

impl<'a, T, C> RequestClient<'a, T, C>
where
    T: Transport,
    C: CookieStore + ?Sized,
{
    /// Validates `options` and binds the request to its collaborators.
    ///
    /// Fails with [`RequestError::InvalidRequest`] when the url is blank,
    /// either handler is missing, or the data type cannot form an `Accept`
    /// header. A blank username disables authentication
    /// entirely, password included.
    pub fn new(
        options: RequestOptions,
        session: SessionOptions,
        transport: &'a T,
        cookies: &'a C,
    ) -> Result<Self> {
        let url = options
            .url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| RequestError::InvalidRequest("url is required".to_owned()))?;
        let success = options
            .success
            .ok_or_else(|| RequestError::InvalidRequest("success handler is required".to_owned()))?;
        let error = options
            .error
            .ok_or_else(|| RequestError::InvalidRequest("error handler is required".to_owned()))?;

        let credentials = options
            .username
            .map(|username| username.trim().to_owned())
            .filter(|username| !username.is_empty())
            .map(|username| Credentials {
                username,
                password: options.password,
            });

        let data_type = options
            .data_type
            .filter(|data_type| !data_type.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_TYPE.to_owned());
        if HeaderValue::from_str(&accept_for(&data_type)).is_err() {
            return Err(RequestError::InvalidRequest(format!(
                "data type {data_type:?} is not a valid Accept header value"
            )));
        }

        Ok(Self {
            transport,
            cookies,
            url,
            method: options.method,
            data_type,
            credentials,
            data: options.data,
            session_cookie: session.session_cookie,
            success,
            error,
        })
    }

    /// Parameters every attempt of this request is dispatched with.
    pub fn transport_params(&self) -> TransportParams {
        TransportParams::new(
            self.url.clone(),
            self.method.clone(),
            self.data_type.clone(),
            self.credentials.clone(),
            self.data.clone(),
        )
    }

    /// Sends the request and delivers the outcome to exactly one handler.
    pub async fn send(self) {
        let outcome = self.execute().await;
        match outcome {
            Ok(response) => (self.success)(response),
            Err(err) => (self.error)(err),
        }
    }

    /// Runs the attempt state machine and returns the terminal outcome.
    pub async fn execute(&self) -> Result<Response> {
        let params = self.transport_params();
        let mut attempts = Attempts::new(self.session_cookie.is_some());

        loop {
            attempts.begin();

            #[cfg(feature = "tracing")]
            tracing::debug!(url = %self.url, attempt = attempts.count, "dispatching request");

            let err = match self.transport.send(&params).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let session_cookie = match &self.session_cookie {
                Some(name) if err.is_auth_failure() && !attempts.exhausted() => name,
                _ => return Err(err),
            };

            self.clear_session_cookie(session_cookie);

            #[cfg(feature = "tracing")]
            tracing::debug!(url = %self.url, cookie = %session_cookie, "retrying after clearing session cookie");
        }
    }

    /// Removes the stale session cookie; the retry goes ahead regardless.
    fn clear_session_cookie(&self, name: &str) {
        let details = CookieDetails::new(self.url.clone(), name);
        if let Err(_err) = self.cookies.remove(&details) {
            #[cfg(feature = "tracing")]
            tracing::warn!(url = %self.url, cookie = %name, "session cookie removal failed: {_err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, VecDeque},
        sync::{Arc, Mutex},
    };

    use serde_json::json;

    use super::{Attempts, RequestClient};
    use crate::{
        Cookie, CookieDetails, CookieStore, RequestError, RequestOptions, Response, ResponseBody,
        Result, SessionOptions, Transport, TransportParams,
    };

    #[derive(Default)]
    struct MockTransport {
        outcomes: Mutex<VecDeque<Result<Response>>>,
        calls: Mutex<Vec<TransportParams>>,
    }

    impl MockTransport {
        fn with(outcomes: Vec<Result<Response>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<TransportParams> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        async fn send(&self, params: &TransportParams) -> Result<Response> {
            self.calls.lock().unwrap().push(params.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ok_response()))
        }
    }

    #[derive(Default)]
    struct MockCookies {
        removed: Mutex<Vec<CookieDetails>>,
        fail: bool,
    }

    impl CookieStore for MockCookies {
        fn get(&self, _details: &CookieDetails) -> Option<Cookie> {
            None
        }

        fn remove(&self, details: &CookieDetails) -> Result<()> {
            self.removed.lock().unwrap().push(details.clone());
            if self.fail {
                Err(RequestError::Cookie("store unavailable".to_owned()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Default)]
    struct Outcomes {
        successes: Arc<Mutex<Vec<Response>>>,
        errors: Arc<Mutex<Vec<RequestError>>>,
    }

    impl Outcomes {
        fn attach(&self, options: RequestOptions) -> RequestOptions {
            let successes = Arc::clone(&self.successes);
            let errors = Arc::clone(&self.errors);
            options
                .on_success(move |response| successes.lock().unwrap().push(response))
                .on_error(move |err| errors.lock().unwrap().push(err))
        }

        fn success_count(&self) -> usize {
            self.successes.lock().unwrap().len()
        }

        fn error_count(&self) -> usize {
            self.errors.lock().unwrap().len()
        }
    }

    fn ok_response() -> Response {
        Response::ok(ResponseBody::Json(json!({"ok": true})))
    }

    fn unauthorized() -> RequestError {
        RequestError::Unauthorized {
            status: 401,
            status_text: "Unauthorized".to_owned(),
            body: "os_authType was 'any' and an invalid cookie was sent.".to_owned(),
        }
    }

    fn session() -> SessionOptions {
        SessionOptions::with_session_cookie("SESSIONID")
    }

    #[test]
    fn attempts_budget() {
        let mut single = Attempts::new(false);
        single.begin();
        assert!(single.exhausted());

        let mut double = Attempts::new(true);
        double.begin();
        assert!(!double.exhausted());
        double.begin();
        assert!(double.exhausted());
    }

    #[test]
    fn construction_requires_url() {
        let transport = MockTransport::default();
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();

        for url in [None, Some(String::new()), Some("   ".to_owned())] {
            let mut options = outcomes.attach(RequestOptions::default());
            options.url = url;
            let err = RequestClient::new(options, SessionOptions::default(), &transport, &cookies)
                .expect_err("blank url must be rejected");
            assert!(matches!(err, RequestError::InvalidRequest(_)));
        }
    }

    #[test]
    fn construction_requires_handlers() {
        let transport = MockTransport::default();
        let cookies = MockCookies::default();

        let missing_success = RequestOptions::new("http://example.com").on_error(|_| {});
        assert!(matches!(
            RequestClient::new(missing_success, SessionOptions::default(), &transport, &cookies),
            Err(RequestError::InvalidRequest(_))
        ));

        let missing_error = RequestOptions::new("http://example.com").on_success(|_| {});
        assert!(matches!(
            RequestClient::new(missing_error, SessionOptions::default(), &transport, &cookies),
            Err(RequestError::InvalidRequest(_))
        ));
    }

    #[test]
    fn construction_rejects_data_type_unusable_as_accept_header() {
        let transport = MockTransport::default();
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com").data_type("xml\n"));

        let err = RequestClient::new(options, SessionOptions::default(), &transport, &cookies)
            .expect_err("control characters cannot reach the Accept header");
        assert!(matches!(err, RequestError::InvalidRequest(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn success_dispatches_once_and_signals_once() {
        let transport = MockTransport::default();
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com"));

        RequestClient::new(options, session(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        assert_eq!(transport.calls().len(), 1);
        assert_eq!(outcomes.success_count(), 1);
        assert_eq!(outcomes.error_count(), 0);
        let successes = outcomes.successes.lock().unwrap();
        assert_eq!(successes[0].body, ResponseBody::Json(json!({"ok": true})));
        assert!(cookies.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn username_adds_credentials_and_basic_auth_type() {
        let transport = MockTransport::default();
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(
            RequestOptions::new("http://example.com").credentials("username1", "password123"),
        );

        RequestClient::new(options, SessionOptions::default(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        let calls = transport.calls();
        let credentials = calls[0].credentials.as_ref().expect("credentials must be set");
        assert_eq!(credentials.username, "username1");
        assert_eq!(credentials.password.as_deref(), Some("password123"));
        let data = calls[0].data.as_ref().expect("data must be set");
        assert_eq!(data["os_authType"], "basic");
    }

    #[tokio::test]
    async fn absent_or_blank_username_sends_no_auth_fields() {
        for username in [None, Some("    ")] {
            let transport = MockTransport::default();
            let cookies = MockCookies::default();
            let outcomes = Outcomes::default();
            let mut options = outcomes.attach(RequestOptions::new("http://example.com"));
            options.username = username.map(str::to_owned);
            options.password = Some(String::new());

            RequestClient::new(options, SessionOptions::default(), &transport, &cookies)
                .unwrap()
                .send()
                .await;

            let calls = transport.calls();
            assert_eq!(calls[0].credentials, None);
            assert_eq!(calls[0].data, None);
        }
    }

    #[tokio::test]
    async fn data_type_defaults_to_json_and_drives_accept() {
        for (data_type, expected) in [
            (None, "application/json"),
            (Some("xml"), "application/xml"),
        ] {
            let transport = MockTransport::default();
            let cookies = MockCookies::default();
            let outcomes = Outcomes::default();
            let mut options = outcomes.attach(RequestOptions::new("http://example.com"));
            options.data_type = data_type.map(str::to_owned);

            RequestClient::new(options, SessionOptions::default(), &transport, &cookies)
                .unwrap()
                .send()
                .await;

            let calls = transport.calls();
            assert_eq!(calls[0].data_type, data_type.unwrap_or("json"));
            let mut headers: HashMap<String, String> = HashMap::new();
            calls[0].before_send(&mut headers);
            assert_eq!(headers["Accept"], expected);
        }
    }

    #[tokio::test]
    async fn stale_session_cookie_is_removed_and_request_retried() {
        let transport = MockTransport::with(vec![Err(unauthorized()), Ok(ok_response())]);
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com"));

        RequestClient::new(options, session(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(
            *cookies.removed.lock().unwrap(),
            vec![CookieDetails::new("http://example.com", "SESSIONID")]
        );
        assert_eq!(outcomes.success_count(), 1);
        assert_eq!(outcomes.error_count(), 0);
    }

    #[tokio::test]
    async fn retries_only_once_when_session_is_not_renewed() {
        let transport = MockTransport::with(vec![
            Err(unauthorized()),
            Err(unauthorized()),
            Err(unauthorized()),
        ]);
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com"));

        RequestClient::new(options, session(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(cookies.removed.lock().unwrap().len(), 1);
        assert_eq!(outcomes.success_count(), 0);
        assert_eq!(outcomes.error_count(), 1);
        assert!(outcomes.errors.lock().unwrap()[0].is_auth_failure());
    }

    #[tokio::test]
    async fn failure_without_session_cookie_is_final() {
        let transport = MockTransport::with(vec![Err(unauthorized())]);
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com"));

        RequestClient::new(options, SessionOptions::default(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        assert_eq!(transport.calls().len(), 1);
        assert!(cookies.removed.lock().unwrap().is_empty());
        assert_eq!(outcomes.error_count(), 1);
        assert_eq!(outcomes.success_count(), 0);
    }

    #[tokio::test]
    async fn non_auth_failure_is_never_retried() {
        let transport = MockTransport::with(vec![Err(RequestError::Http {
            status: 500,
            status_text: "Internal Server Error".to_owned(),
            body: String::new(),
        })]);
        let cookies = MockCookies::default();
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com"));

        RequestClient::new(options, session(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        assert_eq!(transport.calls().len(), 1);
        assert!(cookies.removed.lock().unwrap().is_empty());
        assert_eq!(outcomes.error_count(), 1);
    }

    #[tokio::test]
    async fn cookie_removal_failure_does_not_block_retry() {
        let transport = MockTransport::with(vec![Err(unauthorized()), Ok(ok_response())]);
        let cookies = MockCookies {
            fail: true,
            ..MockCookies::default()
        };
        let outcomes = Outcomes::default();
        let options = outcomes.attach(RequestOptions::new("http://example.com"));

        RequestClient::new(options, session(), &transport, &cookies)
            .unwrap()
            .send()
            .await;

        assert_eq!(transport.calls().len(), 2);
        assert_eq!(outcomes.success_count(), 1);
        assert_eq!(outcomes.error_count(), 0);
    }

    #[tokio::test]
    async fn execute_returns_terminal_outcome() {
        let transport = MockTransport::with(vec![Err(RequestError::Network("reset".to_owned()))]);
        let cookies = MockCookies::default();
        let options = RequestOptions::new("http://example.com")
            .on_success(|_| {})
            .on_error(|_| {});

        let client = RequestClient::new(options, session(), &transport, &cookies).unwrap();
        let err = client.execute().await.expect_err("network error must surface");
        assert!(matches!(err, RequestError::Network(_)));
        assert_eq!(transport.calls().len(), 1);
    }
}
