#[cfg(test)]
use std::collections::HashMap;
use std::{collections::BTreeMap, fmt};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};

/// Data field telling the server which credential check to apply.
pub const AUTH_TYPE_FIELD: &str = "os_authType";
/// Auth type sent alongside explicit credentials.
pub const AUTH_TYPE_BASIC: &str = "basic";
/// Data type used when none is configured.
pub const DEFAULT_DATA_TYPE: &str = "json";

/// Maps a data type to its `Accept` header value.
///
/// `"json"` → `"application/json"`, `"xml"` → `"application/xml"`.
pub fn accept_for(data_type: &str) -> String {
    format!("application/{data_type}")
}

/// Target of the pre-send header hook.
pub trait HeaderSetter {
    fn set_request_header(&mut self, name: &str, value: &str);
}

impl HeaderSetter for HeaderMap {
    fn set_request_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.insert(name, value);
            }
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!("skipping invalid request header {name}");
            }
        }
    }
}

#[cfg(test)]
impl HeaderSetter for HashMap<String, String> {
    fn set_request_header(&mut self, name: &str, value: &str) {
        self.insert(name.to_owned(), value.to_owned());
    }
}

/// Basic credentials forwarded to the transport.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Everything a transport needs to dispatch one attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportParams {
    pub url: String,
    pub method: Method,
    pub data_type: String,
    /// `None` when unauthenticated, never an empty pair.
    pub credentials: Option<Credentials>,
    /// `None` when the caller sent no data and no auth type is needed.
    pub data: Option<BTreeMap<String, String>>,
}

impl TransportParams {
    pub(crate) fn new(
        url: String,
        method: Method,
        data_type: String,
        credentials: Option<Credentials>,
        data: Option<BTreeMap<String, String>>,
    ) -> Self {
        let data = if credentials.is_some() {
            let mut data = data.unwrap_or_default();
            data.insert(AUTH_TYPE_FIELD.to_owned(), AUTH_TYPE_BASIC.to_owned());
            Some(data)
        } else {
            data
        };
        Self {
            url,
            method,
            data_type,
            credentials,
            data,
        }
    }

    /// Pre-send hook: sets `Accept` from the data type.
    pub fn before_send(&self, headers: &mut dyn HeaderSetter) {
        headers.set_request_header("Accept", &accept_for(&self.data_type));
    }

    /// Whether `data` travels in the query string rather than the body.
    pub fn data_in_query(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::DELETE)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use reqwest::{header::HeaderMap, Method};

    use super::{accept_for, Credentials, TransportParams, AUTH_TYPE_FIELD};

    fn params(credentials: Option<Credentials>, data: Option<BTreeMap<String, String>>) -> TransportParams {
        TransportParams::new(
            "http://example.com".to_owned(),
            Method::GET,
            "json".to_owned(),
            credentials,
            data,
        )
    }

    #[test]
    fn accept_mapping() {
        assert_eq!(accept_for("json"), "application/json");
        assert_eq!(accept_for("xml"), "application/xml");
        assert_eq!(accept_for("vnd.api+json"), "application/vnd.api+json");
    }

    #[test]
    fn credentials_add_basic_auth_type_to_existing_data() {
        let mut data = BTreeMap::new();
        data.insert("key".to_owned(), "value".to_owned());
        let params = params(
            Some(Credentials {
                username: "user".to_owned(),
                password: None,
            }),
            Some(data),
        );
        let data = params.data.expect("auth type must create data");
        assert_eq!(data[AUTH_TYPE_FIELD], "basic");
        assert_eq!(data["key"], "value");
    }

    #[test]
    fn no_credentials_leave_data_untouched() {
        assert_eq!(params(None, None).data, None);
    }

    #[test]
    fn before_send_sets_accept_on_header_map() {
        let mut headers = HeaderMap::new();
        params(None, None).before_send(&mut headers);
        assert_eq!(headers["accept"], "application/json");

        let mut map: HashMap<String, String> = HashMap::new();
        params(None, None).before_send(&mut map);
        assert_eq!(map["Accept"], "application/json");
    }

    #[test]
    fn debug_redacts_password() {
        let credentials = Credentials {
            username: "user".to_owned(),
            password: Some("hunter2".to_owned()),
        };
        let debug = format!("{credentials:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("hunter2"));
    }
}
