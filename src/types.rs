use reqwest::header::HeaderMap;

/// Decoded response payload.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    /// Body parsed for `data_type = "json"`.
    Json(serde_json::Value),
    /// Body of any other data type, as text.
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Status and headers of the response the body came from.
#[derive(Clone, Debug, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
}

/// Successful response delivered to the success handler.
#[derive(Clone, Debug)]
pub struct Response {
    pub body: ResponseBody,
    pub status_text: String,
    pub raw: RawResponse,
}

impl Response {
    /// Builds a `200 OK` response, mostly useful for custom transports.
    pub fn ok(body: ResponseBody) -> Self {
        Self {
            body,
            status_text: "OK".to_owned(),
            raw: RawResponse {
                status: 200,
                headers: HeaderMap::new(),
            },
        }
    }
}
