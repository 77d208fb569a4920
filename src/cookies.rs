//! Cookie store seam and an in-memory jar shared with `reqwest`.

use std::{net::IpAddr, sync::Mutex};

use chrono::{DateTime, Duration, Utc};
use reqwest::{header::HeaderValue, Url};
use serde::{Deserialize, Serialize};

use crate::{RequestError, Result};

/// Identifies a cookie by the url it applies to and its name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieDetails {
    pub url: String,
    pub name: String,
}

impl CookieDetails {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
        }
    }
}

/// A stored cookie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    /// Expiration time (`None` = session cookie)
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    /// Only sent over `https`
    #[serde(default)]
    pub secure: bool,
}

impl Cookie {
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }

    fn matches(&self, url: &Url) -> bool {
        domain_matches(url.host_str().unwrap_or_default(), &self.domain)
            && path_matches(url.path(), &self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired()
    }

    fn same_slot(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host.eq_ignore_ascii_case(domain)
        || (host.parse::<IpAddr>().is_err()
            && host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.')))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

/// Cookie store the request client clears stale session cookies from.
pub trait CookieStore {
    /// Looks up the cookie named `details.name` that applies to `details.url`.
    fn get(&self, details: &CookieDetails) -> Option<Cookie>;

    /// Removes the cookie named `details.name` that applies to `details.url`.
    ///
    /// Removing a cookie that does not exist is not an error.
    fn remove(&self, details: &CookieDetails) -> Result<()>;
}

impl<S: CookieStore + ?Sized> CookieStore for std::sync::Arc<S> {
    fn get(&self, details: &CookieDetails) -> Option<Cookie> {
        (**self).get(details)
    }

    fn remove(&self, details: &CookieDetails) -> Result<()> {
        (**self).remove(details)
    }
}

/// In-memory cookie jar.
///
/// Implements [`reqwest::cookie::CookieStore`] so it can be installed on a
/// `reqwest::Client` with `cookie_provider`, letting responses set cookies
/// that [`CookieStore::remove`] later clears.
#[derive(Debug, Default)]
pub struct SessionCookieJar {
    cookies: Mutex<Vec<Cookie>>,
}

impl SessionCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a host-only cookie for `url` with path `/`.
    pub fn insert(&self, url: &str, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let url = parse_url(url)?;
        let cookie = Cookie {
            name: name.into(),
            value: value.into(),
            domain: url.host_str().unwrap_or_default().to_owned(),
            path: "/".to_owned(),
            expires: None,
            secure: false,
        };
        self.store(cookie);
        Ok(())
    }

    /// Exports the live cookies as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let cookies: Vec<Cookie> = self
            .lock()
            .iter()
            .filter(|cookie| !cookie.is_expired())
            .cloned()
            .collect();
        serde_json::to_string(&cookies)
    }

    /// Restores a jar exported with [`SessionCookieJar::to_json`], dropping expired cookies.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let cookies: Vec<Cookie> = serde_json::from_str(json)?;
        let jar = Self::new();
        for cookie in cookies.into_iter().filter(|cookie| !cookie.is_expired()) {
            jar.store(cookie);
        }
        Ok(jar)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn store(&self, cookie: Cookie) {
        let mut cookies = self.lock();
        cookies.retain(|existing| !existing.same_slot(&cookie));
        cookies.push(cookie);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Cookie>> {
        // A panic while holding the lock cannot leave the Vec half-updated.
        self.cookies
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn apply_set_cookie(&self, header: &str, url: &Url) {
        let Some(parsed) = parse_set_cookie(header, url) else {
            #[cfg(feature = "tracing")]
            tracing::debug!("ignoring malformed Set-Cookie header from {url}");
            return;
        };
        match parsed {
            SetCookie::Store(cookie) => self.store(cookie),
            SetCookie::Expire(cookie) => self.lock().retain(|existing| !existing.same_slot(&cookie)),
        }
    }
}

impl CookieStore for SessionCookieJar {
    fn get(&self, details: &CookieDetails) -> Option<Cookie> {
        let url = parse_url(&details.url).ok()?;
        self.lock()
            .iter()
            .filter(|cookie| cookie.name == details.name && cookie.matches(&url))
            .max_by_key(|cookie| cookie.path.len())
            .cloned()
    }

    fn remove(&self, details: &CookieDetails) -> Result<()> {
        let url = parse_url(&details.url)?;
        self.lock()
            .retain(|cookie| !(cookie.name == details.name && cookie.matches(&url)));
        Ok(())
    }
}

impl reqwest::cookie::CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            if let Ok(header) = header.to_str() {
                self.apply_set_cookie(header, url);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let mut cookies = self.lock();
        cookies.retain(|cookie| !cookie.is_expired());
        let pairs: Vec<String> = cookies
            .iter()
            .filter(|cookie| cookie.matches(url))
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        HeaderValue::from_str(&pairs.join("; ")).ok()
    }
}

enum SetCookie {
    Store(Cookie),
    Expire(Cookie),
}

/// Parses a `Set-Cookie` header received from `url`.
///
/// Returns `None` for malformed headers and for a `Domain` the responding
/// host does not belong to. `Max-Age` wins over `Expires`.
fn parse_set_cookie(header: &str, url: &Url) -> Option<SetCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let host = url.host_str()?;
    let mut cookie = Cookie {
        name: name.to_owned(),
        value: value.trim().trim_matches('"').to_owned(),
        domain: host.to_owned(),
        path: default_path(url),
        expires: None,
        secure: false,
    };
    let mut max_age = None;

    for attribute in parts {
        let (key, value) = attribute.split_once('=').unwrap_or((attribute, ""));
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "domain" if !value.is_empty() => {
                let domain = value.trim_start_matches('.').to_ascii_lowercase();
                if !domain_matches(host, &domain) {
                    return None;
                }
                cookie.domain = domain;
            }
            "path" if value.starts_with('/') => cookie.path = value.to_owned(),
            "expires" => {
                if let Ok(expires) = DateTime::parse_from_rfc2822(value) {
                    cookie.expires = Some(expires.with_timezone(&Utc));
                }
            }
            "max-age" => max_age = value.parse::<i64>().ok().or(max_age),
            "secure" => cookie.secure = true,
            _ => {}
        }
    }

    if let Some(seconds) = max_age {
        cookie.expires = Some(if seconds <= 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            Duration::try_seconds(seconds)
                .and_then(|ttl| Utc::now().checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
    }

    Some(if cookie.is_expired() {
        SetCookie::Expire(cookie)
    } else {
        SetCookie::Store(cookie)
    })
}

fn default_path(url: &Url) -> String {
    match url.path().rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(index) => url.path()[..index].to_owned(),
    }
}

fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|err| RequestError::Cookie(format!("invalid cookie url '{url}': {err}")))
}
