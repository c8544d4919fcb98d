//! HTTP transport boundary. `libr2fa`'s `SteamApiClient` talks to
//! `reqwest::blocking::Client` directly; this splits that into an
//! `HttpTransport` trait so the enrollment driver and time synchronizer
//! depend on an interface that tests can fake with scripted responses,
//! keeping `ReqwestTransport` as the real, production default.

use reqwest::cookie::CookieStore;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, COOKIE, REFERER, SET_COOKIE};

use crate::config;
use crate::error::{Error, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// Sends one request and returns the response body as text.
///
/// `form` is used as the query string for GET and as an
/// `application/x-www-form-urlencoded` body for POST, mirroring how
/// `libr2fa`'s `SteamApiClient` builds its requests. Implementations are
/// responsible for attaching `cookies`' current state and absorbing any
/// `Set-Cookie` headers the response carries back into it.
pub trait HttpTransport: std::fmt::Debug {
    fn request(
        &self,
        method: Method,
        url: &str,
        form: &[(&str, &str)],
        cookies: &CookieJar,
    ) -> Result<String, Error>;
}

/// A per-enrollment cookie jar, wrapping `reqwest::cookie::Jar` the way
/// `libr2fa`'s `SteamApiClient` wraps one internally, except owned by the
/// caller so it can be swapped out in tests without a live client.
#[derive(Debug, Default)]
pub struct CookieJar(reqwest::cookie::Jar);

impl CookieJar {
    pub fn new() -> Self {
        Self(reqwest::cookie::Jar::default())
    }

    pub(crate) fn header_value(&self, url: &reqwest::Url) -> Option<HeaderValue> {
        self.0.cookies(url)
    }

    pub(crate) fn absorb(&self, response: &reqwest::blocking::Response) {
        for raw in response.headers().get_all(SET_COOKIE) {
            if let Ok(cookie_str) = raw.to_str() {
                self.0.add_cookie_str(cookie_str, response.url());
            }
        }
    }

    /// The `sessionid` cookie set against the Steam Community domain, once a
    /// session has been established.
    pub fn session_id(&self) -> Option<String> {
        let url = reqwest::Url::parse(config::STEAM_COMMUNITY_BASE).expect("static URL");
        let header = self.0.cookies(&url)?;
        let raw = header.to_str().ok()?;
        raw.split(';').find_map(|kv| {
            let mut parts = kv.trim().splitn(2, '=');
            let key = parts.next()?;
            let value = parts.next()?;
            (key == "sessionid").then(|| value.to_string())
        })
    }
}

/// The production `HttpTransport`, backed by `reqwest::blocking`.
#[derive(Debug)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        let client = reqwest::blocking::ClientBuilder::new()
            .user_agent(config::MOBILE_USER_AGENT)
            .gzip(true)
            .default_headers(Self::default_headers())
            .build()
            .expect("failed to build the Steam HTTP client");
        Self { client }
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(config::MOBILE_REFERER));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/json, text/javascript, text/html, application/xml, text/xml, */*",
            ),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for ReqwestTransport {
    fn request(
        &self,
        method: Method,
        url: &str,
        form: &[(&str, &str)],
        cookies: &CookieJar,
    ) -> Result<String, Error> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::invalid_response(format!("invalid URL {url}: {e}")))?;

        let mut builder = match method {
            Method::Get => self.client.get(parsed.clone()).query(form),
            Method::Post => self.client.post(parsed.clone()).form(form),
        };

        if let Some(cookie_header) = cookies.header_value(&parsed) {
            builder = builder.header(COOKIE, cookie_header);
        }

        log::trace!("{method:?} {url}");

        let response = builder.send().map_err(TransportError::Request)?;
        cookies.absorb(&response);

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }

        response.text().map_err(TransportError::Request).map_err(Into::into)
    }
}
