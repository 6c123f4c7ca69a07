use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, CONTENT_TYPE, COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConnectionConfig;
use crate::session::Session;

const USER_AGENT: &str = concat!("makitod/", env!("CARGO_PKG_VERSION"));
const JSON_ACCEPT: &str = "application/json, text/plain, */*";
const IMAGE_ACCEPT: &str = "image/jpeg, image/png, */*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported method {0}")]
pub struct UnsupportedMethod(pub String);

impl FromStr for Method {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP 401: authentication required")]
    AuthRequired,
    #[error("HTTP {status}")]
    Http { status: u16 },
    #[error("request timeout")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Request/response boundary to the device. Implementations own the session
/// cookie jar and must clear it whenever the device answers 401.
#[async_trait]
pub trait Transport: Send {
    async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError>;
    async fn request_binary(&mut self, path: &str) -> Result<Vec<u8>, TransportError>;
    fn session(&self) -> &Session;
    fn session_mut(&mut self) -> &mut Session;
}

/// Every device endpoint lives under `/apis`.
pub fn api_path(endpoint: &str) -> String {
    let path = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    };
    if path.starts_with("/apis") {
        path
    } else {
        format!("/apis{path}")
    }
}

pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}

pub struct HttpTransport {
    client: Client,
    base_url: String,
    session: Session,
}

impl HttpTransport {
    pub fn new(config: &ConnectionConfig) -> Result<Self, TransportError> {
        // Devices ship with self-signed certificates.
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            session: Session::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, api_path(path))
    }

    fn absorb_cookies(&mut self, headers: &HeaderMap) {
        for raw in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = raw.to_str() {
                self.session.absorb_set_cookie(raw);
            }
        }
    }

    fn cookie_request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.cookie_header() {
            Some(cookie) => {
                debug!(cookies = ?self.session.cookie_names(), "attaching session cookies");
                builder.header(COOKIE, cookie)
            }
            None => builder,
        }
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let url = self.url(path);
        debug!(%method, %url, "device request");

        let mut builder = self
            .client
            .request(method.into(), &url)
            .header(ACCEPT, JSON_ACCEPT)
            .header(CONTENT_TYPE, "application/json");
        builder = self.cookie_request(builder);
        if let Some(body) = body.filter(|_| method != Method::Get) {
            builder = builder.json(&body);
        }

        let res = builder.send().await.map_err(map_reqwest_error)?;
        self.absorb_cookies(res.headers());

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!(%url, "device answered 401, session dropped");
            self.session.invalidate();
            return Err(TransportError::AuthRequired);
        }
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            debug!(%url, status = status.as_u16(), body = %text, "device request failed");
            return Err(TransportError::Http {
                status: status.as_u16(),
            });
        }

        let text = res.text().await.map_err(map_reqwest_error)?;
        Ok(parse_body(&text))
    }

    async fn request_binary(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.url(path);
        debug!(%url, "device binary request");

        let builder = self.client.get(&url).header(ACCEPT, IMAGE_ACCEPT);
        let res = self
            .cookie_request(builder)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        self.absorb_cookies(res.headers());

        match res.status() {
            StatusCode::OK => {
                let bytes = res.bytes().await.map_err(map_reqwest_error)?;
                debug!(%url, len = bytes.len(), "binary payload received");
                Ok(bytes.to_vec())
            }
            StatusCode::UNAUTHORIZED => {
                self.session.invalidate();
                Err(TransportError::AuthRequired)
            }
            status => Err(TransportError::Http {
                status: status.as_u16(),
            }),
        }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
