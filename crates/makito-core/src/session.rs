use std::collections::BTreeMap;
use std::fmt;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::transport::{Method, Transport, TransportError};

pub const SESSION_COOKIE: &str = "SessionID";
const AUTH_PATH: &str = "/apis/authentication";

/// Cookie jar plus the authenticated flag for one device connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    authenticated: bool,
    cookies: BTreeMap<String, String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn cookie_names(&self) -> Vec<&str> {
        self.cookies.keys().map(String::as_str).collect()
    }

    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Keeps the `name=value` pair in front of the first `;` and ignores the
    /// cookie attributes.
    pub fn absorb_set_cookie(&mut self, raw: &str) {
        let pair = raw.split(';').next().unwrap_or_default();
        let Some((name, value)) = pair.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.cookies.insert(name.to_string(), value.trim().to_string());
    }

    pub fn invalidate(&mut self) {
        self.authenticated = false;
        self.cookies.clear();
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.authenticated = true;
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Devices without configured credentials are polled unauthenticated.
    pub fn from_config(config: &ConnectionConfig) -> Option<Self> {
        if config.username.is_empty() || config.password.is_empty() {
            return None;
        }
        Some(Self {
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication request failed: {0}")]
    Rejected(TransportError),
    #[error("authentication response carried no SessionID cookie")]
    NoSessionCookie,
}

/// Logs in with `credentials`. The transport captures the session cookie;
/// success means the device handed out a `SessionID`.
pub async fn authenticate<T: Transport + ?Sized>(
    transport: &mut T,
    credentials: &Credentials,
) -> Result<(), AuthError> {
    transport.session_mut().invalidate();
    debug!(username = %credentials.username, path = AUTH_PATH, "authenticating");

    let body = json!({
        "username": credentials.username,
        "password": credentials.password,
    });
    if let Err(err) = transport.request(Method::Post, AUTH_PATH, Some(body)).await {
        warn!(error = %err, "authentication failed");
        return Err(AuthError::Rejected(err));
    }

    if !transport.session().has_cookie(SESSION_COOKIE) {
        warn!("authentication response received but no SessionID cookie");
        return Err(AuthError::NoSessionCookie);
    }

    transport.session_mut().mark_authenticated();
    info!("authentication successful");
    Ok(())
}
