use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::session::Session;
use crate::store::SnapshotStore;
use crate::transport::{api_path, Method, Transport, TransportError};

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    /// JSON body plus a `Set-Cookie` header.
    JsonWithCookie(Value, &'static str),
    Error(TransportError),
    Binary(Vec<u8>),
    /// Never answers.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub cookie: Option<String>,
}

/// Scripted device. Replies queue up per `METHOD path`; the last reply in a
/// queue is repeated forever. Unscripted requests answer 404.
#[derive(Default)]
pub struct MockTransport {
    session: Session,
    routes: HashMap<String, VecDeque<Reply>>,
    pub requests: Vec<Recorded>,
}

fn route_key(method: Method, path: &str) -> String {
    format!("{method} {}", api_path(path))
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, method: Method, path: &str, reply: Reply) -> Self {
        self.script(method, path, reply);
        self
    }

    pub fn script(&mut self, method: Method, path: &str, reply: Reply) {
        self.routes
            .entry(route_key(method, path))
            .or_default()
            .push_back(reply);
    }

    /// Drops earlier replies for the route and answers with `reply` only.
    pub fn replace(&mut self, method: Method, path: &str, reply: Reply) {
        self.routes
            .insert(route_key(method, path), VecDeque::from([reply]));
    }

    fn next_reply(&mut self, method: Method, path: &str) -> Option<Reply> {
        let queue = self.routes.get_mut(&route_key(method, path))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn record(&mut self, method: Method, path: &str, body: Option<Value>) {
        self.requests.push(Recorded {
            method,
            path: api_path(path),
            body,
            cookie: self.session.cookie_header(),
        });
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        let path = api_path(path);
        self.requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests
            .iter()
            .map(|r| format!("{} {}", r.method, r.path))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.record(method, path, body);
        match self.next_reply(method, path) {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::JsonWithCookie(value, cookie)) => {
                self.session.absorb_set_cookie(cookie);
                Ok(value)
            }
            Some(Reply::Error(TransportError::AuthRequired)) => {
                self.session.invalidate();
                Err(TransportError::AuthRequired)
            }
            Some(Reply::Error(err)) => Err(err),
            Some(Reply::Binary(_)) => Err(TransportError::Decode("binary body".to_string())),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(TransportError::Http { status: 404 }),
        }
    }

    async fn request_binary(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        self.record(Method::Get, path, None);
        match self.next_reply(Method::Get, path) {
            Some(Reply::Binary(bytes)) => Ok(bytes),
            Some(Reply::Error(TransportError::AuthRequired)) => {
                self.session.invalidate();
                Err(TransportError::AuthRequired)
            }
            Some(Reply::Error(err)) => Err(err),
            Some(Reply::Hang) => std::future::pending().await,
            Some(_) => Err(TransportError::Decode("expected binary body".to_string())),
            None => Err(TransportError::Http { status: 404 }),
        }
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

pub const SESSION_SET_COOKIE: &str = "SessionID=abc123; Path=/; HttpOnly";

pub fn config() -> ConnectionConfig {
    ConnectionConfig {
        host: "192.0.2.10".to_string(),
        password: "secret".to_string(),
        request_timeout: Duration::from_secs(5),
        ..ConnectionConfig::default()
    }
}

pub fn anonymous_config() -> ConnectionConfig {
    ConnectionConfig {
        password: String::new(),
        ..config()
    }
}

pub fn connection(transport: MockTransport, config: ConnectionConfig) -> Connection<MockTransport> {
    let store = SnapshotStore::new(config.host.clone());
    Connection::new(transport, config, store)
}

pub fn status_ok() -> Value {
    json!({
        "cardType": "Makito X4 Decoder",
        "serialNumber": "MX4D-0001",
        "firmwareVersion": "1.8.0",
        "cardStatus": "OK",
        "uptime": "3 days 01:02:03",
        "uptimeSec": 262923,
        "temperature": 41,
    })
}

pub fn decoder_stats(state: i64) -> Value {
    json!({
        "stats": {
            "state": state,
            "streamState": 3,
            "uptime": "00:10:00",
            "videoAlgorithm": "H.265",
            "klv": {"enabled": true},
            "audioPairs": [{"dbLeft": -12, "sampeRateIn": 48000}],
        }
    })
}

pub fn decoder_config(name: &str, stream_id: i64) -> Value {
    json!({
        "info": {
            "name": name,
            "streamId": stream_id,
            "outputs": [1, 0],
            "stillImage": "none",
        }
    })
}

pub fn stream_info(id: i64, name: &str) -> Value {
    json!({
        "info": {
            "id": id,
            "name": name,
            "address": "239.1.1.1",
            "port": 5004,
            "encapsulation": 2,
        },
        "stats": {
            "state": 3,
            "bitrate": "5000 kbps",
            "sourceAddress": "10.1.1.20",
            "uptime": "120s",
            "receivedPackets": 1200,
            "receivedBytes": 1504000,
        }
    })
}

pub fn stream_detail(id: i64, name: &str) -> Value {
    json!({ "data": stream_info(id, name) })
}

pub fn stream_list(entries: &[(i64, &str)]) -> Value {
    let data: Vec<Value> = entries
        .iter()
        .map(|(id, name)| stream_info(*id, name))
        .collect();
    json!({ "data": data })
}

pub fn preset_list() -> Value {
    json!({
        "data": ["studio.cfg", "backup.cfg"],
        "active": "studio.cfg",
        "autosave": true,
        "activeWasModified": false,
    })
}

pub fn preview_settings() -> Value {
    json!({ "service": true, "port": 8080, "quality": "high" })
}

/// A device with credentials, decoders 0 and 1 running on stream 1, and
/// decoders 2 and 3 stopped and unassigned.
pub fn healthy_device() -> MockTransport {
    let mut mock = MockTransport::new()
        .on(
            Method::Post,
            "/apis/authentication",
            Reply::JsonWithCookie(json!({}), SESSION_SET_COOKIE),
        )
        .on(Method::Get, "/apis/status", Reply::Json(status_ok()))
        .on(
            Method::Get,
            "/apis/streams",
            Reply::Json(stream_list(&[(1, "Camera 1"), (2, "Camera 2")])),
        )
        .on(Method::Get, "/apis/streams/1", Reply::Json(stream_detail(1, "Camera 1")))
        .on(Method::Get, "/apis/presets", Reply::Json(preset_list()))
        .on(Method::Get, "/apis/preview", Reply::Json(preview_settings()));

    for (index, state, stream_id) in [(0, 2, 1), (1, 1, 1), (2, 0, -1), (3, 0, -1)] {
        mock.script(
            Method::Get,
            &format!("/apis/decoders/{index}/stats"),
            Reply::Json(decoder_stats(state)),
        );
        mock.script(
            Method::Get,
            &format!("/apis/decoders/{index}"),
            Reply::Json(decoder_config(&format!("Feed {index}"), stream_id)),
        );
        mock.script(
            Method::Get,
            &format!("/apis/decoders/{index}/preview"),
            Reply::Binary(vec![0xFF, 0xD8, 0xFF, 0xE0, index as u8]),
        );
    }
    mock
}
