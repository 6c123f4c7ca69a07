use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reconcile::{DecoderChoice, StreamChoice, Vars};

/// Point-in-time view of one device, with every variable already reconciled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: DateTime<Utc>,
    pub epoch: u64,
    pub tick: u64,
    pub status: ConnectionStatus,
    /// Device-wide variables.
    pub system: Vars,
    /// Unprefixed per-decoder variables, indexed by decoder.
    pub decoders: Vec<Vars>,
    /// `system` plus every decoder's keys as `decoder<N>_<key>`.
    pub vars: Vars,
    pub stream_choices: Vec<StreamChoice>,
    pub decoder_choices: Vec<DecoderChoice>,
    pub presets: Vec<String>,
    pub thumbnails: Vec<Option<ThumbnailMeta>>,
}

impl Snapshot {
    pub fn decoder(&self, index: usize) -> Option<&Vars> {
        self.decoders.get(index)
    }

    pub fn var(&self, key: &str) -> Option<&serde_json::Value> {
        self.vars.get(key)
    }

    pub fn decoder_state_code(&self, index: usize) -> Option<i64> {
        self.decoder(index)?.get("state_code")?.as_i64()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Ok,
    BadConfig(String),
    ConnectionFailure(String),
    Disconnected,
}

impl ConnectionStatus {
    pub fn code(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Ok => "ok",
            ConnectionStatus::BadConfig(_) => "bad_config",
            ConnectionStatus::ConnectionFailure(_) => "connection_failure",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ConnectionStatus::BadConfig(detail) | ConnectionStatus::ConnectionFailure(detail) => {
                Some(detail)
            }
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ConnectionStatus::Ok)
    }
}

/// Latest preview frame for one decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub bytes: Vec<u8>,
    pub fetched_at: DateTime<Utc>,
}

impl Thumbnail {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            fetched_at: Utc::now(),
        }
    }

    pub fn mime_type(&self) -> &'static str {
        if self.bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else {
            "image/jpeg"
        }
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type(), BASE64.encode(&self.bytes))
    }
}

/// What a snapshot records about a stored thumbnail; the image itself stays
/// in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailMeta {
    pub mime_type: String,
    pub len: usize,
    pub fetched_at: DateTime<Utc>,
}

impl From<&Thumbnail> for ThumbnailMeta {
    fn from(thumbnail: &Thumbnail) -> Self {
        Self {
            mime_type: thumbnail.mime_type().to_string(),
            len: thumbnail.bytes.len(),
            fetched_at: thumbnail.fetched_at,
        }
    }
}
