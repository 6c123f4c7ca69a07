//! Typed view of the device REST payloads.
//!
//! The firmware is loose about types: counters arrive as numbers or strings,
//! flags as booleans or objects. Display fields therefore deserialize into
//! [`Field`], status codes through a lenient integer parser, and flags through
//! a truthiness parser, so one odd field never sinks a whole payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::transport::TransportError;

/// A display value as sent by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Field {
    Int(i64),
    Float(f64),
    Text(String),
    Flag(bool),
    Other(Value),
}

impl Field {
    /// Empty strings count as absent.
    pub fn is_blank(&self) -> bool {
        match self {
            Field::Text(text) => text.trim().is_empty(),
            Field::Other(Value::Null) => true,
            _ => false,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Field::Int(v) => Some(*v),
            Field::Float(v) => Some(*v as i64),
            Field::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Field::Int(v) => Value::from(*v),
            Field::Float(v) => Value::from(*v),
            Field::Text(text) => Value::String(text.clone()),
            Field::Flag(flag) => Value::Bool(*flag),
            Field::Other(value) => value.clone(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Field::Text(text) => text.clone(),
            other => other.to_value().to_string(),
        }
    }
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    })
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Some endpoints wrap their payload (`{"stats": {...}}`), others do not.
fn unwrap_envelope(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or_default()
        }
        other => other,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value, what: &str) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|err| TransportError::Decode(format!("{what}: {err}")))
}

/// `GET /apis/status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemStatus {
    #[serde(deserialize_with = "lenient_text")]
    pub card_type: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub serial_number: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub part_number: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub firmware_version: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub firmware_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub firmware_options: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub boot_version: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub hardware_compatibility: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub hardware_revision: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub cpld_revision: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub card_status: Option<String>,
    pub uptime: Option<Field>,
    pub uptime_sec: Option<Field>,
    pub httpd_uptime: Option<Field>,
    pub temperature: Option<Field>,
}

impl SystemStatus {
    pub fn from_response(value: Value) -> Result<Self, TransportError> {
        decode(value, "system status")
    }

    pub fn card_ok(&self) -> bool {
        self.card_status.as_deref() == Some("OK")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioPair {
    pub av_sync_ms: Option<Field>,
    pub bitrate_in_kbps: Option<Field>,
    pub compression: Option<Field>,
    pub db_left: Option<Field>,
    pub db_left_max: Option<Field>,
    pub db_right: Option<Field>,
    pub db_right_max: Option<Field>,
    pub discontinuities: Option<Field>,
    pub input_layout: Option<Field>,
    pub output_layout: Option<Field>,
    pub language: Option<Field>,
    // Misspelled on the device side.
    #[serde(rename = "sampeRateIn")]
    pub sample_rate_in: Option<Field>,
    #[serde(rename = "sampeRateOut")]
    pub sample_rate_out: Option<Field>,
}

/// `GET /apis/decoders/{n}/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderStats {
    #[serde(deserialize_with = "lenient_code")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_code")]
    pub state: Option<i64>,
    #[serde(deserialize_with = "lenient_code")]
    pub trouble_code: Option<i64>,
    pub uptime: Option<Field>,

    #[serde(deserialize_with = "lenient_code")]
    pub stream_state: Option<i64>,
    pub stream_id: Option<Field>,
    #[serde(deserialize_with = "truthy")]
    pub stream_has_srt_to_udp: bool,
    #[serde(deserialize_with = "truthy")]
    pub decoder_has_been_started: bool,

    pub preprocessor_state: Option<Field>,
    pub vframer_num_input_packets: Option<Field>,
    pub video_input_resolution: Option<Field>,
    pub video_input_frame_rate: Option<Field>,
    pub video_algorithm: Option<Field>,
    pub video_profile: Option<Field>,
    pub video_level: Option<Field>,
    pub video_framing: Option<Field>,
    pub video_slices_per_frame: Option<Field>,

    pub video_latency: Option<Field>,
    pub stc_to_pcr_lead_time: Option<Field>,
    pub video_stc_lead_time: Option<Field>,
    pub video_stc_lead_time_details: Option<Field>,

    pub video_decoder_state: Option<Field>,
    pub video_output_format: Option<Field>,
    pub video_display_format: Option<Field>,
    pub video_display_resolution: Option<Field>,
    pub video_frame_rate: Option<Field>,
    pub load_percentage: Option<Field>,
    pub still_image: Option<Field>,

    pub displayed_output_frames: Option<Field>,
    pub skipped_output_frames: Option<Field>,
    pub replayed_output_frames: Option<Field>,
    pub corrupted_frames: Option<Field>,
    pub oversubscribed_frames: Option<Field>,

    pub buffering_mode: Option<Field>,
    pub buffering_state: Option<Field>,
    pub buffering_adjustments: Option<Field>,

    pub audio_state: Option<Field>,
    pub audio_pairs_amount: Option<Field>,
    pub audio_sample_rate: Option<Field>,
    pub audio_played_frames: Option<Field>,
    pub audio_skipped_frames: Option<Field>,
    pub audio_pairs: Option<Vec<AudioPair>>,

    pub delay_range_min_ms: Option<Field>,
    pub delay_range_max_ms: Option<Field>,

    #[serde(deserialize_with = "lenient_code")]
    pub multisync_status_code: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub multisync_status: Option<String>,
    pub multisync_delay_actual: Option<Field>,
    pub multisync_delay_range: Option<Field>,
    pub multisync_delay_set: Option<Field>,
    pub multisync_system_time: Option<Field>,
    pub multisync_timecode: Option<Field>,
    pub multisync_time_diff: Option<Field>,
    pub multisync_timecode_packets: Option<Field>,
    pub multisync_transmission_time: Option<Field>,

    #[serde(deserialize_with = "truthy")]
    pub klv: bool,
    pub klv_payload_bytes: Option<Field>,
    pub klv_received_packets: Option<Field>,
    pub klv_output_packets: Option<Field>,
    pub klv_latency: Option<Field>,

    #[serde(deserialize_with = "truthy")]
    pub closed_caption: bool,
    pub cc_payload_bytes: Option<Field>,
    pub cc_received_packets: Option<Field>,
    pub cc_output_packets: Option<Field>,
    pub cc_latency: Option<Field>,

    #[serde(deserialize_with = "truthy")]
    pub time_code: bool,
    pub tc_payload_bytes: Option<Field>,
    pub tc_received_packets: Option<Field>,
    pub tc_output_packets: Option<Field>,
    pub tc_latency: Option<Field>,
    pub tc_timecode_value: Option<Field>,

    #[serde(deserialize_with = "truthy")]
    pub afd: bool,
    // The firmware spells this one with an extra `c`.
    pub afdc_payload_bytes: Option<Field>,
    pub afd_received_packets: Option<Field>,
    pub afd_output_packets: Option<Field>,
    pub afd_latency: Option<Field>,

    pub clock_tracking_mode: Option<Field>,
    pub clock_status: Option<Field>,
    pub clock_re_sync_count: Option<Field>,
    pub clock_current_stc: Option<Field>,
    pub clock_stc_avg: Option<Field>,

    pub hdr_type_in: Option<Field>,
    pub hdr_type: Option<Field>,
    pub hdr_colour_primaries: Option<Field>,
    pub hdr_transfer_characteristics: Option<Field>,
    pub hdr_matrix_coefficients: Option<Field>,

    pub last_reset: Option<Field>,
}

impl DecoderStats {
    pub fn from_response(value: Value) -> Result<Self, TransportError> {
        decode(unwrap_envelope(value, "stats"), "decoder stats")
    }

    pub fn first_audio_pair(&self) -> Option<&AudioPair> {
        self.audio_pairs.as_ref().and_then(|pairs| pairs.first())
    }
}

/// `GET /apis/decoders/{n}`. Fields other than the name and stream binding
/// are kept verbatim so the whole object can be written back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderConfig {
    #[serde(deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_code", skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl DecoderConfig {
    pub fn from_response(value: Value) -> Result<Self, TransportError> {
        decode(unwrap_envelope(value, "info"), "decoder config")
    }

    /// Stream bound to this decoder; negative ids mean none.
    pub fn assigned_stream(&self) -> Option<i64> {
        self.stream_id.filter(|id| *id >= 0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamInfo {
    #[serde(deserialize_with = "lenient_code")]
    pub id: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub address: Option<String>,
    pub port: Option<Field>,
    #[serde(deserialize_with = "lenient_code")]
    pub encapsulation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SrtStats {
    #[serde(deserialize_with = "lenient_text")]
    pub remote_address: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub peer_address: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamStats {
    #[serde(deserialize_with = "lenient_code")]
    pub state: Option<i64>,
    pub bitrate: Option<Field>,
    #[serde(deserialize_with = "lenient_text")]
    pub source_address: Option<String>,
    pub uptime: Option<Field>,
    pub received_packets: Option<Field>,
    pub received_bytes: Option<Field>,
    pub stream_summary: Option<Field>,
    pub srt: Option<SrtStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamEntry {
    pub info: StreamInfo,
    pub stats: StreamStats,
}

fn data_member(value: Value, what: &str) -> Result<Value, TransportError> {
    match value {
        Value::Object(mut map) => map
            .remove("data")
            .filter(|data| !data.is_null())
            .ok_or_else(|| TransportError::Decode(format!("{what}: missing data"))),
        _ => Err(TransportError::Decode(format!("{what}: not an object"))),
    }
}

impl StreamEntry {
    /// `GET /apis/streams/{id}` answers `{"data": {...}}`.
    pub fn from_response(value: Value) -> Result<Self, TransportError> {
        decode(data_member(value, "stream")?, "stream")
    }

    /// `GET /apis/streams` answers `{"data": [...]}`.
    pub fn list_from_response(value: Value) -> Result<Vec<Self>, TransportError> {
        decode(data_member(value, "stream list")?, "stream list")
    }
}

/// `GET /apis/presets`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PresetList {
    pub data: Vec<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub active: Option<String>,
    #[serde(deserialize_with = "truthy")]
    pub autosave: bool,
    #[serde(deserialize_with = "truthy")]
    pub active_is_startup: bool,
    #[serde(deserialize_with = "truthy")]
    pub active_was_modified: bool,
}

impl PresetList {
    pub fn from_response(value: Value) -> Result<Self, TransportError> {
        let has_data = value.get("data").is_some_and(Value::is_array);
        if !has_data {
            return Err(TransportError::Decode("preset list: missing data".to_string()));
        }
        decode(value, "preset list")
    }
}

/// `GET /apis/preview`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    #[serde(deserialize_with = "truthy")]
    pub service: bool,
    pub port: Option<Field>,
    pub quality: Option<Field>,
}

impl PreviewSettings {
    pub fn from_response(value: Value) -> Result<Self, TransportError> {
        decode(value, "preview settings")
    }
}
