//! Numeric device codes and their display labels.

use serde::Serialize;

type Table = &'static [(i64, &'static str)];

const DECODER_STATES: Table = &[(0, "Stopped"), (1, "Started (No Signal)"), (2, "Active")];

const TROUBLE_CODES: Table = &[
    (-1, "Unsupported Stream"),
    (-2, "Unlicensed"),
    (-3, "Oversubscribed"),
    (-4, "No Memory"),
];

const STREAM_STATES: Table = &[
    (0, "Unknown"),
    (1, "Stopped"),
    (2, "Listening"),
    (3, "Active"),
    (4, "Resolving"),
    (5, "Connecting"),
    (6, "Scrambled"),
    (7, "Securing"),
    (-1, "Invalid"),
    (-2, "Failed"),
    (-3, "Unlicensed"),
];

const MULTISYNC_STATES: Table = &[
    (0, "Unset"),
    (1, "Working"),
    (2, "NTP Not Set"),
    (3, "Timecode Not Present"),
    (4, "Timecode Invalid"),
    (5, "Outside Range"),
];

const PROTOCOLS: Table = &[
    (ENCAPSULATION_UDP, "TS over UDP"),
    (ENCAPSULATION_RTP, "TS over RTP"),
    (ENCAPSULATION_SRT, "TS over SRT"),
    (ENCAPSULATION_RTSP, "RTSP"),
];

const PROTOCOL_SHORT: Table = &[
    (ENCAPSULATION_UDP, "UDP"),
    (ENCAPSULATION_RTP, "RTP"),
    (ENCAPSULATION_SRT, "SRT"),
    (ENCAPSULATION_RTSP, "RTSP"),
];

const CONNECTION_STATES: Table = &[(1, "Waiting"), (2, "Connecting"), (3, "Active")];

pub const ENCAPSULATION_UDP: i64 = 2;
pub const ENCAPSULATION_RTP: i64 = 3;
pub const ENCAPSULATION_SRT: i64 = 34;
pub const ENCAPSULATION_RTSP: i64 = 64;

/// State code substituted when the device omitted one.
pub const MISSING_CODE: i64 = -999;

fn lookup(table: Table, code: i64) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == code)
        .map(|(_, label)| *label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecoderState {
    Stopped,
    StartedNoSignal,
    Active,
    Trouble,
    Other(i64),
}

impl DecoderState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => DecoderState::Stopped,
            1 => DecoderState::StartedNoSignal,
            2 => DecoderState::Active,
            -1 => DecoderState::Trouble,
            other => DecoderState::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            DecoderState::Stopped => 0,
            DecoderState::StartedNoSignal => 1,
            DecoderState::Active => 2,
            DecoderState::Trouble => -1,
            DecoderState::Other(code) => code,
        }
    }

    /// Started, with or without signal.
    pub fn is_running(self) -> bool {
        matches!(self, DecoderState::StartedNoSignal | DecoderState::Active)
    }
}

pub fn trouble_label(trouble_code: Option<i64>) -> String {
    match trouble_code {
        None | Some(0) => "Not Decoding".to_string(),
        Some(code) => lookup(TROUBLE_CODES, code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Error ({code})")),
    }
}

pub fn decoder_state_label(state: Option<i64>, trouble_code: Option<i64>) -> String {
    match state {
        None => "Unknown".to_string(),
        Some(-1) => trouble_label(trouble_code),
        Some(code) => lookup(DECODER_STATES, code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown ({code})")),
    }
}

pub fn stream_state_label(state: Option<i64>) -> String {
    match state {
        None => "Unknown".to_string(),
        Some(code) => lookup(STREAM_STATES, code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Code {code}")),
    }
}

/// Unlisted codes fall back to the text the device reported alongside.
pub fn multisync_label(code: Option<i64>, device_text: Option<&str>) -> String {
    match code {
        None => "Unknown".to_string(),
        Some(code) => {
            let known: Option<&str> = lookup(MULTISYNC_STATES, code);
            known.or(device_text).unwrap_or("Unknown").to_string()
        }
    }
}

pub fn protocol_label(encapsulation: Option<i64>) -> String {
    match encapsulation {
        None => "Unknown".to_string(),
        Some(code) => lookup(PROTOCOLS, code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Type {code}")),
    }
}

pub fn protocol_short(encapsulation: Option<i64>) -> Option<&'static str> {
    encapsulation.and_then(|code| lookup(PROTOCOL_SHORT, code))
}

pub fn connection_state_label(state: Option<i64>) -> &'static str {
    state
        .and_then(|code| lookup(CONNECTION_STATES, code))
        .unwrap_or("Not Connected")
}

/// Coarse signal summary used for button text.
pub fn signal_label(state: Option<i64>) -> &'static str {
    match state {
        Some(2) => "Good",
        Some(1) => "No Signal",
        Some(-1) => "Error",
        _ => "Offline",
    }
}
