//! Turns raw device payloads into flat display variables.
//!
//! Every function here is pure: the output depends only on the snapshot
//! pieces passed in, and every key is emitted on every call, with the
//! defaults from [`defaults`] filling in whatever the device left out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{
    DecoderConfig, DecoderStats, Field, PresetList, PreviewSettings, StreamEntry, SystemStatus,
};
use crate::codes::{self, ENCAPSULATION_SRT, MISSING_CODE};
use crate::snapshot::ConnectionStatus;

pub type Vars = BTreeMap<String, Value>;
pub type StreamMap = BTreeMap<i64, String>;

pub const DECODER_COUNT: usize = 4;

pub mod defaults {
    pub const UNKNOWN: &str = "Unknown";
    pub const NOT_AVAILABLE: &str = "N/A";
    pub const NONE: &str = "None";
    pub const ZERO: &str = "0";
    pub const ZERO_BITRATE: &str = "0 kbps";
    pub const NO_AUDIO_LEVEL: &str = "-∞";
    pub const NO_UPTIME: &str = "00:00:00";
    pub const SYSTEM_UPTIME: &str = "0 days 00:00:00";
    pub const SDR: &str = "SDR";
    pub const NEVER: &str = "Never";
    pub const NO_STREAM_SUMMARY: &str = "No data";
    pub const PREVIEW_PORT: i64 = 8080;
    pub const UNASSIGNED_STREAM_ID: i64 = -1;

    /// Stream-detail keys for a decoder with no usable stream behind it.
    pub const STREAM_DETAIL: [(&str, &str); 10] = [
        ("stream_protocol", "None"),
        ("stream_address", "N/A"),
        ("stream_port", "N/A"),
        ("stream_bitrate", "0 kbps"),
        ("stream_source_address", "Unknown"),
        ("stream_uptime", "0s"),
        ("stream_connection_state", "Not Connected"),
        ("stream_received_packets", "0"),
        ("stream_received_bytes", "0"),
        ("stream_summary", "No stream"),
    ];
}

#[derive(Debug, Clone, Copy)]
enum Fallback {
    Text(&'static str),
    Number(i64),
}

impl Fallback {
    fn to_value(self) -> Value {
        match self {
            Fallback::Text(text) => Value::from(text),
            Fallback::Number(n) => Value::from(n),
        }
    }
}

fn pick(field: Option<&Field>, fallback: Fallback) -> Value {
    match field {
        Some(field) if !field.is_blank() => field.to_value(),
        _ => fallback.to_value(),
    }
}

fn pick_text(text: Option<&str>, fallback: &str) -> Value {
    Value::from(text.filter(|t| !t.trim().is_empty()).unwrap_or(fallback))
}

fn yes_no(flag: bool) -> Value {
    Value::from(if flag { "Yes" } else { "No" })
}

fn enabled(flag: bool) -> Value {
    Value::from(if flag { "Enabled" } else { "Disabled" })
}

fn put(vars: &mut Vars, key: &str, value: impl Into<Value>) {
    vars.insert(key.to_string(), value.into());
}

/// How a decoder's configured stream id resolved against the device.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamResolution {
    Unassigned,
    Resolved(StreamEntry),
    /// The device answered 404 for the id.
    Stale { id: i64 },
    /// The detail fetch failed.
    Unavailable { id: i64 },
}

/// A decoder's configuration together with the stream it pointed at when
/// the configuration was read.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderBinding {
    pub config: DecoderConfig,
    pub stream: StreamResolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChoice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderChoice {
    pub id: usize,
    pub label: String,
}

/// The full stream list plus the lookups derived from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamCatalog {
    pub entries: Vec<StreamEntry>,
    pub names: StreamMap,
    pub choices: Vec<StreamChoice>,
}

impl StreamCatalog {
    pub fn from_entries(entries: Vec<StreamEntry>) -> Self {
        let mut names = StreamMap::new();
        let mut choices = vec![StreamChoice {
            id: defaults::UNASSIGNED_STREAM_ID.to_string(),
            label: "No Stream".to_string(),
        }];

        for entry in &entries {
            let Some(id) = entry.info.id else {
                continue;
            };
            let name = entry
                .info
                .name
                .clone()
                .unwrap_or_else(|| format!("Stream {id}"));

            let mut label = name.clone();
            let port = entry.info.port.as_ref().filter(|p| !p.is_blank());
            if let (Some(address), Some(port)) = (entry.info.address.as_deref(), port) {
                label.push_str(&format!(" ({address}:{})", port.to_text()));
            }
            if let Some(short) = codes::protocol_short(entry.info.encapsulation) {
                label.push_str(&format!(" [{short}]"));
            }

            names.insert(id, name);
            choices.push(StreamChoice {
                id: id.to_string(),
                label,
            });
        }

        Self {
            entries,
            names,
            choices,
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.names.contains_key(&id)
    }

    pub fn name(&self, id: i64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }
}

/// `Connected` / `Error` / `Disconnected`, from the latest system fetch.
pub fn connection_indicator(
    connection: &ConnectionStatus,
    status: Option<&SystemStatus>,
) -> &'static str {
    match (connection, status) {
        (ConnectionStatus::Ok, Some(status)) if status.card_ok() => "Connected",
        (ConnectionStatus::Ok, Some(_)) => "Error",
        _ => "Disconnected",
    }
}

pub fn reconcile_system(
    status: Option<&SystemStatus>,
    connection: &ConnectionStatus,
    host: &str,
) -> Vars {
    use defaults::*;

    let fallback = SystemStatus::default();
    let s = status.unwrap_or(&fallback);
    let mut vars = Vars::new();

    put(&mut vars, "device_type", pick_text(s.card_type.as_deref(), UNKNOWN));
    put(&mut vars, "device_serial", pick_text(s.serial_number.as_deref(), UNKNOWN));
    put(&mut vars, "device_part_number", pick_text(s.part_number.as_deref(), UNKNOWN));
    put(&mut vars, "device_version", pick_text(s.firmware_version.as_deref(), UNKNOWN));
    put(&mut vars, "device_firmware_date", pick_text(s.firmware_date.as_deref(), UNKNOWN));
    put(&mut vars, "device_firmware_options", pick_text(s.firmware_options.as_deref(), NONE));
    put(&mut vars, "device_boot_version", pick_text(s.boot_version.as_deref(), UNKNOWN));
    put(
        &mut vars,
        "device_hw_compatibility",
        pick_text(s.hardware_compatibility.as_deref(), UNKNOWN),
    );
    put(&mut vars, "device_hw_revision", pick_text(s.hardware_revision.as_deref(), UNKNOWN));
    put(&mut vars, "device_cpld_revision", pick_text(s.cpld_revision.as_deref(), UNKNOWN));
    put(&mut vars, "device_status", pick_text(s.card_status.as_deref(), UNKNOWN));
    put(&mut vars, "device_uptime", pick(s.uptime.as_ref(), Fallback::Text(SYSTEM_UPTIME)));
    put(&mut vars, "device_uptime_seconds", pick(s.uptime_sec.as_ref(), Fallback::Number(0)));
    put(&mut vars, "device_httpd_uptime", pick(s.httpd_uptime.as_ref(), Fallback::Text(ZERO)));

    let temperature = match s.temperature.as_ref().filter(|t| !t.is_blank()) {
        Some(t) => format!("{}°C", t.to_text()),
        None => UNKNOWN.to_string(),
    };
    put(&mut vars, "device_temperature", temperature);

    put(&mut vars, "connection_status", connection_indicator(connection, status));
    let host = host.trim();
    put(
        &mut vars,
        "device_ip",
        if host.is_empty() { "Not configured" } else { host },
    );

    vars
}

pub fn reconcile_presets(presets: Option<&PresetList>) -> Vars {
    let fallback = PresetList::default();
    let p = presets.unwrap_or(&fallback);
    let mut vars = Vars::new();
    put(&mut vars, "preset_active", pick_text(p.active.as_deref(), defaults::NONE));
    put(&mut vars, "preset_autosave", enabled(p.autosave));
    put(&mut vars, "preset_modified", yes_no(p.active_was_modified));
    put(&mut vars, "preset_count", p.data.len());
    vars
}

pub fn reconcile_preview(preview: Option<&PreviewSettings>) -> Vars {
    let fallback = PreviewSettings::default();
    let p = preview.unwrap_or(&fallback);
    let mut vars = Vars::new();
    put(&mut vars, "preview_service", enabled(p.service));
    put(
        &mut vars,
        "preview_port",
        pick(p.port.as_ref(), Fallback::Number(defaults::PREVIEW_PORT)),
    );
    put(
        &mut vars,
        "preview_quality",
        pick(p.quality.as_ref(), Fallback::Text(defaults::UNKNOWN)),
    );
    vars
}

pub fn reconcile_stream_count(catalog: Option<&StreamCatalog>) -> Vars {
    let mut vars = Vars::new();
    put(
        &mut vars,
        "stream_count",
        catalog.map(|c| c.entries.len()).unwrap_or_default(),
    );
    vars
}

/// Plain stats fields with their defaults, in display order.
fn stats_fields(stats: &DecoderStats) -> Vec<(&'static str, Option<&Field>, Fallback)> {
    use defaults::*;
    use Fallback::{Number as N, Text as T};

    let pair = stats.first_audio_pair();
    let audio = |get: fn(&crate::api::AudioPair) -> Option<&Field>| pair.and_then(get);

    vec![
        ("uptime", stats.uptime.as_ref(), T(NO_UPTIME)),
        ("stream_id", stats.stream_id.as_ref(), T(NOT_AVAILABLE)),
        // video input
        ("preprocessor_state", stats.preprocessor_state.as_ref(), T(UNKNOWN)),
        ("vframer_packets", stats.vframer_num_input_packets.as_ref(), N(0)),
        ("video_input_resolution", stats.video_input_resolution.as_ref(), T(UNKNOWN)),
        ("video_input_framerate", stats.video_input_frame_rate.as_ref(), T(ZERO)),
        ("video_algorithm", stats.video_algorithm.as_ref(), T(UNKNOWN)),
        ("video_profile", stats.video_profile.as_ref(), T(UNKNOWN)),
        ("video_level", stats.video_level.as_ref(), T(UNKNOWN)),
        ("video_framing", stats.video_framing.as_ref(), T(UNKNOWN)),
        ("video_slices", stats.video_slices_per_frame.as_ref(), T(ZERO)),
        // timing
        ("video_latency", stats.video_latency.as_ref(), T(ZERO)),
        ("stc_to_pcr_lead", stats.stc_to_pcr_lead_time.as_ref(), T(ZERO)),
        ("video_stc_lead", stats.video_stc_lead_time.as_ref(), T(ZERO)),
        ("video_stc_details", stats.video_stc_lead_time_details.as_ref(), T(NOT_AVAILABLE)),
        // decoder output
        ("video_decoder_state", stats.video_decoder_state.as_ref(), T(UNKNOWN)),
        ("video_output_format", stats.video_output_format.as_ref(), T(UNKNOWN)),
        ("video_display_format", stats.video_display_format.as_ref(), T(UNKNOWN)),
        ("video_display_resolution", stats.video_display_resolution.as_ref(), T(UNKNOWN)),
        ("video_framerate", stats.video_frame_rate.as_ref(), T(ZERO)),
        ("load_percentage", stats.load_percentage.as_ref(), N(0)),
        ("still_image", stats.still_image.as_ref(), T(NONE)),
        // frame counters
        ("displayed_frames", stats.displayed_output_frames.as_ref(), T(ZERO)),
        ("skipped_frames", stats.skipped_output_frames.as_ref(), T(ZERO)),
        ("replayed_frames", stats.replayed_output_frames.as_ref(), T(ZERO)),
        ("corrupted_frames", stats.corrupted_frames.as_ref(), T(ZERO)),
        ("oversubscribed_frames", stats.oversubscribed_frames.as_ref(), T(ZERO)),
        // buffering
        ("buffer_mode", stats.buffering_mode.as_ref(), T(UNKNOWN)),
        ("buffer_state", stats.buffering_state.as_ref(), T(UNKNOWN)),
        ("buffer_adjustments", stats.buffering_adjustments.as_ref(), T(ZERO)),
        // audio
        ("audio_state", stats.audio_state.as_ref(), T(UNKNOWN)),
        ("audio_pairs_count", stats.audio_pairs_amount.as_ref(), N(0)),
        ("audio_sample_rate", stats.audio_sample_rate.as_ref(), T(ZERO)),
        ("audio_played_frames", stats.audio_played_frames.as_ref(), T(ZERO)),
        ("audio_skipped_frames", stats.audio_skipped_frames.as_ref(), T(ZERO)),
        ("audio_avsync", audio(|p| p.av_sync_ms.as_ref()), N(0)),
        ("audio_bitrate", audio(|p| p.bitrate_in_kbps.as_ref()), N(0)),
        ("audio_compression", audio(|p| p.compression.as_ref()), T(UNKNOWN)),
        ("audio_db_left", audio(|p| p.db_left.as_ref()), T(NO_AUDIO_LEVEL)),
        ("audio_db_left_max", audio(|p| p.db_left_max.as_ref()), T(NO_AUDIO_LEVEL)),
        ("audio_db_right", audio(|p| p.db_right.as_ref()), T(NO_AUDIO_LEVEL)),
        ("audio_db_right_max", audio(|p| p.db_right_max.as_ref()), T(NO_AUDIO_LEVEL)),
        ("audio_discontinuities", audio(|p| p.discontinuities.as_ref()), N(0)),
        ("audio_input_layout", audio(|p| p.input_layout.as_ref()), T(UNKNOWN)),
        ("audio_output_layout", audio(|p| p.output_layout.as_ref()), T(UNKNOWN)),
        ("audio_language", audio(|p| p.language.as_ref()), T(UNKNOWN)),
        ("audio_sample_in", audio(|p| p.sample_rate_in.as_ref()), N(0)),
        ("audio_sample_out", audio(|p| p.sample_rate_out.as_ref()), N(0)),
        // delay range
        ("delay_min", stats.delay_range_min_ms.as_ref(), N(0)),
        ("delay_max", stats.delay_range_max_ms.as_ref(), N(0)),
        // multisync
        ("multisync_delay_actual", stats.multisync_delay_actual.as_ref(), T(NOT_AVAILABLE)),
        ("multisync_delay_range", stats.multisync_delay_range.as_ref(), T(NOT_AVAILABLE)),
        ("multisync_delay_set", stats.multisync_delay_set.as_ref(), T(NOT_AVAILABLE)),
        ("multisync_system_time", stats.multisync_system_time.as_ref(), T(NOT_AVAILABLE)),
        ("multisync_timecode", stats.multisync_timecode.as_ref(), T(NOT_AVAILABLE)),
        ("multisync_time_diff", stats.multisync_time_diff.as_ref(), T(NOT_AVAILABLE)),
        ("multisync_tc_packets", stats.multisync_timecode_packets.as_ref(), T(ZERO)),
        ("multisync_transmission", stats.multisync_transmission_time.as_ref(), T(NOT_AVAILABLE)),
        // metadata
        ("klv_payload_bytes", stats.klv_payload_bytes.as_ref(), T(ZERO)),
        ("klv_received", stats.klv_received_packets.as_ref(), T(ZERO)),
        ("klv_output", stats.klv_output_packets.as_ref(), T(ZERO)),
        ("klv_latency", stats.klv_latency.as_ref(), T(ZERO)),
        ("cc_payload_bytes", stats.cc_payload_bytes.as_ref(), T(ZERO)),
        ("cc_received", stats.cc_received_packets.as_ref(), T(ZERO)),
        ("cc_output", stats.cc_output_packets.as_ref(), T(ZERO)),
        ("cc_latency", stats.cc_latency.as_ref(), T(ZERO)),
        ("tc_payload_bytes", stats.tc_payload_bytes.as_ref(), T(ZERO)),
        ("tc_received", stats.tc_received_packets.as_ref(), T(ZERO)),
        ("tc_output", stats.tc_output_packets.as_ref(), T(ZERO)),
        ("tc_latency", stats.tc_latency.as_ref(), T(ZERO)),
        ("tc_value", stats.tc_timecode_value.as_ref(), T(NOT_AVAILABLE)),
        ("afd_payload_bytes", stats.afdc_payload_bytes.as_ref(), T(ZERO)),
        ("afd_received", stats.afd_received_packets.as_ref(), T(ZERO)),
        ("afd_output", stats.afd_output_packets.as_ref(), T(ZERO)),
        ("afd_latency", stats.afd_latency.as_ref(), T(ZERO)),
        // clock tracking
        ("clock_mode", stats.clock_tracking_mode.as_ref(), T(UNKNOWN)),
        ("clock_status", stats.clock_status.as_ref(), T(UNKNOWN)),
        ("clock_resync_count", stats.clock_re_sync_count.as_ref(), N(0)),
        ("clock_current_stc", stats.clock_current_stc.as_ref(), T(UNKNOWN)),
        ("clock_stc_avg", stats.clock_stc_avg.as_ref(), T(UNKNOWN)),
        // HDR
        ("hdr_type_in", stats.hdr_type_in.as_ref(), T(SDR)),
        ("hdr_type", stats.hdr_type.as_ref(), T(SDR)),
        ("hdr_primaries", stats.hdr_colour_primaries.as_ref(), T(UNKNOWN)),
        ("hdr_transfer", stats.hdr_transfer_characteristics.as_ref(), T(UNKNOWN)),
        ("hdr_matrix", stats.hdr_matrix_coefficients.as_ref(), T(UNKNOWN)),
        ("last_reset", stats.last_reset.as_ref(), T(NEVER)),
    ]
}

fn reconcile_stats(index: usize, stats: &DecoderStats, vars: &mut Vars) {
    put(vars, "id", stats.id.unwrap_or(index as i64));
    put(vars, "state", codes::decoder_state_label(stats.state, stats.trouble_code));
    put(vars, "state_code", stats.state.unwrap_or(MISSING_CODE));
    put(vars, "trouble_code", stats.trouble_code.unwrap_or(0));
    put(vars, "stream_state", codes::stream_state_label(stats.stream_state));
    put(vars, "stream_state_code", stats.stream_state.unwrap_or(MISSING_CODE));
    put(vars, "stream_has_srt_to_udp", yes_no(stats.stream_has_srt_to_udp));
    put(vars, "decoder_started", yes_no(stats.decoder_has_been_started));
    put(
        vars,
        "multisync_status",
        codes::multisync_label(stats.multisync_status_code, stats.multisync_status.as_deref()),
    );
    put(vars, "has_klv", yes_no(stats.klv));
    put(vars, "has_cc", yes_no(stats.closed_caption));
    put(vars, "has_timecode", yes_no(stats.time_code));
    put(vars, "has_afd", yes_no(stats.afd));
    put(vars, "signal", codes::signal_label(stats.state));

    for (key, field, fallback) in stats_fields(stats) {
        put(vars, key, pick(field, fallback));
    }
}

/// The stream a decoder should display, if any. Stale ids (absent from the
/// latest stream list) and mismatched details are treated as no stream.
pub fn resolved_stream<'a>(
    binding: Option<&'a DecoderBinding>,
    catalog: Option<&StreamCatalog>,
) -> Option<&'a StreamEntry> {
    let binding = binding?;
    let id = binding.config.assigned_stream()?;
    let StreamResolution::Resolved(entry) = &binding.stream else {
        return None;
    };
    if entry.info.id.is_some_and(|entry_id| entry_id != id) {
        return None;
    }
    if catalog.is_some_and(|catalog| !catalog.contains(id)) {
        return None;
    }
    Some(entry)
}

fn reconcile_stream_detail(entry: Option<&StreamEntry>, decoder_state: Option<i64>, vars: &mut Vars) {
    let Some(entry) = entry else {
        for (key, value) in defaults::STREAM_DETAIL {
            put(vars, key, value);
        }
        return;
    };

    let info = &entry.info;
    let stats = &entry.stats;

    let mut source = stats.source_address.clone();
    if info.encapsulation == Some(ENCAPSULATION_SRT) {
        if let Some(srt) = &stats.srt {
            source = srt
                .remote_address
                .clone()
                .or_else(|| srt.peer_address.clone())
                .or(source);
        }
    }

    // A stopped decoder keeps its stream stats around; do not show them live.
    let bitrate = if decoder_state.is_some_and(|state| state > 0) {
        pick(stats.bitrate.as_ref(), Fallback::Text(defaults::ZERO_BITRATE))
    } else {
        Value::from(defaults::ZERO_BITRATE)
    };

    put(vars, "stream_protocol", codes::protocol_label(info.encapsulation));
    put(vars, "stream_address", pick_text(info.address.as_deref(), defaults::NOT_AVAILABLE));
    put(
        vars,
        "stream_port",
        pick(info.port.as_ref(), Fallback::Text(defaults::NOT_AVAILABLE)),
    );
    put(vars, "stream_bitrate", bitrate);
    put(vars, "stream_source_address", pick_text(source.as_deref(), defaults::UNKNOWN));
    put(vars, "stream_uptime", pick(stats.uptime.as_ref(), Fallback::Text("0s")));
    put(vars, "stream_connection_state", codes::connection_state_label(stats.state));
    put(
        vars,
        "stream_received_packets",
        pick(stats.received_packets.as_ref(), Fallback::Text(defaults::ZERO)),
    );
    put(
        vars,
        "stream_received_bytes",
        pick(stats.received_bytes.as_ref(), Fallback::Text(defaults::ZERO)),
    );
    put(
        vars,
        "stream_summary",
        pick(stats.stream_summary.as_ref(), Fallback::Text(defaults::NO_STREAM_SUMMARY)),
    );
}

/// Complete variable set for one decoder. Missing pieces produce defaults,
/// never missing keys.
pub fn reconcile_decoder(
    index: usize,
    stats: Option<&DecoderStats>,
    binding: Option<&DecoderBinding>,
    catalog: Option<&StreamCatalog>,
) -> Vars {
    let fallback_stats = DecoderStats::default();
    let fallback_config = DecoderConfig::default();
    let stats = stats.unwrap_or(&fallback_stats);
    let config = binding.map(|b| &b.config).unwrap_or(&fallback_config);

    let mut vars = Vars::new();
    reconcile_stats(index, stats, &mut vars);

    let assigned = config.assigned_stream();
    put(
        &mut vars,
        "name",
        config.name.clone().unwrap_or_else(|| format!("Decoder {index}")),
    );
    put(&mut vars, "stream_assigned", yes_no(assigned.is_some()));
    put(
        &mut vars,
        "stream_id_config",
        config.stream_id.unwrap_or(defaults::UNASSIGNED_STREAM_ID),
    );
    let stream_name = assigned
        .and_then(|id| catalog.and_then(|c| c.name(id)))
        .unwrap_or(defaults::NONE);
    put(&mut vars, "stream_name", stream_name);

    reconcile_stream_detail(resolved_stream(binding, catalog), stats.state, &mut vars);
    vars
}

pub fn decoder_choices(bindings: &[Option<&DecoderBinding>]) -> Vec<DecoderChoice> {
    bindings
        .iter()
        .enumerate()
        .map(|(id, binding)| DecoderChoice {
            id,
            label: binding
                .and_then(|b| b.config.name.clone())
                .unwrap_or_else(|| format!("Decoder {id}")),
        })
        .collect()
}

/// Prefixes per-decoder keys as `decoder<N>_<key>` and merges everything
/// into one flat set.
pub fn flatten(system: &Vars, decoders: &[Vars]) -> Vars {
    let mut vars = system.clone();
    for (index, decoder) in decoders.iter().enumerate() {
        for (key, value) in decoder {
            vars.insert(format!("decoder{index}_{key}"), value.clone());
        }
    }
    vars
}
