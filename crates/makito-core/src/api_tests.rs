use serde_json::json;

use crate::api::{DecoderConfig, DecoderStats, Field, PresetList, StreamEntry, SystemStatus};
use crate::transport::{api_path, parse_body, TransportError};

#[test]
fn decoder_stats_accepts_envelope_and_bare_payload() {
    // Arrange
    let wrapped = json!({ "stats": { "state": 2, "troubleCode": 0 } });
    let bare = json!({ "state": 2, "troubleCode": 0 });

    // Act
    let from_wrapped = DecoderStats::from_response(wrapped).expect("wrapped");
    let from_bare = DecoderStats::from_response(bare).expect("bare");

    // Assert
    assert_eq!(from_wrapped, from_bare);
    assert_eq!(from_wrapped.state, Some(2));
}

#[test]
fn lenient_fields_tolerate_odd_types() {
    // Arrange
    let payload = json!({
        "state": "1",
        "streamState": null,
        "klv": {"packets": 3},
        "closedCaption": 0,
        "timeCode": "yes",
        "uptime": 42,
        "videoAlgorithm": "",
    });

    // Act
    let stats = DecoderStats::from_response(payload).expect("stats");

    // Assert
    assert_eq!(stats.state, Some(1));
    assert_eq!(stats.stream_state, None);
    assert!(stats.klv);
    assert!(!stats.closed_caption);
    assert!(stats.time_code);
    assert_eq!(stats.uptime, Some(Field::Int(42)));
    assert!(stats.video_algorithm.as_ref().is_some_and(Field::is_blank));
}

#[test]
fn decoder_config_keeps_unknown_fields() {
    // Arrange
    let payload = json!({ "info": { "name": "Lobby", "streamId": 4, "outputs": [1, 0] } });

    // Act
    let config = DecoderConfig::from_response(payload).expect("config");
    let written = serde_json::to_value(&config).expect("serialize");

    // Assert
    assert_eq!(config.assigned_stream(), Some(4));
    assert_eq!(written["outputs"], json!([1, 0]));
    assert_eq!(written["streamId"], json!(4));
}

#[test]
fn negative_stream_id_means_unassigned() {
    let config = DecoderConfig::from_response(json!({ "streamId": -1 })).expect("config");
    assert_eq!(config.assigned_stream(), None);
}

#[test]
fn stream_responses_require_data() {
    // Act
    let missing = StreamEntry::list_from_response(json!({ "streams": [] }));
    let single = StreamEntry::from_response(json!({ "data": { "info": { "id": 3 } } }));

    // Assert
    assert!(matches!(missing, Err(TransportError::Decode(_))));
    assert_eq!(single.expect("entry").info.id, Some(3));
}

#[test]
fn preset_list_requires_data_array() {
    assert!(PresetList::from_response(json!({ "active": "a.cfg" })).is_err());
    let presets = PresetList::from_response(json!({ "data": ["a.cfg"], "autosave": 1 }))
        .expect("presets");
    assert!(presets.autosave);
    assert_eq!(presets.data, vec!["a.cfg".to_string()]);
}

#[test]
fn system_status_card_ok() {
    let ok = SystemStatus::from_response(json!({ "cardStatus": "OK" })).expect("status");
    let bad = SystemStatus::from_response(json!({ "cardStatus": "FAULT" })).expect("status");
    assert!(ok.card_ok());
    assert!(!bad.card_ok());
}

#[test]
fn api_path_normalizes_prefix() {
    assert_eq!(api_path("status"), "/apis/status");
    assert_eq!(api_path("/decoders/0"), "/apis/decoders/0");
    assert_eq!(api_path("/apis/streams"), "/apis/streams");
}

#[test]
fn parse_body_handles_empty_and_plain_text() {
    assert_eq!(parse_body(""), json!({}));
    assert_eq!(parse_body("rebooting"), json!({ "raw": "rebooting" }));
    assert_eq!(parse_body("{\"upgrade\":1}"), json!({ "upgrade": 1 }));
}
