use crate::codes::{
    connection_state_label, decoder_state_label, multisync_label, protocol_label, protocol_short,
    signal_label, stream_state_label, DecoderState,
};

#[test]
fn decoder_state_labels_follow_the_table() {
    // Arrange
    let cases = [
        (0, "Stopped"),
        (1, "Started (No Signal)"),
        (2, "Active"),
    ];

    for (state, expected) in cases {
        for trouble in [None, Some(-1), Some(-2), Some(-3), Some(-4), Some(-17)] {
            // Act
            let label = decoder_state_label(Some(state), trouble);

            // Assert
            assert_eq!(label, expected, "state {state} trouble {trouble:?}");
        }
    }
}

#[test]
fn trouble_state_is_labelled_by_trouble_code() {
    // Arrange
    let cases = [
        (Some(-1), "Unsupported Stream"),
        (Some(-2), "Unlicensed"),
        (Some(-3), "Oversubscribed"),
        (Some(-4), "No Memory"),
        (Some(-17), "Error (-17)"),
        (Some(0), "Not Decoding"),
        (None, "Not Decoding"),
    ];

    for (trouble, expected) in cases {
        // Act
        let label = decoder_state_label(Some(-1), trouble);

        // Assert
        assert_eq!(label, expected);
    }
}

#[test]
fn unknown_decoder_state_renders_code() {
    assert_eq!(decoder_state_label(Some(7), None), "Unknown (7)");
    assert_eq!(decoder_state_label(Some(-5), Some(-2)), "Unknown (-5)");
    assert_eq!(decoder_state_label(None, None), "Unknown");
}

#[test]
fn stream_state_labels() {
    assert_eq!(stream_state_label(Some(3)), "Active");
    assert_eq!(stream_state_label(Some(7)), "Securing");
    assert_eq!(stream_state_label(Some(-3)), "Unlicensed");
    assert_eq!(stream_state_label(Some(42)), "Code 42");
    assert_eq!(stream_state_label(None), "Unknown");
}

#[test]
fn multisync_prefers_table_then_device_text() {
    assert_eq!(multisync_label(Some(1), Some("ignored")), "Working");
    assert_eq!(multisync_label(Some(9), Some("Drifting")), "Drifting");
    assert_eq!(multisync_label(Some(9), None), "Unknown");
    assert_eq!(multisync_label(None, Some("Working")), "Unknown");
}

#[test]
fn protocol_and_connection_labels() {
    assert_eq!(protocol_label(Some(34)), "TS over SRT");
    assert_eq!(protocol_label(Some(5)), "Type 5");
    assert_eq!(protocol_short(Some(64)), Some("RTSP"));
    assert_eq!(protocol_short(Some(5)), None);
    assert_eq!(connection_state_label(Some(2)), "Connecting");
    assert_eq!(connection_state_label(Some(0)), "Not Connected");
    assert_eq!(connection_state_label(None), "Not Connected");
}

#[test]
fn signal_summary() {
    assert_eq!(signal_label(Some(2)), "Good");
    assert_eq!(signal_label(Some(1)), "No Signal");
    assert_eq!(signal_label(Some(-1)), "Error");
    assert_eq!(signal_label(Some(0)), "Offline");
    assert_eq!(signal_label(None), "Offline");
}

#[test]
fn decoder_state_running_covers_started_and_active() {
    // Arrange
    let running: Vec<i64> = [-1, 0, 1, 2, 5]
        .into_iter()
        .filter(|code| DecoderState::from_code(*code).is_running())
        .collect();

    // Assert
    assert_eq!(running, vec![1, 2]);
    assert_eq!(DecoderState::from_code(5), DecoderState::Other(5));
    assert_eq!(DecoderState::from_code(-1).code(), -1);
}
