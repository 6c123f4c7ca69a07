use std::time::Duration;

use serde_json::json;

use crate::commands::{
    apply_refresh, execute, preset_file_name, Command, CommandError, DecoderPreview, NewStream,
    Refresh, RefreshScope, SourceKind, StreamEdit,
};
use crate::test_support::{
    anonymous_config, connection, decoder_config, decoder_stats, healthy_device, stream_detail,
    stream_list, MockTransport, Reply,
};
use crate::transport::{Method, TransportError};

fn device() -> MockTransport {
    healthy_device()
        .on(Method::Put, "/apis/decoders/0/start", Reply::Json(json!({})))
        .on(Method::Put, "/apis/decoders/0/stop", Reply::Json(json!({})))
        .on(Method::Put, "/apis/decoders/2/start", Reply::Json(json!({})))
        .on(Method::Put, "/apis/decoders/2/stop", Reply::Json(json!({})))
}

#[test]
fn preset_names_get_cfg_suffix() {
    assert_eq!(preset_file_name("studio"), "studio.cfg");
    assert_eq!(preset_file_name("studio.cfg"), "studio.cfg");
    assert_eq!(preset_file_name(" backup "), "backup.cfg");
}

#[test]
fn custom_body_is_parsed_for_writes_only() {
    // Act
    let put = Command::custom(Method::Put, "/apis/presets", Some("{\"autosave\":true}"));
    let get = Command::custom(Method::Get, "/apis/status", Some("not json"));
    let bad = Command::custom(Method::Post, "/apis/streams", Some("{oops"));

    // Assert
    assert!(matches!(
        put,
        Ok(Command::Custom { body: Some(_), .. })
    ));
    assert!(matches!(get, Ok(Command::Custom { body: None, .. })));
    assert!(matches!(bad, Err(CommandError::InvalidBody(_))));
}

#[tokio::test]
async fn toggle_without_snapshot_starts() {
    // Arrange
    let mut conn = connection(device(), anonymous_config());

    // Act
    let outcome = execute(&mut conn, Command::Toggle { decoder: 0 })
        .await
        .expect("toggle");

    // Assert
    assert_eq!(conn.transport().count(Method::Put, "/apis/decoders/0/start"), 1);
    assert_eq!(
        outcome.refresh,
        Some(Refresh {
            delay: Duration::from_secs(1),
            scope: RefreshScope::Status
        })
    );
}

#[tokio::test]
async fn toggle_stops_running_decoder_and_starts_stopped_one() {
    // Arrange
    let mut conn = connection(device(), anonymous_config());
    conn.connect().await.expect("connect");

    // Act
    execute(&mut conn, Command::Toggle { decoder: 0 }).await.expect("toggle 0");
    execute(&mut conn, Command::Toggle { decoder: 2 }).await.expect("toggle 2");

    // Assert
    let transport = conn.transport();
    assert_eq!(transport.count(Method::Put, "/apis/decoders/0/stop"), 1);
    assert_eq!(transport.count(Method::Put, "/apis/decoders/0/start"), 0);
    assert_eq!(transport.count(Method::Put, "/apis/decoders/2/start"), 1);
}

#[tokio::test]
async fn unknown_decoder_is_rejected_before_any_request() {
    // Arrange
    let mut conn = connection(device(), anonymous_config());

    // Act
    let result = execute(&mut conn, Command::Start { decoder: 4 }).await;

    // Assert
    assert!(matches!(result, Err(CommandError::UnknownDecoder(4))));
    assert!(conn.transport().requests.is_empty());
}

#[tokio::test(start_paused = true)]
async fn restart_stops_then_starts() {
    // Arrange
    let mut conn = connection(device(), anonymous_config());

    // Act
    let outcome = execute(&mut conn, Command::Restart { decoder: 2 })
        .await
        .expect("restart");

    // Assert
    assert_eq!(
        conn.transport().paths(),
        vec!["PUT /apis/decoders/2/stop", "PUT /apis/decoders/2/start"]
    );
    assert_eq!(outcome.summary, "Decoder 2 restarted");
}

#[tokio::test]
async fn assign_stream_writes_back_full_config() {
    // Arrange
    let mock = MockTransport::new()
        .on(
            Method::Get,
            "/apis/streams",
            Reply::Json(stream_list(&[(1, "Camera 1"), (2, "Camera 2")])),
        )
        .on(Method::Get, "/apis/decoders/1", Reply::Json(decoder_config("Lobby", -1)))
        .on(Method::Put, "/apis/decoders/1", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());
    conn.refresh_streams().await.expect("streams");

    // Act
    let outcome = execute(
        &mut conn,
        Command::AssignStream {
            decoder: 1,
            stream_id: 2,
        },
    )
    .await
    .expect("assign");

    // Assert
    let put = conn.transport().requests.last().expect("put");
    assert_eq!(put.method, Method::Put);
    let body = put.body.as_ref().expect("body");
    assert_eq!(body["streamId"], json!(2));
    assert_eq!(body["name"], json!("Lobby"));
    assert_eq!(body["outputs"], json!([1, 0]));
    assert_eq!(outcome.summary, "Camera 2 assigned to Decoder 1");
    assert_eq!(
        outcome.refresh.map(|r| r.scope),
        Some(RefreshScope::StatusAndStreams)
    );
}

#[tokio::test]
async fn assign_without_config_info_fails() {
    // Arrange
    let mock = MockTransport::new().on(Method::Get, "/apis/decoders/0", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());

    // Act
    let result = execute(&mut conn, Command::UnassignStream { decoder: 0 }).await;

    // Assert
    assert!(matches!(
        result,
        Err(CommandError::Transport(TransportError::Decode(_)))
    ));
    assert_eq!(conn.transport().count(Method::Put, "/apis/decoders/0"), 0);
}

#[tokio::test]
async fn srt_stream_carries_mode_and_latency() {
    // Arrange
    let mock = MockTransport::new().on(Method::Post, "/apis/streams", Reply::Json(json!({ "id": 9 })));
    let mut conn = connection(mock, anonymous_config());
    let stream = NewStream {
        name: "Remote".to_string(),
        encapsulation: 34,
        latency_ms: 500,
        ..NewStream::default()
    };

    // Act
    let outcome = execute(&mut conn, Command::CreateStream(stream)).await.expect("create");

    // Assert
    let body = conn.transport().requests[0].body.clone().expect("body");
    assert_eq!(body["srtMode"], json!(1));
    assert_eq!(body["latency"], json!(500));
    assert_eq!(body["port"], json!(5004));
    assert_eq!(outcome.response, Some(json!({ "id": 9 })));
    assert_eq!(outcome.refresh.map(|r| r.scope), Some(RefreshScope::Streams));
}

#[tokio::test]
async fn udp_stream_has_no_srt_fields() {
    // Arrange
    let mock = MockTransport::new().on(Method::Post, "/apis/streams", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());

    // Act
    execute(&mut conn, Command::CreateStream(NewStream::default()))
        .await
        .expect("create");

    // Assert
    let body = conn.transport().requests[0].body.clone().expect("body");
    assert!(body.get("srtMode").is_none());
    assert_eq!(body["address"], json!("Any"));
}

#[tokio::test]
async fn edit_stream_keeps_unspecified_fields() {
    // Arrange
    let mock = MockTransport::new()
        .on(Method::Get, "/apis/streams/1", Reply::Json(stream_detail(1, "Camera 1")))
        .on(Method::Put, "/apis/streams/1", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());
    let edit = StreamEdit {
        port: Some(6000),
        ..StreamEdit::default()
    };

    // Act
    execute(&mut conn, Command::EditStream { stream_id: 1, edit })
        .await
        .expect("edit");

    // Assert
    let body = conn.transport().requests[1].body.clone().expect("body");
    assert_eq!(body["port"], json!(6000));
    assert_eq!(body["name"], json!("Camera 1"));
    assert_eq!(body["address"], json!("239.1.1.1"));
}

#[tokio::test]
async fn destructive_commands_need_confirmation() {
    // Arrange
    let mut conn = connection(MockTransport::new(), anonymous_config());

    // Act
    let stream = execute(&mut conn, Command::DeleteStream { stream_id: 1, confirm: false }).await;
    let preset = execute(
        &mut conn,
        Command::DeletePreset {
            name: "a".to_string(),
            confirm: false,
        },
    )
    .await;
    let reboot = execute(&mut conn, Command::Reboot { confirm: false }).await;
    let unselected =
        execute(&mut conn, Command::DeleteStream { stream_id: -1, confirm: true }).await;

    // Assert
    assert!(matches!(stream, Err(CommandError::NotConfirmed(_))));
    assert!(matches!(preset, Err(CommandError::NotConfirmed(_))));
    assert!(matches!(reboot, Err(CommandError::NotConfirmed(_))));
    assert!(matches!(unselected, Err(CommandError::NoStreamSelected)));
    assert!(conn.transport().requests.is_empty());
}

#[tokio::test]
async fn preset_commands_normalize_names() {
    // Arrange
    let mock = MockTransport::new()
        .on(Method::Put, "/apis/presets/show.cfg/load", Reply::Json(json!({})))
        .on(Method::Put, "/apis/presets/old.cfg/rename", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());

    // Act
    let load = execute(&mut conn, Command::LoadPreset { name: "show".to_string() })
        .await
        .expect("load");
    execute(
        &mut conn,
        Command::RenamePreset {
            from: "old".to_string(),
            to: "new".to_string(),
            overwrite: true,
        },
    )
    .await
    .expect("rename");

    // Assert
    assert_eq!(load.refresh.map(|r| r.delay), Some(Duration::from_secs(2)));
    assert_eq!(
        conn.transport().requests[1].body,
        Some(json!({ "name": "new.cfg", "overwriteIfAlreadyExists": true }))
    );
}

#[tokio::test]
async fn configure_preview_replaces_decoder_entry() {
    // Arrange
    let settings = json!({ "enabled": true, "decoders": [{ "enabled": false }, { "enabled": false }] });
    let mock = MockTransport::new()
        .on(Method::Get, "/apis/services/preview", Reply::Json(settings))
        .on(Method::Put, "/apis/services/preview", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());

    // Act
    execute(
        &mut conn,
        Command::ConfigureDecoderPreview {
            decoder: 1,
            preview: DecoderPreview::default(),
        },
    )
    .await
    .expect("configure");

    // Assert
    let body = conn.transport().requests[1].body.clone().expect("body");
    assert_eq!(
        body["decoders"][1],
        json!({ "interval": 5, "enabled": true, "width": 352, "height": 198 })
    );
    assert_eq!(body["decoders"][0], json!({ "enabled": false }));
}

#[tokio::test]
async fn reboot_reports_pending_upgrade() {
    // Arrange
    let mock = MockTransport::new().on(Method::Post, "/apis/reboot", Reply::Json(json!({ "upgrade": 1 })));
    let mut conn = connection(mock, anonymous_config());

    // Act
    let outcome = execute(&mut conn, Command::Reboot { confirm: true })
        .await
        .expect("reboot");

    // Assert
    assert!(outcome.summary.contains("upgrade pending"));
}

#[tokio::test(start_paused = true)]
async fn refresh_after_command_repolls_scope() {
    // Arrange
    let mut conn = connection(healthy_device(), anonymous_config());

    // Act
    let failures = apply_refresh(
        &mut conn,
        Refresh {
            delay: Duration::from_secs(1),
            scope: RefreshScope::Streams,
        },
    )
    .await;

    // Assert
    assert!(failures.is_empty());
    assert_eq!(conn.transport().paths(), vec!["GET /apis/streams"]);
    assert!(conn.store().streams().is_some());
}

#[tokio::test]
async fn select_source_puts_type_and_source() {
    // Arrange
    let mock = MockTransport::new().on(Method::Put, "/apis/decoders/3/source", Reply::Json(json!({})));
    let mut conn = connection(mock, anonymous_config());

    // Act
    let outcome = execute(
        &mut conn,
        Command::SelectSource {
            decoder: 3,
            kind: SourceKind::Srt,
            source: "srt://10.0.0.9:9000".to_string(),
        },
    )
    .await
    .expect("select source");

    // Assert
    assert_eq!(conn.transport().paths(), vec!["PUT /apis/decoders/3/source"]);
    assert_eq!(
        conn.transport().requests[0].body,
        Some(json!({ "type": "srt", "source": "srt://10.0.0.9:9000" }))
    );
    assert_eq!(
        outcome.refresh,
        Some(Refresh {
            delay: Duration::from_secs(1),
            scope: RefreshScope::Status
        })
    );
}

#[tokio::test(start_paused = true)]
async fn assigned_stream_newer_than_cached_list_shows_up_after_refresh() {
    // Arrange
    let mut conn = connection(
        healthy_device().on(Method::Put, "/apis/decoders/0", Reply::Json(json!({}))),
        anonymous_config(),
    );
    conn.connect().await.expect("connect");
    let device = conn.transport_mut();
    device.replace(
        Method::Get,
        "/apis/streams",
        Reply::Json(stream_list(&[(1, "Camera 1"), (2, "Camera 2"), (5, "New Cam")])),
    );
    device.replace(Method::Get, "/apis/streams/5", Reply::Json(stream_detail(5, "New Cam")));
    device.replace(Method::Get, "/apis/decoders/0", Reply::Json(decoder_config("Feed 0", 5)));
    device.replace(Method::Get, "/apis/decoders/0/stats", Reply::Json(decoder_stats(2)));

    // Act
    let outcome = execute(
        &mut conn,
        Command::AssignStream {
            decoder: 0,
            stream_id: 5,
        },
    )
    .await
    .expect("assign");
    let refresh = outcome.refresh.expect("refresh");
    let failures = apply_refresh(&mut conn, refresh).await;

    // Assert
    assert!(failures.is_empty(), "{failures:?}");
    assert!(conn.transport().count(Method::Get, "/apis/streams/5") >= 1);
    let vars = conn.store().decoder_vars(0);
    assert_eq!(vars["stream_name"], json!("New Cam"));
    assert_eq!(vars["stream_protocol"], json!("TS over UDP"));
    assert_eq!(vars["stream_bitrate"], json!("5000 kbps"));
}

#[tokio::test(start_paused = true)]
async fn streams_and_status_refresh_loads_list_before_decoders() {
    // Arrange
    let mut conn = connection(healthy_device(), anonymous_config());

    // Act
    apply_refresh(
        &mut conn,
        Refresh {
            delay: Duration::from_secs(1),
            scope: RefreshScope::StatusAndStreams,
        },
    )
    .await;

    // Assert
    let paths = conn.transport().paths();
    assert_eq!(paths[0], "GET /apis/streams");
    assert_eq!(paths[1], "GET /apis/status");
}
