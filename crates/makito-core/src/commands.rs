//! User-invoked device operations.
//!
//! Each command is one request, or a short fixed sequence of them, against
//! the device. The outcome says whether, and after how long, the caller
//! should re-poll to observe the effect.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::connection::{Connection, FetchFailure};
use crate::reconcile::DECODER_COUNT;
use crate::transport::{Method, Transport, TransportError};

const PRESET_SUFFIX: &str = ".cfg";
const RESTART_PAUSE: Duration = Duration::from_secs(2);
const SETTLE_DELAY: Duration = Duration::from_secs(1);
const PRESET_SETTLE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("decoder {0} does not exist")]
    UnknownDecoder(usize),
    #[error("request body is not valid JSON: {0}")]
    InvalidBody(String),
    #[error("{0} not confirmed")]
    NotConfirmed(&'static str),
    #[error("no stream selected")]
    NoStreamSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStream {
    pub name: String,
    pub encapsulation: i64,
    pub address: String,
    pub port: u16,
    /// 0 caller, 1 listener, 2 rendezvous. SRT only.
    pub srt_mode: i64,
    /// SRT only.
    pub latency_ms: u32,
}

impl Default for NewStream {
    fn default() -> Self {
        Self {
            name: "New Stream".to_string(),
            encapsulation: crate::codes::ENCAPSULATION_UDP,
            address: "Any".to_string(),
            port: 5004,
            srt_mode: 1,
            latency_ms: 120,
        }
    }
}

/// Fields left `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamEdit {
    pub name: Option<String>,
    pub address: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderPreview {
    pub interval_minutes: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for DecoderPreview {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            width: 352,
            height: 198,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Network,
    Srt,
    Rtsp,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Network => "network",
            SourceKind::Srt => "srt",
            SourceKind::Rtsp => "rtsp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start { decoder: usize },
    Stop { decoder: usize },
    Toggle { decoder: usize },
    Restart { decoder: usize },
    AssignStream { decoder: usize, stream_id: i64 },
    UnassignStream { decoder: usize },
    CreateStream(NewStream),
    EditStream { stream_id: i64, edit: StreamEdit },
    DeleteStream { stream_id: i64, confirm: bool },
    SavePreset { name: String, startup: bool },
    LoadPreset { name: String },
    DeletePreset { name: String, confirm: bool },
    RenamePreset { from: String, to: String, overwrite: bool },
    DuplicatePreset { name: String },
    SetStartupPreset { name: String },
    SetPresetAutosave { enabled: bool },
    EnablePreview { enabled: bool },
    ConfigureDecoderPreview { decoder: usize, preview: DecoderPreview },
    SelectSource { decoder: usize, kind: SourceKind, source: String },
    FetchThumbnail { decoder: usize },
    Reboot { confirm: bool },
    Custom { method: Method, endpoint: String, body: Option<Value> },
}

impl Command {
    /// Builds a raw request. The body is only parsed for non-GET methods.
    pub fn custom(method: Method, endpoint: &str, body: Option<&str>) -> Result<Self, CommandError> {
        let body = match body.map(str::trim).filter(|b| !b.is_empty()) {
            Some(raw) if method != Method::Get => Some(
                serde_json::from_str(raw).map_err(|err| CommandError::InvalidBody(err.to_string()))?,
            ),
            _ => None,
        };
        Ok(Command::Custom {
            method,
            endpoint: endpoint.to_string(),
            body,
        })
    }

    fn decoder(&self) -> Option<usize> {
        match self {
            Command::Start { decoder }
            | Command::Stop { decoder }
            | Command::Toggle { decoder }
            | Command::Restart { decoder }
            | Command::AssignStream { decoder, .. }
            | Command::UnassignStream { decoder }
            | Command::ConfigureDecoderPreview { decoder, .. }
            | Command::SelectSource { decoder, .. }
            | Command::FetchThumbnail { decoder } => Some(*decoder),
            _ => None,
        }
    }
}

/// What should be re-polled once the device has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshScope {
    /// System status and all decoders.
    Status,
    Streams,
    StatusAndStreams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
    pub delay: Duration,
    pub scope: RefreshScope,
}

impl Refresh {
    fn after(delay: Duration, scope: RefreshScope) -> Option<Self> {
        Some(Self { delay, scope })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub summary: String,
    pub refresh: Option<Refresh>,
    pub response: Option<Value>,
}

impl CommandOutcome {
    fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            refresh: None,
            response: None,
        }
    }

    fn refresh(mut self, refresh: Option<Refresh>) -> Self {
        self.refresh = refresh;
        self
    }

    fn response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }
}

/// Appends `.cfg` unless already present.
pub fn preset_file_name(name: &str) -> String {
    let name = name.trim();
    if name.ends_with(PRESET_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{PRESET_SUFFIX}")
    }
}

fn stream_label<T: Transport>(connection: &Connection<T>, stream_id: i64) -> String {
    if stream_id < 0 {
        return "No Stream".to_string();
    }
    connection
        .store()
        .streams()
        .and_then(|catalog| catalog.name(stream_id).map(str::to_string))
        .unwrap_or_else(|| format!("Stream {stream_id}"))
}

/// `{"info": {...}}` or `{"data": {"info": {...}}}` depending on the
/// endpoint.
fn info_object(value: &Value, what: &str) -> Result<serde_json::Map<String, Value>, CommandError> {
    value
        .get("info")
        .or_else(|| value.get("data").and_then(|data| data.get("info")))
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| TransportError::Decode(format!("{what}: missing info")).into())
}

/// Runs `command` against the device and logs the outcome.
pub async fn execute<T: Transport>(
    connection: &mut Connection<T>,
    command: Command,
) -> Result<CommandOutcome, CommandError> {
    if let Some(decoder) = command.decoder() {
        if decoder >= DECODER_COUNT {
            return Err(CommandError::UnknownDecoder(decoder));
        }
    }

    let label = format!("{command:?}");
    match dispatch(connection, command).await {
        Ok(outcome) => {
            info!(summary = %outcome.summary, "command succeeded");
            Ok(outcome)
        }
        Err(CommandError::NotConfirmed(what)) => {
            warn!(what, "command not confirmed");
            Err(CommandError::NotConfirmed(what))
        }
        Err(err) => {
            error!(command = %label, error = %err, "command failed");
            Err(err)
        }
    }
}

async fn set_decoder_running<T: Transport>(
    connection: &mut Connection<T>,
    decoder: usize,
    running: bool,
) -> Result<CommandOutcome, CommandError> {
    let verb = if running { "start" } else { "stop" };
    connection
        .call(Method::Put, &format!("/apis/decoders/{decoder}/{verb}"), None)
        .await?;
    let summary = if running {
        format!("Decoder {decoder} started")
    } else {
        format!("Decoder {decoder} stopped")
    };
    Ok(CommandOutcome::new(summary).refresh(Refresh::after(SETTLE_DELAY, RefreshScope::Status)))
}

async fn assign_stream<T: Transport>(
    connection: &mut Connection<T>,
    decoder: usize,
    stream_id: i64,
) -> Result<CommandOutcome, CommandError> {
    let path = format!("/apis/decoders/{decoder}");
    let current = connection.call(Method::Get, &path, None).await?;
    let mut info = info_object(&current, "decoder config")?;
    info.insert("streamId".to_string(), json!(stream_id));
    connection.call(Method::Put, &path, Some(Value::Object(info))).await?;

    let summary = if stream_id < 0 {
        format!("Stream unassigned from Decoder {decoder}")
    } else {
        format!("{} assigned to Decoder {decoder}", stream_label(connection, stream_id))
    };
    Ok(CommandOutcome::new(summary)
        .refresh(Refresh::after(SETTLE_DELAY, RefreshScope::StatusAndStreams)))
}

async fn update_preview_service<T, F>(
    connection: &mut Connection<T>,
    edit: F,
) -> Result<bool, CommandError>
where
    T: Transport,
    F: FnOnce(&mut Value) -> bool,
{
    let mut settings = connection
        .call(Method::Get, "/apis/services/preview", None)
        .await?;
    if !edit(&mut settings) {
        return Ok(false);
    }
    connection
        .call(Method::Put, "/apis/services/preview", Some(settings))
        .await?;
    Ok(true)
}

async fn dispatch<T: Transport>(
    connection: &mut Connection<T>,
    command: Command,
) -> Result<CommandOutcome, CommandError> {
    match command {
        Command::Start { decoder } => set_decoder_running(connection, decoder, true).await,
        Command::Stop { decoder } => set_decoder_running(connection, decoder, false).await,
        Command::Toggle { decoder } => {
            // Without a snapshot the decoder is assumed stopped.
            let running = connection
                .store()
                .decoder_state(decoder)
                .is_some_and(|state| state.is_running());
            set_decoder_running(connection, decoder, !running).await
        }
        Command::Restart { decoder } => {
            set_decoder_running(connection, decoder, false).await?;
            tokio::time::sleep(RESTART_PAUSE).await;
            let outcome = set_decoder_running(connection, decoder, true).await?;
            Ok(CommandOutcome {
                summary: format!("Decoder {decoder} restarted"),
                ..outcome
            })
        }
        Command::AssignStream { decoder, stream_id } => {
            assign_stream(connection, decoder, stream_id).await
        }
        Command::UnassignStream { decoder } => assign_stream(connection, decoder, -1).await,

        Command::CreateStream(stream) => {
            let mut body = json!({
                "name": stream.name,
                "encapsulation": stream.encapsulation,
                "address": stream.address,
                "port": stream.port,
            });
            if stream.encapsulation == crate::codes::ENCAPSULATION_SRT {
                body["srtMode"] = json!(stream.srt_mode);
                body["latency"] = json!(stream.latency_ms);
            }
            let response = connection
                .call(Method::Post, "/apis/streams", Some(body))
                .await?;
            Ok(CommandOutcome::new(format!("Stream created: {}", stream.name))
                .refresh(Refresh::after(SETTLE_DELAY, RefreshScope::Streams))
                .response(response))
        }
        Command::EditStream { stream_id, edit } => {
            if stream_id < 0 {
                return Err(CommandError::NoStreamSelected);
            }
            let path = format!("/apis/streams/{stream_id}");
            let current = connection.call(Method::Get, &path, None).await?;
            let mut info = info_object(&current, "stream")?;
            if let Some(name) = edit.name.filter(|n| !n.is_empty()) {
                info.insert("name".to_string(), json!(name));
            }
            if let Some(address) = edit.address.filter(|a| !a.is_empty()) {
                info.insert("address".to_string(), json!(address));
            }
            if let Some(port) = edit.port {
                info.insert("port".to_string(), json!(port));
            }
            let label = stream_label(connection, stream_id);
            connection.call(Method::Put, &path, Some(Value::Object(info))).await?;
            Ok(CommandOutcome::new(format!("Stream \"{label}\" updated"))
                .refresh(Refresh::after(SETTLE_DELAY, RefreshScope::Streams)))
        }
        Command::DeleteStream { stream_id, confirm } => {
            if !confirm {
                return Err(CommandError::NotConfirmed("stream deletion"));
            }
            if stream_id < 0 {
                return Err(CommandError::NoStreamSelected);
            }
            let label = stream_label(connection, stream_id);
            connection
                .call(Method::Delete, &format!("/apis/streams/{stream_id}"), None)
                .await?;
            Ok(CommandOutcome::new(format!("Stream \"{label}\" deleted"))
                .refresh(Refresh::after(SETTLE_DELAY, RefreshScope::Streams)))
        }

        Command::SavePreset { name, startup } => {
            let name = preset_file_name(&name);
            connection
                .call(
                    Method::Put,
                    &format!("/apis/presets/{name}"),
                    Some(json!({ "startup": startup })),
                )
                .await?;
            Ok(CommandOutcome::new(format!("System preset saved: {name}")))
        }
        Command::LoadPreset { name } => {
            let name = preset_file_name(&name);
            connection
                .call(Method::Put, &format!("/apis/presets/{name}/load"), None)
                .await?;
            Ok(CommandOutcome::new(format!("System preset loaded: {name}"))
                .refresh(Refresh::after(PRESET_SETTLE_DELAY, RefreshScope::Status)))
        }
        Command::DeletePreset { name, confirm } => {
            if !confirm {
                return Err(CommandError::NotConfirmed("preset deletion"));
            }
            let name = preset_file_name(&name);
            connection
                .call(Method::Delete, &format!("/apis/presets/{name}"), None)
                .await?;
            Ok(CommandOutcome::new(format!("System preset deleted: {name}")))
        }
        Command::RenamePreset {
            from,
            to,
            overwrite,
        } => {
            let from = preset_file_name(&from);
            let to = preset_file_name(&to);
            connection
                .call(
                    Method::Put,
                    &format!("/apis/presets/{from}/rename"),
                    Some(json!({ "name": to, "overwriteIfAlreadyExists": overwrite })),
                )
                .await?;
            Ok(CommandOutcome::new(format!(
                "System preset renamed from {from} to {to}"
            )))
        }
        Command::DuplicatePreset { name } => {
            let name = preset_file_name(&name);
            connection
                .call(Method::Put, &format!("/apis/presets/{name}/duplicate"), None)
                .await?;
            Ok(CommandOutcome::new(format!("System preset duplicated: {name}")))
        }
        Command::SetStartupPreset { name } => {
            let name = preset_file_name(&name);
            connection
                .call(Method::Put, &format!("/apis/presets/{name}/startup"), None)
                .await?;
            Ok(CommandOutcome::new(format!("Startup preset set to: {name}")))
        }
        Command::SetPresetAutosave { enabled } => {
            connection
                .call(Method::Put, "/apis/presets", Some(json!({ "autosave": enabled })))
                .await?;
            let state = if enabled { "enabled" } else { "disabled" };
            Ok(CommandOutcome::new(format!("Preset autosave {state}")))
        }

        Command::EnablePreview { enabled } => {
            update_preview_service(connection, |settings| match settings.as_object_mut() {
                Some(map) => {
                    map.insert("enabled".to_string(), json!(enabled));
                    true
                }
                None => false,
            })
            .await?;
            let state = if enabled { "enabled" } else { "disabled" };
            Ok(CommandOutcome::new(format!("Preview service {state}")))
        }
        Command::ConfigureDecoderPreview { decoder, preview } => {
            let applied = update_preview_service(connection, |settings| {
                match settings
                    .get_mut("decoders")
                    .and_then(|decoders| decoders.get_mut(decoder))
                {
                    Some(entry) => {
                        *entry = json!({
                            "interval": preview.interval_minutes,
                            "enabled": true,
                            "width": preview.width,
                            "height": preview.height,
                        });
                        true
                    }
                    None => false,
                }
            })
            .await?;
            let summary = if applied {
                format!(
                    "Decoder {decoder} preview configured: {}x{} @ {}min",
                    preview.width, preview.height, preview.interval_minutes
                )
            } else {
                format!("Decoder {decoder} has no preview entry, nothing changed")
            };
            Ok(CommandOutcome::new(summary))
        }
        Command::SelectSource {
            decoder,
            kind,
            source,
        } => {
            connection
                .call(
                    Method::Put,
                    &format!("/apis/decoders/{decoder}/source"),
                    Some(json!({ "type": kind.as_str(), "source": source })),
                )
                .await?;
            Ok(CommandOutcome::new(format!(
                "Decoder {decoder} source set to {}: {source}",
                kind.as_str()
            ))
            .refresh(Refresh::after(SETTLE_DELAY, RefreshScope::Status)))
        }
        Command::FetchThumbnail { decoder } => {
            connection
                .refresh_thumbnail(decoder)
                .await
                .map_err(|failure| CommandError::Transport(failure.error))?;
            let len = connection
                .store()
                .thumbnail(decoder)
                .map(|thumbnail| thumbnail.bytes.len())
                .unwrap_or_default();
            Ok(CommandOutcome::new(format!(
                "Thumbnail stored for decoder {decoder} ({len} bytes)"
            )))
        }

        Command::Reboot { confirm } => {
            if !confirm {
                return Err(CommandError::NotConfirmed("reboot"));
            }
            let response = connection.call(Method::Post, "/apis/reboot", None).await?;
            let summary = if response.get("upgrade").and_then(Value::as_i64) == Some(1) {
                "Device reboot initiated (upgrade pending, extended reboot time expected)"
            } else {
                "Device reboot initiated"
            };
            Ok(CommandOutcome::new(summary).response(response))
        }
        Command::Custom {
            method,
            endpoint,
            body,
        } => {
            let body = body.filter(|_| method != Method::Get);
            let response = connection.call(method, &endpoint, body).await?;
            Ok(CommandOutcome::new(format!("{method} {endpoint} succeeded")).response(response))
        }
    }
}

/// Waits out the settle delay, then re-polls the requested scope.
pub async fn apply_refresh<T: Transport>(
    connection: &mut Connection<T>,
    refresh: Refresh,
) -> Vec<FetchFailure> {
    tokio::time::sleep(refresh.delay).await;

    let mut failures = Vec::new();
    // Streams go first so decoder bindings are checked against the new list.
    if matches!(refresh.scope, RefreshScope::Streams | RefreshScope::StatusAndStreams) {
        failures.extend(connection.refresh_streams().await.err());
    }
    if matches!(refresh.scope, RefreshScope::Status | RefreshScope::StatusAndStreams) {
        failures.extend(connection.refresh_system().await.err());
        failures.extend(connection.refresh_decoders().await);
    }
    failures
}
