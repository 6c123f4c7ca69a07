use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use makito_core::codes::{
    ENCAPSULATION_RTP, ENCAPSULATION_RTSP, ENCAPSULATION_SRT, ENCAPSULATION_UDP,
};
use makito_core::commands::{apply_refresh, DecoderPreview, NewStream, SourceKind, StreamEdit};
use makito_core::{execute, Command, CommandError, Connection, Method, Transport};
use tracing::info;

use crate::{log_failures, print_snapshot, write_file, OutputFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum Protocol {
    Udp,
    Rtp,
    Srt,
    Rtsp,
}

impl Protocol {
    fn encapsulation(self) -> i64 {
        match self {
            Protocol::Udp => ENCAPSULATION_UDP,
            Protocol::Rtp => ENCAPSULATION_RTP,
            Protocol::Srt => ENCAPSULATION_SRT,
            Protocol::Rtsp => ENCAPSULATION_RTSP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SrtMode {
    Caller,
    Listener,
    Rendezvous,
}

impl SrtMode {
    fn code(self) -> i64 {
        match self {
            SrtMode::Caller => 0,
            SrtMode::Listener => 1,
            SrtMode::Rendezvous => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum SourceArg {
    Network,
    Srt,
    Rtsp,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Network => SourceKind::Network,
            SourceArg::Srt => SourceKind::Srt,
            SourceArg::Rtsp => SourceKind::Rtsp,
        }
    }
}

#[derive(Debug, Subcommand)]
pub(crate) enum Action {
    Start { decoder: usize },
    Stop { decoder: usize },
    /// Stop a running decoder, start a stopped one.
    Toggle { decoder: usize },
    Restart { decoder: usize },
    Assign { decoder: usize, stream_id: i64 },
    Unassign { decoder: usize },
    /// Point a decoder at a network, SRT or RTSP source.
    SelectSource {
        decoder: usize,
        source: String,
        #[arg(long, value_enum, default_value = "network")]
        kind: SourceArg,
    },
    CreateStream {
        #[arg(long, default_value = "New Stream")]
        name: String,
        #[arg(long, value_enum, default_value = "udp")]
        protocol: Protocol,
        #[arg(long, default_value = "Any")]
        address: String,
        #[arg(long, default_value_t = 5004)]
        port: u16,
        #[arg(long, value_enum, default_value = "listener")]
        srt_mode: SrtMode,
        #[arg(long, default_value_t = 120)]
        latency_ms: u32,
    },
    EditStream {
        stream_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    DeleteStream {
        stream_id: i64,
        #[arg(long)]
        yes: bool,
    },
    SavePreset {
        name: String,
        #[arg(long)]
        startup: bool,
    },
    LoadPreset { name: String },
    DeletePreset {
        name: String,
        #[arg(long)]
        yes: bool,
    },
    RenamePreset {
        from: String,
        to: String,
        #[arg(long)]
        overwrite: bool,
    },
    DuplicatePreset { name: String },
    StartupPreset { name: String },
    Autosave {
        #[arg(long)]
        off: bool,
    },
    /// Turn the preview service on or off.
    Preview {
        #[arg(long)]
        off: bool,
    },
    DecoderPreview {
        decoder: usize,
        #[arg(long, default_value_t = 5)]
        interval_minutes: u32,
        #[arg(long, default_value_t = 352)]
        width: u32,
        #[arg(long, default_value_t = 198)]
        height: u32,
    },
    Thumbnail {
        decoder: usize,
        /// Write the image here.
        #[arg(long)]
        out: Option<String>,
    },
    Reboot {
        #[arg(long)]
        yes: bool,
    },
    /// Raw request against the device API.
    Request {
        method: Method,
        endpoint: String,
        #[arg(long)]
        body: Option<String>,
    },
}

impl Action {
    pub(crate) fn into_command(self) -> Result<Command, CommandError> {
        let command = match self {
            Action::Start { decoder } => Command::Start { decoder },
            Action::Stop { decoder } => Command::Stop { decoder },
            Action::Toggle { decoder } => Command::Toggle { decoder },
            Action::Restart { decoder } => Command::Restart { decoder },
            Action::Assign { decoder, stream_id } => Command::AssignStream { decoder, stream_id },
            Action::Unassign { decoder } => Command::UnassignStream { decoder },
            Action::SelectSource {
                decoder,
                source,
                kind,
            } => Command::SelectSource {
                decoder,
                kind: kind.into(),
                source,
            },
            Action::CreateStream {
                name,
                protocol,
                address,
                port,
                srt_mode,
                latency_ms,
            } => Command::CreateStream(NewStream {
                name,
                encapsulation: protocol.encapsulation(),
                address,
                port,
                srt_mode: srt_mode.code(),
                latency_ms,
            }),
            Action::EditStream {
                stream_id,
                name,
                address,
                port,
            } => Command::EditStream {
                stream_id,
                edit: StreamEdit {
                    name,
                    address,
                    port,
                },
            },
            Action::DeleteStream { stream_id, yes } => Command::DeleteStream {
                stream_id,
                confirm: yes,
            },
            Action::SavePreset { name, startup } => Command::SavePreset { name, startup },
            Action::LoadPreset { name } => Command::LoadPreset { name },
            Action::DeletePreset { name, yes } => Command::DeletePreset { name, confirm: yes },
            Action::RenamePreset {
                from,
                to,
                overwrite,
            } => Command::RenamePreset {
                from,
                to,
                overwrite,
            },
            Action::DuplicatePreset { name } => Command::DuplicatePreset { name },
            Action::StartupPreset { name } => Command::SetStartupPreset { name },
            Action::Autosave { off } => Command::SetPresetAutosave { enabled: !off },
            Action::Preview { off } => Command::EnablePreview { enabled: !off },
            Action::DecoderPreview {
                decoder,
                interval_minutes,
                width,
                height,
            } => Command::ConfigureDecoderPreview {
                decoder,
                preview: DecoderPreview {
                    interval_minutes,
                    width,
                    height,
                },
            },
            Action::Thumbnail { decoder, .. } => Command::FetchThumbnail { decoder },
            Action::Reboot { yes } => Command::Reboot { confirm: yes },
            Action::Request {
                method,
                endpoint,
                body,
            } => return Command::custom(method, &endpoint, body.as_deref()),
        };
        Ok(command)
    }

    fn thumbnail_target(&self) -> Option<(usize, &str)> {
        match self {
            Action::Thumbnail {
                decoder,
                out: Some(path),
            } => Some((*decoder, path.as_str())),
            _ => None,
        }
    }
}

/// Connects, runs `action`, and waits out the refresh the command asks for
/// before printing the resulting snapshot.
pub(crate) async fn run<T: Transport>(
    connection: &mut Connection<T>,
    action: Action,
    format: OutputFormat,
) -> Result<()> {
    let thumbnail_target = action
        .thumbnail_target()
        .map(|(decoder, path)| (decoder, path.to_string()));
    let command = action.into_command()?;

    let failures = connection.connect().await?;
    log_failures(&failures);

    let outcome = execute(connection, command).await?;
    println!("{}", outcome.summary);
    if let Some(response) = &outcome.response {
        if format == OutputFormat::Human {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
    }

    if let Some((decoder, path)) = thumbnail_target {
        if let Some(thumbnail) = connection.store().thumbnail(decoder) {
            write_file(&path, &thumbnail.bytes)?;
            info!(decoder, path = %path, bytes = thumbnail.bytes.len(), "thumbnail written");
        }
    }

    if let Some(refresh) = outcome.refresh {
        info!(delay_ms = refresh.delay.as_millis() as u64, scope = ?refresh.scope, "refreshing after command");
        let failures = apply_refresh(connection, refresh).await;
        log_failures(&failures);
    }

    if format != OutputFormat::Human {
        print_snapshot(&connection.store().snapshot(), format)?;
    }

    Ok(())
}
