use std::fmt;

use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::api::{DecoderConfig, DecoderStats, PresetList, PreviewSettings, StreamEntry, SystemStatus};
use crate::config::{ConfigError, ConnectionConfig};
use crate::reconcile::{self, DecoderBinding, StreamCatalog, StreamResolution, DECODER_COUNT};
use crate::session::{self, AuthError, Credentials};
use crate::snapshot::{ConnectionStatus, Thumbnail};
use crate::store::{Epoch, SnapshotStore, Update};
use crate::transport::{HttpTransport, Method, Transport, TransportError};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("bad configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
}

/// The device resource a fetch was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Authentication,
    System,
    DecoderStats(usize),
    DecoderConfig(usize),
    StreamDetail { decoder: usize, stream_id: i64 },
    Streams,
    Presets,
    Preview,
    Thumbnail(usize),
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Authentication => f.write_str("authentication"),
            Resource::System => f.write_str("system status"),
            Resource::DecoderStats(i) => write!(f, "decoder {i} stats"),
            Resource::DecoderConfig(i) => write!(f, "decoder {i} config"),
            Resource::StreamDetail { decoder, stream_id } => {
                write!(f, "stream {stream_id} (decoder {decoder})")
            }
            Resource::Streams => f.write_str("stream list"),
            Resource::Presets => f.write_str("preset list"),
            Resource::Preview => f.write_str("preview settings"),
            Resource::Thumbnail(i) => write!(f, "decoder {i} thumbnail"),
        }
    }
}

/// One sub-resource fetch that failed. The store keeps the last good value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub resource: Resource,
    pub error: TransportError,
}

impl FetchFailure {
    pub(crate) fn new(resource: Resource, error: TransportError) -> Self {
        debug!(%resource, error = %error, "fetch failed");
        Self { resource, error }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.resource, self.error)
    }
}

/// One device connection: transport, session, and the store it writes to.
///
/// Every write is stamped with the epoch the connection was established
/// under, so a connection that has been superseded cannot touch the store.
pub struct Connection<T: Transport> {
    transport: T,
    config: ConnectionConfig,
    credentials: Option<Credentials>,
    store: SnapshotStore,
    epoch: Epoch,
}

impl Connection<HttpTransport> {
    pub fn http(config: ConnectionConfig) -> Result<Self, ConnectError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        let store = SnapshotStore::new(config.host.trim());
        Ok(Self::new(transport, config, store))
    }
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, config: ConnectionConfig, store: SnapshotStore) -> Self {
        let credentials = Credentials::from_config(&config);
        let epoch = store.epoch();
        Self {
            transport,
            config,
            credentials,
            store,
            epoch,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[cfg(test)]
    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn is_authenticated(&self) -> bool {
        self.transport.session().is_authenticated()
    }

    fn write(&self, update: Update) -> bool {
        self.store.update(self.epoch, update)
    }

    pub(crate) fn set_status(&self, status: ConnectionStatus) {
        self.write(Update::Connection(status));
    }

    pub(crate) fn record_tick(&self, tick: u64) {
        self.write(Update::Tick(tick));
    }

    /// One JSON request, bounded by the configured request timeout.
    pub async fn call(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        let limit = self.config.request_timeout;
        match timeout(limit, self.transport.request(method, path, body)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%method, path, "request timed out");
                Err(TransportError::Timeout)
            }
        }
    }

    pub async fn call_binary(&mut self, path: &str) -> Result<Vec<u8>, TransportError> {
        let limit = self.config.request_timeout;
        match timeout(limit, self.transport.request_binary(path)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Logs in when credentials are configured. Without credentials this is
    /// a no-op and requests go out unauthenticated.
    pub async fn authenticate(&mut self) -> Result<(), AuthError> {
        let Some(credentials) = self.credentials.clone() else {
            return Ok(());
        };
        let limit = self.config.request_timeout;
        match timeout(limit, session::authenticate(&mut self.transport, &credentials)).await {
            Ok(result) => result,
            Err(_) => {
                self.transport.session_mut().invalidate();
                Err(AuthError::Rejected(TransportError::Timeout))
            }
        }
    }

    /// Re-authenticates if a 401 dropped the session since the last login.
    pub async fn ensure_session(&mut self) -> Result<(), AuthError> {
        if self.credentials.is_some() && !self.is_authenticated() {
            info!("session lost, re-authenticating");
            return self.authenticate().await;
        }
        Ok(())
    }

    /// Starts a fresh generation in the store, logs in, and runs the
    /// initial refresh. Only bad configuration and failed authentication
    /// are fatal; individual fetch failures are returned.
    pub async fn connect(&mut self) -> Result<Vec<FetchFailure>, ConnectError> {
        self.epoch = self.store.reset();
        self.set_status(ConnectionStatus::Connecting);

        if let Err(err) = self.config.validate() {
            warn!(error = %err, "refusing to connect");
            self.set_status(ConnectionStatus::BadConfig(err.to_string()));
            return Err(err.into());
        }

        if let Err(err) = self.authenticate().await {
            self.set_status(ConnectionStatus::ConnectionFailure(
                "Authentication failed".to_string(),
            ));
            return Err(err.into());
        }

        info!(host = %self.config.host, epoch = self.epoch.value(), "connected");
        Ok(self.initial_refresh().await)
    }

    /// Drops the session and clears the store. Results of anything still in
    /// flight for this connection are discarded.
    pub fn disconnect(&mut self) {
        self.transport.session_mut().invalidate();
        self.store.reset();
        debug!(host = %self.config.host, "disconnected");
    }

    async fn initial_refresh(&mut self) -> Vec<FetchFailure> {
        let mut failures = Vec::new();
        failures.extend(self.refresh_system().await.err());
        // Streams first so decoder bindings can be checked against the list.
        failures.extend(self.refresh_streams().await.err());
        failures.extend(self.refresh_decoders().await);
        failures.extend(self.refresh_presets().await.err());
        failures.extend(self.refresh_preview().await.err());
        self.rebuild_choices();
        failures
    }

    pub async fn refresh_system(&mut self) -> Result<(), FetchFailure> {
        let fetched = self
            .call(Method::Get, "/apis/status", None)
            .await
            .and_then(SystemStatus::from_response);

        match fetched {
            Ok(status) => {
                debug!(card_status = ?status.card_status, "system status");
                self.write(Update::System(status));
                self.set_status(ConnectionStatus::Ok);
                Ok(())
            }
            Err(err) => {
                self.set_status(ConnectionStatus::ConnectionFailure(err.to_string()));
                Err(FetchFailure::new(Resource::System, err))
            }
        }
    }

    /// Stats and configuration are fetched independently; either may fail
    /// without affecting the other or any other decoder.
    pub async fn refresh_decoder(&mut self, index: usize) -> Vec<FetchFailure> {
        let mut failures = Vec::new();

        let stats = self
            .call(Method::Get, &format!("/apis/decoders/{index}/stats"), None)
            .await
            .and_then(DecoderStats::from_response);
        match stats {
            Ok(stats) => {
                debug!(decoder = index, state = ?stats.state, "decoder stats");
                self.write(Update::DecoderStats(index, stats));
            }
            Err(err) => failures.push(FetchFailure::new(Resource::DecoderStats(index), err)),
        }

        let config = self
            .call(Method::Get, &format!("/apis/decoders/{index}"), None)
            .await
            .and_then(DecoderConfig::from_response);
        match config {
            Ok(config) => {
                let (stream, failure) = self.resolve_stream(index, &config).await;
                failures.extend(failure);
                self.write(Update::DecoderBinding(index, DecoderBinding { config, stream }));
            }
            Err(err) => failures.push(FetchFailure::new(Resource::DecoderConfig(index), err)),
        }

        failures
    }

    async fn resolve_stream(
        &mut self,
        decoder: usize,
        config: &DecoderConfig,
    ) -> (StreamResolution, Option<FetchFailure>) {
        let Some(stream_id) = config.assigned_stream() else {
            return (StreamResolution::Unassigned, None);
        };

        // The cached list may predate the assignment, so the detail is
        // always fetched. Only the device saying 404 makes the id stale.
        let fetched = self
            .call(Method::Get, &format!("/apis/streams/{stream_id}"), None)
            .await
            .and_then(StreamEntry::from_response);
        match fetched {
            Ok(entry) => (StreamResolution::Resolved(entry), None),
            Err(TransportError::Http { status: 404 }) => {
                debug!(decoder, stream_id, "decoder references a stream that no longer exists");
                (StreamResolution::Stale { id: stream_id }, None)
            }
            Err(err) => (
                StreamResolution::Unavailable { id: stream_id },
                Some(FetchFailure::new(
                    Resource::StreamDetail { decoder, stream_id },
                    err,
                )),
            ),
        }
    }

    pub async fn refresh_decoders(&mut self) -> Vec<FetchFailure> {
        let mut failures = Vec::new();
        for index in 0..DECODER_COUNT {
            failures.extend(self.refresh_decoder(index).await);
        }
        failures
    }

    /// Replaces the whole stream list. A failed fetch keeps the previous one.
    pub async fn refresh_streams(&mut self) -> Result<(), FetchFailure> {
        let entries = self
            .call(Method::Get, "/apis/streams", None)
            .await
            .and_then(StreamEntry::list_from_response)
            .map_err(|err| FetchFailure::new(Resource::Streams, err))?;

        debug!(count = entries.len(), "stream list");
        self.write(Update::Streams(StreamCatalog::from_entries(entries)));
        Ok(())
    }

    pub async fn refresh_presets(&mut self) -> Result<(), FetchFailure> {
        let presets = self
            .call(Method::Get, "/apis/presets", None)
            .await
            .and_then(PresetList::from_response)
            .map_err(|err| FetchFailure::new(Resource::Presets, err))?;

        debug!(count = presets.data.len(), active = ?presets.active, "preset list");
        self.write(Update::Presets(presets));
        Ok(())
    }

    pub async fn refresh_preview(&mut self) -> Result<(), FetchFailure> {
        let preview = self
            .call(Method::Get, "/apis/preview", None)
            .await
            .and_then(PreviewSettings::from_response)
            .map_err(|err| FetchFailure::new(Resource::Preview, err))?;

        debug!(service = preview.service, "preview settings");
        self.write(Update::Preview(preview));
        Ok(())
    }

    pub async fn refresh_thumbnail(&mut self, index: usize) -> Result<(), FetchFailure> {
        let bytes = self
            .call_binary(&format!("/apis/decoders/{index}/preview"))
            .await
            .map_err(|err| FetchFailure::new(Resource::Thumbnail(index), err))?;

        if bytes.is_empty() {
            return Err(FetchFailure::new(
                Resource::Thumbnail(index),
                TransportError::Decode("empty image".to_string()),
            ));
        }
        debug!(decoder = index, len = bytes.len(), "thumbnail updated");
        self.write(Update::Thumbnail(index, Thumbnail::new(bytes)));
        Ok(())
    }

    /// Fetches thumbnails for decoders that are started, with or without
    /// signal. Stopped or unknown decoders are skipped.
    pub async fn refresh_thumbnails(&mut self) -> Vec<FetchFailure> {
        let mut failures = Vec::new();
        for index in 0..DECODER_COUNT {
            match self.store.decoder_state(index) {
                Some(state) if state.is_running() => {
                    failures.extend(self.refresh_thumbnail(index).await.err());
                }
                state => debug!(decoder = index, ?state, "skipping thumbnail"),
            }
        }
        failures
    }

    /// Rebuilds decoder display names from the stored configurations.
    pub fn rebuild_choices(&self) {
        let bindings: Vec<_> = (0..DECODER_COUNT)
            .map(|index| self.store.decoder_binding(index))
            .collect();
        let refs: Vec<Option<&DecoderBinding>> = bindings.iter().map(|b| b.as_deref()).collect();
        self.write(Update::DecoderChoices(reconcile::decoder_choices(&refs)));
    }
}
