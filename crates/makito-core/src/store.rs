use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::api::{DecoderStats, PresetList, PreviewSettings, SystemStatus};
use crate::codes::DecoderState;
use crate::reconcile::{
    self, DecoderBinding, DecoderChoice, StreamCatalog, Vars, DECODER_COUNT,
};
use crate::snapshot::{ConnectionStatus, Snapshot, Thumbnail, ThumbnailMeta};

type Slot<T> = RwLock<Option<Arc<T>>>;

fn slots<T>() -> [Slot<T>; DECODER_COUNT] {
    std::array::from_fn(|_| RwLock::new(None))
}

fn read<T>(slot: &Slot<T>) -> Option<Arc<T>> {
    slot.read().clone()
}

/// Connection generation. Writes stamped with an older epoch than the
/// store's current one are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// One whole-value replacement of one resource.
#[derive(Debug, Clone)]
pub enum Update {
    Connection(ConnectionStatus),
    System(SystemStatus),
    DecoderStats(usize, DecoderStats),
    DecoderBinding(usize, DecoderBinding),
    Streams(StreamCatalog),
    Presets(PresetList),
    Preview(PreviewSettings),
    Thumbnail(usize, Thumbnail),
    DecoderChoices(Vec<DecoderChoice>),
    Tick(u64),
}

impl Update {
    fn resource(&self) -> &'static str {
        match self {
            Update::Connection(_) => "connection",
            Update::System(_) => "system",
            Update::DecoderStats(..) => "decoder_stats",
            Update::DecoderBinding(..) => "decoder_config",
            Update::Streams(_) => "streams",
            Update::Presets(_) => "presets",
            Update::Preview(_) => "preview",
            Update::Thumbnail(..) => "thumbnail",
            Update::DecoderChoices(_) => "decoder_choices",
            Update::Tick(_) => "tick",
        }
    }
}

struct Inner {
    host: String,
    epoch: RwLock<u64>,
    tick: RwLock<u64>,
    connection: RwLock<ConnectionStatus>,
    system: Slot<SystemStatus>,
    stats: [Slot<DecoderStats>; DECODER_COUNT],
    bindings: [Slot<DecoderBinding>; DECODER_COUNT],
    streams: Slot<StreamCatalog>,
    presets: Slot<PresetList>,
    preview: Slot<PreviewSettings>,
    thumbnails: [Slot<Thumbnail>; DECODER_COUNT],
    decoder_choices: Slot<Vec<DecoderChoice>>,
}

/// Latest successfully fetched value per device resource.
///
/// Cloning yields another handle onto the same store. Readers always see a
/// complete value for each resource since entries are swapped, never edited.
#[derive(Clone)]
pub struct SnapshotStore {
    inner: Arc<Inner>,
}

impl SnapshotStore {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                host: host.into(),
                epoch: RwLock::new(0),
                tick: RwLock::new(0),
                connection: RwLock::new(ConnectionStatus::Disconnected),
                system: RwLock::new(None),
                stats: slots(),
                bindings: slots(),
                streams: RwLock::new(None),
                presets: RwLock::new(None),
                preview: RwLock::new(None),
                thumbnails: slots(),
                decoder_choices: RwLock::new(None),
            }),
        }
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(*self.inner.epoch.read())
    }

    /// Starts a new generation: every slot is cleared and writes stamped with
    /// an earlier epoch are rejected from now on.
    pub fn reset(&self) -> Epoch {
        let inner = &self.inner;
        let mut epoch = inner.epoch.write();
        *epoch += 1;

        *inner.tick.write() = 0;
        *inner.connection.write() = ConnectionStatus::Disconnected;
        *inner.system.write() = None;
        for index in 0..DECODER_COUNT {
            *inner.stats[index].write() = None;
            *inner.bindings[index].write() = None;
            *inner.thumbnails[index].write() = None;
        }
        *inner.streams.write() = None;
        *inner.presets.write() = None;
        *inner.preview.write() = None;
        *inner.decoder_choices.write() = None;

        debug!(epoch = *epoch, "snapshot store reset");
        Epoch(*epoch)
    }

    /// Applies `update` unless the store has moved past `epoch`. Returns
    /// whether the write landed.
    pub fn update(&self, epoch: Epoch, update: Update) -> bool {
        let inner = &self.inner;
        let current = inner.epoch.read();
        if *current != epoch.0 {
            debug!(
                resource = update.resource(),
                write_epoch = epoch.0,
                current_epoch = *current,
                "discarding write from a previous connection"
            );
            return false;
        }

        fn swap<T>(slot: Option<&Slot<T>>, value: T) -> bool {
            match slot {
                Some(slot) => {
                    *slot.write() = Some(Arc::new(value));
                    true
                }
                None => false,
            }
        }

        match update {
            Update::Connection(status) => {
                *inner.connection.write() = status;
                true
            }
            Update::Tick(tick) => {
                *inner.tick.write() = tick;
                true
            }
            Update::System(status) => swap(Some(&inner.system), status),
            Update::DecoderStats(index, stats) => swap(inner.stats.get(index), stats),
            Update::DecoderBinding(index, binding) => swap(inner.bindings.get(index), binding),
            Update::Streams(catalog) => swap(Some(&inner.streams), catalog),
            Update::Presets(presets) => swap(Some(&inner.presets), presets),
            Update::Preview(preview) => swap(Some(&inner.preview), preview),
            Update::Thumbnail(index, thumbnail) => swap(inner.thumbnails.get(index), thumbnail),
            Update::DecoderChoices(choices) => swap(Some(&inner.decoder_choices), choices),
        }
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection.read().clone()
    }

    pub fn tick(&self) -> u64 {
        *self.inner.tick.read()
    }

    pub fn system(&self) -> Option<Arc<SystemStatus>> {
        read(&self.inner.system)
    }

    pub fn decoder_stats(&self, index: usize) -> Option<Arc<DecoderStats>> {
        self.inner.stats.get(index).and_then(read)
    }

    pub fn decoder_binding(&self, index: usize) -> Option<Arc<DecoderBinding>> {
        self.inner.bindings.get(index).and_then(read)
    }

    pub fn decoder_state(&self, index: usize) -> Option<DecoderState> {
        self.decoder_stats(index)?
            .state
            .map(DecoderState::from_code)
    }

    pub fn streams(&self) -> Option<Arc<StreamCatalog>> {
        read(&self.inner.streams)
    }

    pub fn presets(&self) -> Option<Arc<PresetList>> {
        read(&self.inner.presets)
    }

    pub fn preview(&self) -> Option<Arc<PreviewSettings>> {
        read(&self.inner.preview)
    }

    pub fn thumbnail(&self, index: usize) -> Option<Arc<Thumbnail>> {
        self.inner.thumbnails.get(index).and_then(read)
    }

    pub fn decoder_choices(&self) -> Option<Arc<Vec<DecoderChoice>>> {
        read(&self.inner.decoder_choices)
    }

    /// Reconciled variables for one decoder, from whatever is stored now.
    pub fn decoder_vars(&self, index: usize) -> Vars {
        let stats = self.decoder_stats(index);
        let binding = self.decoder_binding(index);
        let catalog = self.streams();
        reconcile::reconcile_decoder(index, stats.as_deref(), binding.as_deref(), catalog.as_deref())
    }

    pub fn system_vars(&self) -> Vars {
        let status = self.system();
        let connection = self.connection_status();
        let catalog = self.streams();
        let presets = self.presets();
        let preview = self.preview();

        let mut vars = reconcile::reconcile_system(status.as_deref(), &connection, self.host());
        vars.extend(reconcile::reconcile_stream_count(catalog.as_deref()));
        vars.extend(reconcile::reconcile_presets(presets.as_deref()));
        vars.extend(reconcile::reconcile_preview(preview.as_deref()));
        vars
    }

    pub fn snapshot(&self) -> Snapshot {
        // Hold the generation steady while assembling so a concurrent reset
        // cannot mix two connections into one snapshot.
        let epoch = self.inner.epoch.read();

        let system = self.system_vars();
        let decoders: Vec<Vars> = (0..DECODER_COUNT).map(|i| self.decoder_vars(i)).collect();
        let vars = reconcile::flatten(&system, &decoders);

        Snapshot {
            ts: Utc::now(),
            epoch: *epoch,
            tick: self.tick(),
            status: self.connection_status(),
            system,
            decoders,
            vars,
            stream_choices: self
                .streams()
                .map(|catalog| catalog.choices.clone())
                .unwrap_or_default(),
            decoder_choices: self
                .decoder_choices()
                .map(|choices| choices.as_ref().clone())
                .unwrap_or_default(),
            presets: self
                .presets()
                .map(|presets| presets.data.clone())
                .unwrap_or_default(),
            thumbnails: (0..DECODER_COUNT)
                .map(|i| self.thumbnail(i).map(|t| ThumbnailMeta::from(t.as_ref())))
                .collect(),
        }
    }
}
