//! Boolean and style predicates over the store, for status indicators.

use serde::Serialize;

use crate::codes::DecoderState;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

pub const GREY: Rgb = Rgb(128, 128, 128);
pub const YELLOW: Rgb = Rgb(255, 255, 0);
pub const GREEN: Rgb = Rgb(0, 255, 0);
pub const RED: Rgb = Rgb(255, 0, 0);
pub const WHITE: Rgb = Rgb(255, 255, 255);
pub const BLACK: Rgb = Rgb(0, 0, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Style {
    pub bg: Rgb,
    pub fg: Rgb,
}

pub fn decoder_status_matches(store: &SnapshotStore, decoder: usize, expected: DecoderState) -> bool {
    store.decoder_state(decoder) == Some(expected)
}

/// `None` when no stats are stored or the state code is not one of the four
/// known ones.
pub fn decoder_state_style(store: &SnapshotStore, decoder: usize) -> Option<Style> {
    match store.decoder_state(decoder)? {
        DecoderState::Stopped => Some(Style { bg: GREY, fg: WHITE }),
        DecoderState::StartedNoSignal => Some(Style { bg: YELLOW, fg: BLACK }),
        DecoderState::Active => Some(Style { bg: GREEN, fg: BLACK }),
        DecoderState::Trouble => Some(Style { bg: RED, fg: WHITE }),
        DecoderState::Other(_) => None,
    }
}

pub fn decoder_signal_present(store: &SnapshotStore, decoder: usize) -> bool {
    decoder_status_matches(store, decoder, DecoderState::Active)
}

pub fn decoder_has_error(store: &SnapshotStore, decoder: usize) -> bool {
    decoder_status_matches(store, decoder, DecoderState::Trouble)
}

pub fn connection_ok(store: &SnapshotStore) -> bool {
    store.system().is_some_and(|status| status.card_ok())
}

/// The latest thumbnail as a `data:` URI.
pub fn decoder_thumbnail(store: &SnapshotStore, decoder: usize) -> Option<String> {
    store.thumbnail(decoder).map(|thumbnail| thumbnail.data_uri())
}
