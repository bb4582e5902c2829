//! Field-by-field merge of a partial `PlaybackState` delta into the
//! canonical record held by the state store.

use sync_protocol::PlaybackState;

/// Applies `delta` on top of `current` using the per-field sentinel rules:
///
/// - `track_id`, `repeat`, `active_device_id`: empty string means "not set",
///   anything else overwrites.
/// - `position`, `playing`: `None` means "not set", `Some(_)` overwrites,
///   including `Some(0)` / `Some(false)`.
/// - `volume`: `0.0` means "not set". A delta can't explicitly silence
///   volume to zero; this mirrors the source system's behavior.
/// - `shuffle`: no sentinel. Always overwritten, so an envelope that omits
///   `shuffle` resets it to `false`.
pub fn merge(current: &mut PlaybackState, delta: &PlaybackState) {
    if !delta.track_id.is_empty() {
        current.track_id = delta.track_id.clone();
    }
    if let Some(position) = delta.position {
        current.position = Some(position);
    }
    if let Some(playing) = delta.playing {
        current.playing = Some(playing);
    }
    if delta.volume != 0.0 {
        current.volume = delta.volume;
    }
    current.shuffle = delta.shuffle;
    if !delta.repeat.is_empty() {
        current.repeat = delta.repeat.clone();
    }
    if !delta.active_device_id.is_empty() {
        current.active_device_id = delta.active_device_id.clone();
    }
}
