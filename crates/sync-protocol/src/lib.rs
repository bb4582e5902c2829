// sync-protocol: wire types for the playback synchronization hub.
//
// Every message, in both directions, is a JSON object `{"type": ..., ...}`
// discriminated on `type`. `PlaybackState` is deliberately reused as both the
// canonical record held in the state store and the partial "delta" carried on
// the wire by `playback:update` / `control:play` / `control:pause` /
// `control:stop` -- the two are structurally identical, only the merge rules
// applied to them differ (see the hub's `playback` module).

use serde::{Deserialize, Serialize};

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero_volume(v: &f64) -> bool {
    *v == 0.0
}

/// Canonical per-user playback record, and the shape of every partial update
/// sent over the wire.
///
/// Field-by-field serialization mirrors the merge asymmetry in the design
/// doc: `position` / `playing` are real `Option`s (absence means "don't
/// touch"), while `track_id` / `repeat` / `active_device_id` use the empty
/// string and `volume` uses `0.0` as their "don't touch" sentinel. `shuffle`
/// has no sentinel at all -- every merge overwrites it with whatever value
/// was deserialized, so an envelope that never mentions shuffle still resets
/// it to `false`. This is a preserved quirk, not a typo; see DESIGN.md.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub track_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playing: Option<bool>,
    #[serde(default, skip_serializing_if = "is_zero_volume")]
    pub volume: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub shuffle: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repeat: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub active_device_id: String,
}

/// `{"position": <ms>}`, carried by `control:seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekCommand {
    pub position: i64,
}

/// `{"volume": <0.0..=1.0>}`, carried by `control:volume`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeCommand {
    pub volume: f64,
}

/// `{"track_id": <string>}`, carried by `control:load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTrackCommand {
    pub track_id: String,
}

/// `{"shuffle": <bool>}`, carried by `control:shuffle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleCommand {
    pub shuffle: bool,
}

/// `{"mode": <string>}`, carried by `control:repeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatCommand {
    pub mode: String,
}

/// `{"device_id": ..., "position": ...}`, carried by `device:set_active`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetActiveDeviceCommand {
    pub device_id: String,
    pub position: i64,
}

/// A device entry as stored in the per-user device set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
}

/// A device entry annotated with whether it is the currently active one,
/// as carried by `device:list_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceWithStatus {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// Payload of the `device:list_update` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListUpdate {
    pub devices: Vec<DeviceWithStatus>,
    pub active_device_id: String,
}

/// Every message kind flowing over a hub WebSocket connection, in either
/// direction, discriminated on the wire by the `type` field.
///
/// Variants without a payload (`control:next`, `ping`, ...) are plain unit
/// variants: a `data` key must be entirely absent, since deserializing into
/// `()` fails if any field is left over once the tag is stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Envelope {
    #[serde(rename = "playback:update")]
    PlaybackUpdate {
        #[serde(default)]
        data: PlaybackState,
    },
    #[serde(rename = "control:play")]
    ControlPlay {
        #[serde(default)]
        data: PlaybackState,
    },
    #[serde(rename = "control:pause")]
    ControlPause {
        #[serde(default)]
        data: PlaybackState,
    },
    #[serde(rename = "control:stop")]
    ControlStop {
        #[serde(default)]
        data: PlaybackState,
    },
    #[serde(rename = "control:seek")]
    ControlSeek { data: SeekCommand },
    #[serde(rename = "control:volume")]
    ControlVolume { data: VolumeCommand },
    #[serde(rename = "control:load")]
    ControlLoad { data: LoadTrackCommand },
    #[serde(rename = "control:next")]
    ControlNext,
    #[serde(rename = "control:previous")]
    ControlPrevious,
    #[serde(rename = "control:shuffle")]
    ControlShuffle { data: ShuffleCommand },
    #[serde(rename = "control:repeat")]
    ControlRepeat { data: RepeatCommand },
    #[serde(rename = "device:set_active")]
    DeviceSetActive { data: SetActiveDeviceCommand },
    #[serde(rename = "device:get_list")]
    DeviceGetList,
    #[serde(rename = "ping")]
    Ping,

    // -- server -> client only --
    #[serde(rename = "playback:sync")]
    PlaybackSync { data: PlaybackState },
    #[serde(rename = "device:list_update")]
    DeviceListUpdate { data: DeviceListUpdate },
    #[serde(rename = "pong")]
    Pong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_state_omits_unset_sentinel_fields() {
        let state = PlaybackState {
            track_id: "t1".to_owned(),
            position: Some(0),
            playing: Some(true),
            active_device_id: "a".to_owned(),
            ..Default::default()
        };

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "track_id": "t1",
                "position": 0,
                "playing": true,
                "active_device_id": "a",
            })
        );
    }

    #[test]
    fn playback_state_some_zero_position_is_not_omitted() {
        let state = PlaybackState {
            position: Some(0),
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["position"], serde_json::json!(0));
    }

    #[test]
    fn playback_state_true_shuffle_is_serialized_false_is_omitted() {
        let mut state = PlaybackState {
            shuffle: true,
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&state).unwrap()["shuffle"], true);

        state.shuffle = false;
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("shuffle").is_none());
    }

    #[test]
    fn envelope_round_trips_through_type_tag() {
        let env = Envelope::ControlSeek {
            data: SeekCommand { position: 42_000 },
        };
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains("\"type\":\"control:seek\""));
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn control_play_accepts_missing_data_key() {
        let env: Envelope = serde_json::from_str(r#"{"type":"control:play"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::ControlPlay {
                data: PlaybackState::default()
            }
        );
    }

    #[test]
    fn unit_variant_deserializes_with_no_data_key() {
        let env: Envelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env, Envelope::Ping);
    }

    #[test]
    fn control_seek_without_data_is_a_decode_error() {
        let result: Result<Envelope, _> = serde_json::from_str(r#"{"type":"control:seek"}"#);
        assert!(result.is_err());
    }
}
