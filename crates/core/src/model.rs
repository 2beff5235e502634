//! The shared data model: telegrams, the hub's source/channel/product
//! configuration, and the state the tracker (C6) maintains per entity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A MasterLink Node: the 1-based index the MLGW protocol uses to address a product
pub type Mln = u8;

/// A decoded MLGW-protocol telegram (port 9000 binary frame)
#[derive(Debug, Clone, PartialEq)]
pub struct MlgwTelegram {
    /// The frame type byte
    pub payload_type: u8,
    /// Decoded payload, keyed by `payload_type`
    pub payload: MlgwPayload,
}

/// The decoded body of an MLGW telegram, one variant per payload type this
/// engine consumes (§4.3)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "payload_type", rename_all = "snake_case")]
pub enum MlgwPayload {
    /// `0x02 Source Status`
    SourceStatus {
        /// MasterLink Node this status applies to
        mln: Mln,
        /// Raw source status byte
        source: u8,
        /// Combined medium/position word
        medium_position: u16,
        /// Position within the medium
        position: u16,
        /// Raw activity byte, resolved via [`crate::codec::tables::ml_state`]
        activity: u8,
        /// Raw picture format byte
        picture_format: u8,
    },
    /// `0x03 Pict&Snd Status`
    PictSoundStatus {
        /// MasterLink Node this status applies to
        mln: Mln,
        /// Mute/unmuted state of the audio
        sound_status: u8,
        /// Speaker mode byte
        speaker_mode: u8,
        /// Volume level
        volume: u8,
        /// Screen 1 mute flag
        screen1_mute: u8,
        /// Screen 1 active flag
        screen1_active: u8,
        /// Screen 2 mute flag
        screen2_mute: u8,
        /// Screen 2 active flag
        screen2_active: u8,
        /// Cinema mode flag
        cinema_mode: u8,
        /// Stereo indicator flag
        stereo_mode: u8,
    },
    /// `0x04 Light and Control command`
    LightControlEvent {
        /// Room byte
        room: u8,
        /// `LIGHT` or `CONTROL`
        kind: String,
        /// Beo4 key byte
        command: u8,
    },
    /// `0x05 All standby notification`
    AllStandby,
    /// `0x20 MLGW virtual button event`
    VirtualButton {
        /// Button number
        button: u8,
        /// `PRESS`/`HOLD`/`RELEASE`, defaulting to `PRESS` when absent on the wire
        action: String,
    },
    /// `0x31 Login status`
    LoginStatus {
        /// `true` when login succeeded
        ok: bool,
    },
    /// `0x3A Serial Number`
    SerialNumber {
        /// ASCII serial number reported by the gateway
        serial: String,
    },
    /// `0x38 Configuration change notification`
    ConfigChanged,
}

/// A decoded MasterLink bus telegram (from the port 23 trace stream)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MlTelegram {
    /// Device the telegram is addressed to, resolved via [`crate::codec::tables::device_code`]
    pub to_device: String,
    /// Device the telegram came from, resolved via [`crate::codec::tables::device_code`]
    pub from_device: String,
    /// Telegram type, resolved via [`crate::codec::tables::ml_telegram_type`]
    pub telegram_type: String,
    /// Destination selector, resolved via [`crate::codec::tables::ml_selected_source`]
    pub src_dest: String,
    /// Original source, resolved via [`crate::codec::tables::ml_selected_source`]
    pub orig_src: String,
    /// Payload/command type, resolved via [`crate::codec::tables::ml_command_type`]
    pub payload_type: String,
    /// Length of the payload in bytes
    pub payload_len: usize,
    /// Decoded payload fields
    pub payload: MlPayload,
}

/// The decoded body of an ML telegram, one variant per payload type §4.2 names
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum MlPayload {
    /// `0x87 STATUS_INFO`
    StatusInfo {
        /// Resolved source name
        source: String,
        /// Raw local_source byte
        local_source: u8,
        /// Combined source-medium word
        source_medium: u16,
        /// Channel or track number
        channel_track: u16,
        /// Raw activity byte
        activity: u8,
        /// Raw source-type byte
        source_type: u8,
        /// Raw picture identifier byte
        picture_identifier: u8,
    },
    /// `0x06 DISPLAY_SOURCE`
    DisplaySource {
        /// Right-trimmed ASCII display text
        text: String,
    },
    /// `0x0B EXTENDED_SOURCE_INFORMATION`
    ExtendedSourceInformation {
        /// Sub-type byte selecting which field this is
        info_type: u8,
        /// Untrimmed ASCII value
        info_value: String,
    },
    /// `0x0D BEO4_KEY`
    Beo4Key {
        /// Resolved source name the key was sent against
        source: String,
        /// Resolved Beo4 command name
        command: String,
    },
    /// `0x82 TRACK_INFO_LONG`
    TrackInfoLong {
        /// Resolved source name
        source: String,
        /// Channel or track number
        channel_track: u8,
        /// Raw activity byte
        activity: u8,
    },
    /// `0x94 VIDEO_TRACK_INFO`
    VideoTrackInfo {
        /// Resolved source name
        source: String,
        /// Channel or track number
        channel_track: u16,
        /// Raw activity byte
        activity: u8,
    },
    /// `0x44 TRACK_INFO`, sub-code `Change Source`
    TrackInfoChangeSource {
        /// Resolved previous source name
        prev_source: String,
        /// Resolved new source name
        source: String,
    },
    /// `0x44 TRACK_INFO`, sub-code `Current Source`
    TrackInfoCurrentSource {
        /// Resolved source name
        source: String,
    },
    /// `0x44 TRACK_INFO`, any other sub-code
    TrackInfoUndefined,
    /// `0x45 GOTO_SOURCE`
    GotoSource {
        /// Resolved source name
        source: String,
        /// Channel or track number
        channel_track: u8,
    },
    /// `0x20 MLGW_REMOTE_BEO4`
    MlgwRemoteBeo4 {
        /// Resolved Beo4 command name
        command: String,
        /// Resolved destination selector name
        dest_selector: String,
    },
    /// `0x5C LOCK_MANAGER_COMMAND`
    LockManagerCommand {
        /// Resolved sub-type name
        subtype: String,
    },
    /// `0x08 REQUEST_DISTRIBUTED_SOURCE`
    RequestDistributedSource {
        /// Sub-type: request / no source / source active
        subtype: &'static str,
        /// Resolved source name, present only for `Source Active`
        source: Option<String>,
    },
    /// `0x30 WHAT_AUDIO_SOURCE`
    RequestLocalSource {
        /// Sub-type: request / no source / source active
        subtype: &'static str,
        /// Resolved source name, present only for `Source Active`
        source: Option<String>,
    },
    /// Any other, unhandled payload type: carried through unparsed
    Other,
}

/// One selectable source as described by the hub's configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Status byte the hub reports in source-status frames
    pub status_id: u8,
    /// Beo4 key byte used to select this source
    pub select_id: u8,
    /// Human-readable name, e.g. `"RADIO"`
    pub name: String,
    /// Destination selector this source is requested on
    pub destination: u8,
    /// `"F0"` for Beo4 sources, `"F20"` for BeoRemote One sources
    pub format: String,
    /// Secondary routing byte used with Beo4 sends
    pub secondary: u8,
    /// Network link byte used with BeoRemote One sends
    pub link: u8,
    /// Commands usable to select this source
    #[serde(default)]
    pub select_cmds: Vec<SelectCmd>,
    /// Whether this source reports over the BeoRemote One network bit
    #[serde(default)]
    pub network_bit: Option<bool>,
    /// Favourites/channels configured under this source
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// A command usable to select a [`Source`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectCmd {
    /// Beo4 or BeoRemote One command byte
    pub cmd: u8,
    /// `"F0"` or `"F20"`
    pub format: String,
    /// BeoRemote One unit byte, only meaningful for `"F20"`
    #[serde(default)]
    pub unit: Option<u8>,
}

/// A favourite/preset channel inside a [`Source`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Favourite display name
    pub name: String,
    /// Icon identifier/URL
    pub icon: String,
    /// The Beo4 replay sequence (digit/delay/select tokens) used to recover the channel number
    pub select_seq: Vec<SelectSeqToken>,
}

/// One token in a [`Channel`]'s replay sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectSeqToken {
    /// A decimal digit 0-9
    Digit(u8),
    /// A pause with no semantic content
    Delay,
    /// The final select/confirm keypress
    Select,
}

/// A product/device/entity, as configured on the hub plus what discovery learns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// MasterLink Node, the MLGW-protocol addressing unit (1-indexed)
    pub mln: Mln,
    /// Bus-level address, learned dynamically via discovery (§4.7)
    #[serde(default)]
    pub ml_address: Option<String>,
    /// Display name
    pub name: String,
    /// Zone/room number this product belongs to
    pub zone_number: u8,
    /// Zone/room name this product belongs to
    pub zone_name: String,
    /// Sources configured for this product
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Serial number, present for network-link devices that never answer on the ML bus
    #[serde(default)]
    pub serial: Option<String>,
}

impl Product {
    /// Network-link devices carry a serial number and are skipped by discovery (§4.7)
    pub fn is_network_link(&self) -> bool {
        self.serial.is_some()
    }
}

/// Media metadata tracked for a [`Product`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaInfo {
    /// `"MUSIC"`, `"MOVIE"`, etc.
    pub content_type: Option<String>,
    /// Track number, for track-based sources
    pub track: Option<u16>,
    /// Track/channel title
    pub title: Option<String>,
    /// Artist name
    pub artist: Option<String>,
    /// Album name
    pub album: Option<String>,
    /// Album artist name
    pub album_artist: Option<String>,
    /// Channel number, for channel-based sources
    pub channel: Option<u16>,
    /// Artwork/icon URL
    pub image_url: Option<String>,
}

/// The live state the device tracker (C6) maintains for one [`Product`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityState {
    /// Whether the product is powered on
    pub power_on: bool,
    /// Whether the product is actively playing
    pub playing: bool,
    /// Currently selected source name
    pub current_source: Option<String>,
    /// Current media metadata
    pub media: MediaInfo,
}

impl EntityState {
    /// Apply an `all_standby` transition; idempotent (§8 property 5)
    pub fn apply_all_standby(&mut self) {
        self.power_on = false;
        self.playing = false;
        self.media = MediaInfo::default();
    }
}

/// The shared, single-writer state of the whole gateway
#[derive(Debug, Clone, Default)]
pub struct GatewayState {
    /// The most recently observed bus-wide active source (never Standby/Unknown)
    pub beolink_source: Option<String>,
    /// Whether the MLGW session (C4) is in `Ready`
    pub connected_mlgw: bool,
    /// Whether the ML trace session (C5) is attached
    pub connected_ml: bool,
    /// Gateway serial number, once learned
    pub serial: Option<String>,
    /// Per-product entity state, keyed by `mln`
    pub products: HashMap<Mln, (Product, EntityState)>,
    /// Cooperative stop flag: once set, no loop may block indefinitely
    pub stopped: bool,
    /// Set once a session exhausts its reconnect budget
    pub broken: bool,
}

impl GatewayState {
    /// Construct state pre-populated with the hub's product list, all entities at rest
    pub fn new(products: Vec<Product>) -> Self {
        let products = products
            .into_iter()
            .map(|p| (p.mln, (p, EntityState::default())))
            .collect();
        GatewayState {
            products,
            ..Default::default()
        }
    }

    /// Apply `all_standby` to every tracked product (§4.6)
    pub fn all_standby(&mut self) {
        for (_, state) in self.products.values_mut() {
            state.apply_all_standby();
        }
    }

    /// Find the product whose learned `ml_address` matches `device`
    pub fn product_by_ml_address_mut(&mut self, device: &str) -> Option<&mut (Product, EntityState)> {
        self.products
            .values_mut()
            .find(|(p, _)| p.ml_address.as_deref() == Some(device))
    }

    /// Find the product whose learned `ml_address` matches `device`
    pub fn product_by_ml_address(&self, device: &str) -> Option<&(Product, EntityState)> {
        self.products
            .values()
            .find(|(p, _)| p.ml_address.as_deref() == Some(device))
    }
}
