//! Device tracker (C6): mutates [`EntityState`] from decoded MLGW and ML
//! telegrams. Grounded directly on `media_player.py`'s bus-event listener
//! and `gateway.py`'s `0x02`/`0x03` handlers.

use crate::codec::tables;
use crate::model::{
    Channel, EntityState, GatewayState, MediaInfo, MlPayload, MlTelegram, MlgwPayload,
    MlgwTelegram, Product, SelectSeqToken,
};

fn is_channel_based(source_name: &str) -> bool {
    matches!(source_name, "TV" | "DTV" | "RADIO" | "N.RADIO")
}

fn is_track_based(source_name: &str) -> bool {
    matches!(source_name, "DVD" | "DVD_2" | "CD" | "N.MUSIC")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Video,
    Music,
}

impl MediaKind {
    fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "VIDEO",
            MediaKind::Music => "MUSIC",
        }
    }
}

/// Coarse VIDEO/AUDIO grouping a source belongs to. The original
/// `ml_selectedsource_type_dict` table was not present in the filtered
/// source this was distilled from; sources are grouped by name here along
/// the same split `media_player.py` describes (see DESIGN.md).
fn media_kind(source_name: &str) -> Option<MediaKind> {
    match source_name {
        "TV" | "DTV" | "DVD" | "DVD_2" | "V_AUX" | "V_AUX2" | "V.MEM" | "PC" => {
            Some(MediaKind::Video)
        }
        "RADIO" | "N.RADIO" | "A.MEM" | "N.MUSIC" | "CD" | "A_AUX" => Some(MediaKind::Music),
        _ => None,
    }
}

impl GatewayState {
    /// Apply one decoded MLGW frame to the tracked state (§4.6, MLN-level rules)
    pub fn handle_mlgw(&mut self, telegram: &MlgwTelegram) {
        match &telegram.payload {
            MlgwPayload::SourceStatus {
                mln,
                source,
                activity,
                position,
                ..
            } => {
                let activity_name = tables::ml_state(*activity);
                let idle = activity_name == "Standby" || activity_name == "Unknown";
                let source_name = tables::ml_selected_source(*source);
                if !idle {
                    self.beolink_source = Some(source_name.clone());
                }
                if !idle && *position > 0 {
                    if let Some((_, state)) = self.products.get_mut(mln) {
                        state.current_source = Some(source_name);
                    }
                }
            }
            MlgwPayload::PictSoundStatus {
                mln,
                screen1_active,
                screen2_active,
                ..
            } => {
                let active = tables::mlgw_screen_active(*screen1_active) == "active"
                    || tables::mlgw_screen_active(*screen2_active) == "active";
                if active {
                    if let Some((_, state)) = self.products.get_mut(mln) {
                        state.power_on = true;
                        state.playing = true;
                    }
                }
            }
            MlgwPayload::AllStandby => self.all_standby(),
            // Virtual Button is event-only (§4.6); Light/Control, login and
            // serial-number frames don't mutate entity state.
            _ => {}
        }
    }

    /// Apply one decoded ML bus telegram to the tracked state (§4.6, bus-level rules)
    pub fn handle_ml(&mut self, telegram: &MlTelegram) {
        if telegram.payload_type == "GOTO_SOURCE" {
            if let MlPayload::GotoSource { source, .. } = &telegram.payload {
                self.beolink_source = Some(source.clone());
            }
        }

        if let Some((product, state)) = self.product_by_ml_address_mut(&telegram.from_device) {
            apply_from_me(product, state, telegram);
        }
        if let Some((product, state)) = self.product_by_ml_address_mut(&telegram.to_device) {
            apply_to_me(product, state, telegram);
        }
        if telegram.from_device == "AUDIO_MASTER" {
            for (_, state) in self.products.values_mut() {
                apply_audio_master_broadcast(state, telegram);
            }
        }
        if telegram.to_device == "AUDIO_MASTER" {
            for (_, state) in self.products.values_mut() {
                apply_beo4_key_to_audio_master(state, telegram);
            }
        }
    }
}

fn apply_from_me(product: &Product, state: &mut EntityState, telegram: &MlTelegram) {
    match telegram.payload_type.as_str() {
        "RELEASE" => state.apply_all_standby(),
        "GOTO_SOURCE" => {
            if let MlPayload::GotoSource {
                source,
                channel_track,
            } = &telegram.payload
            {
                state.power_on = true;
                state.playing = true;
                state.media = MediaInfo::default();
                state.current_source = Some(source.clone());
                set_source_info(product, state, source, *channel_track as u16);
            }
        }
        "STATUS_INFO" => {
            if let MlPayload::StatusInfo {
                source,
                local_source,
                channel_track,
                ..
            } = &telegram.payload
            {
                let video_update = telegram.to_device == "MLGW"
                    || (telegram.from_device == "VIDEO_MASTER"
                        && *channel_track > 0
                        && *channel_track < 0xFFFF
                        && *local_source == 0);
                if video_update {
                    state.current_source = Some(source.clone());
                    let dvd_carve_out = source == "DVD" && *local_source == 0;
                    if !dvd_carve_out {
                        set_source_info(product, state, source, *channel_track);
                    }
                }
                if telegram.from_device == "AUDIO_MASTER" {
                    state.current_source = Some(source.clone());
                    set_source_info(product, state, source, *channel_track);
                }
            }
        }
        "VIDEO_TRACK_INFO" => {
            if let MlPayload::VideoTrackInfo {
                source,
                channel_track,
                ..
            } = &telegram.payload
            {
                if *channel_track > 0 && *channel_track < 0xFF {
                    set_source_info(product, state, source, *channel_track);
                }
            }
        }
        _ => {}
    }
}

fn apply_to_me(product: &Product, state: &mut EntityState, telegram: &MlTelegram) {
    match &telegram.payload {
        MlPayload::TrackInfoChangeSource { source, .. } => {
            state.media = MediaInfo::default();
            state.current_source = Some(source.clone());
        }
        MlPayload::TrackInfoLong {
            source,
            channel_track,
            activity,
        } => {
            let playing = tables::ml_state(*activity) == "Playing";
            if (*channel_track > 0 && *channel_track < 0xFF) || playing {
                set_source_info(product, state, source, *channel_track as u16);
            }
        }
        _ => {}
    }
}

fn apply_audio_master_broadcast(state: &mut EntityState, telegram: &MlTelegram) {
    let Some(current) = state.current_source.clone() else {
        return;
    };
    match telegram.payload_type.as_str() {
        "DISPLAY_SOURCE" => {
            if media_kind(&current) == Some(MediaKind::Music) {
                state.media = MediaInfo::default();
                state.media.content_type = Some(MediaKind::Music.label().to_string());
            }
        }
        "EXTENDED_SOURCE_INFORMATION" => {
            if current != "A_AUX" && media_kind(&current) == Some(MediaKind::Music) {
                if let MlPayload::ExtendedSourceInformation {
                    info_type,
                    info_value,
                } = &telegram.payload
                {
                    match telegram.orig_src.as_str() {
                        "RADIO" | "N.RADIO" => match info_type {
                            2 => state.media.artist = Some(info_value.clone()),
                            3 => {
                                let prefix = state.media.artist.take().unwrap_or_default();
                                state.media.artist = Some(format!("{prefix} / {info_value}"));
                            }
                            4 => state.media.title = Some(info_value.clone()),
                            _ => {}
                        },
                        "A.MEM" | "N.MUSIC" | "CD" => match info_type {
                            2 => state.media.album = Some(info_value.clone()),
                            3 => state.media.artist = Some(info_value.clone()),
                            4 => state.media.title = Some(info_value.clone()),
                            _ => {}
                        },
                        _ => {}
                    }
                }
            }
        }
        _ => {}
    }
}

fn apply_beo4_key_to_audio_master(state: &mut EntityState, telegram: &MlTelegram) {
    if telegram.payload_type != "BEO4_KEY" {
        return;
    }
    let Some(current) = state.current_source.clone() else {
        return;
    };
    if let MlPayload::Beo4Key { source, command } = &telegram.payload {
        if *source == current {
            match command.as_str() {
                "Go / Play" => state.playing = true,
                "Stop" => state.playing = false,
                _ => {}
            }
        }
    }
}

/// Update channel/track metadata for `source_name`, deduplicating on no-change
/// (§4.6 closing paragraph)
fn set_source_info(product: &Product, state: &mut EntityState, source_name: &str, channel_track: u16) {
    state.playing = true;
    if is_channel_based(source_name) {
        if state.media.channel == Some(channel_track) {
            return;
        }
        state.media = MediaInfo::default();
        state.media.content_type = media_kind(source_name).map(|k| k.label().to_string());
        state.media.channel = Some(channel_track);
        if channel_track > 0 {
            if let Some(channel) = find_favourite(product, source_name, channel_track) {
                state.media.title = Some(format!("{channel_track} - {}", channel.name));
                state.media.image_url = Some(channel.icon.clone());
            }
        }
    } else if is_track_based(source_name) {
        if state.media.track == Some(channel_track) {
            return;
        }
        state.media = MediaInfo::default();
        state.media.content_type = media_kind(source_name).map(|k| k.label().to_string());
        state.media.track = Some(channel_track);
        state.media.title = Some(format!("Track {channel_track}"));
    }
}

fn find_favourite<'a>(product: &'a Product, source_name: &str, channel_track: u16) -> Option<&'a Channel> {
    let source = product.sources.iter().find(|s| s.name == source_name)?;
    source
        .channels
        .iter()
        .find(|c| assemble_digits(&c.select_seq) == Some(channel_track))
}

fn assemble_digits(seq: &[SelectSeqToken]) -> Option<u16> {
    let mut digits = String::new();
    for token in seq {
        if let SelectSeqToken::Digit(d) = token {
            digits.push_str(&d.to_string());
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SelectCmd;

    fn product(mln: u8) -> Product {
        Product {
            mln,
            ml_address: Some("AUDIO_MASTER".to_string()),
            name: "Living Room".to_string(),
            zone_number: 1,
            zone_name: "Living Room".to_string(),
            sources: vec![crate::model::Source {
                status_id: 0x6F,
                select_id: 0x81,
                name: "RADIO".to_string(),
                destination: 0x01,
                format: "F0".to_string(),
                secondary: 0,
                link: 0,
                select_cmds: vec![SelectCmd {
                    cmd: 0x81,
                    format: "F0".to_string(),
                    unit: None,
                }],
                network_bit: None,
                channels: vec![Channel {
                    name: "BBC Radio 1".to_string(),
                    icon: "bbc1.png".to_string(),
                    select_seq: vec![
                        SelectSeqToken::Digit(1),
                        SelectSeqToken::Digit(0),
                        SelectSeqToken::Select,
                    ],
                }],
            }],
            serial: None,
        }
    }

    fn goto_source_telegram(channel_track: u8) -> MlTelegram {
        MlTelegram {
            to_device: "ALL".to_string(),
            from_device: "AUDIO_MASTER".to_string(),
            telegram_type: "COMMAND".to_string(),
            src_dest: "NONE".to_string(),
            orig_src: "NONE".to_string(),
            payload_type: "GOTO_SOURCE".to_string(),
            payload_len: 2,
            payload: MlPayload::GotoSource {
                source: "RADIO".to_string(),
                channel_track,
            },
        }
    }

    #[test]
    fn goto_source_sets_power_and_source_and_beolink_source() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_ml(&goto_source_telegram(10));
        let (_, state) = gw.products.get(&1).unwrap();
        assert!(state.power_on);
        assert!(state.playing);
        assert_eq!(state.current_source.as_deref(), Some("RADIO"));
        assert_eq!(gw.beolink_source.as_deref(), Some("RADIO"));
    }

    #[test]
    fn goto_source_resolves_favourite_channel_title() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_ml(&goto_source_telegram(10));
        let (_, state) = gw.products.get(&1).unwrap();
        assert_eq!(state.media.title.as_deref(), Some("10 - BBC Radio 1"));
        assert_eq!(state.media.image_url.as_deref(), Some("bbc1.png"));
    }

    #[test]
    fn release_from_me_clears_state() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_ml(&goto_source_telegram(10));
        let release = MlTelegram {
            to_device: "ALL".to_string(),
            from_device: "AUDIO_MASTER".to_string(),
            telegram_type: "COMMAND".to_string(),
            src_dest: "NONE".to_string(),
            orig_src: "NONE".to_string(),
            payload_type: "RELEASE".to_string(),
            payload_len: 0,
            payload: MlPayload::Other,
        };
        gw.handle_ml(&release);
        let (_, state) = gw.products.get(&1).unwrap();
        assert!(!state.power_on);
        assert!(!state.playing);
    }

    #[test]
    fn beo4_key_go_play_sets_playing_when_source_matches() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_ml(&goto_source_telegram(10));
        let key = MlTelegram {
            to_device: "AUDIO_MASTER".to_string(),
            from_device: "SOURCE_CENTER".to_string(),
            telegram_type: "COMMAND".to_string(),
            src_dest: "NONE".to_string(),
            orig_src: "NONE".to_string(),
            payload_type: "BEO4_KEY".to_string(),
            payload_len: 2,
            payload: MlPayload::Beo4Key {
                source: "RADIO".to_string(),
                command: "Stop".to_string(),
            },
        };
        gw.handle_ml(&key);
        let (_, state) = gw.products.get(&1).unwrap();
        assert!(!state.playing);
    }

    #[test]
    fn all_standby_mlgw_clears_every_product() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_ml(&goto_source_telegram(10));
        gw.handle_mlgw(&MlgwTelegram {
            payload_type: 0x05,
            payload: MlgwPayload::AllStandby,
        });
        let (_, state) = gw.products.get(&1).unwrap();
        assert!(!state.power_on);
        assert!(state.media.title.is_none());
    }

    #[test]
    fn source_status_updates_mln_source_when_active_and_positioned() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_mlgw(&MlgwTelegram {
            payload_type: 0x02,
            payload: MlgwPayload::SourceStatus {
                mln: 1,
                source: 0x6F,
                medium_position: 0,
                position: 5,
                activity: 0x02,
                picture_format: 0,
            },
        });
        let (_, state) = gw.products.get(&1).unwrap();
        assert_eq!(state.current_source.as_deref(), Some("RADIO"));
        assert_eq!(gw.beolink_source.as_deref(), Some("RADIO"));
    }

    #[test]
    fn source_status_standby_does_not_update_source() {
        let mut gw = GatewayState::new(vec![product(1)]);
        gw.handle_mlgw(&MlgwTelegram {
            payload_type: 0x02,
            payload: MlgwPayload::SourceStatus {
                mln: 1,
                source: 0x6F,
                medium_position: 0,
                position: 5,
                activity: 0x06, // Standby
                picture_format: 0,
            },
        });
        let (_, state) = gw.products.get(&1).unwrap();
        assert!(state.current_source.is_none());
        assert!(gw.beolink_source.is_none());
    }
}
