//! Static bidirectional code/name tables for both wire formats.
//!
//! Every table follows the same shape: a `match` from byte to canonical
//! upper-case name for decoding, and the reverse `match` from name to byte
//! for encoding. Unknown codes never fail decoding; they fall back to the
//! sentinel produced by [`unknown`].

/// Sentinel used whenever a byte is not present in one of the tables below
pub fn unknown(code: u8) -> String {
    format!("UNKNOWN (type=0x{code:02X})")
}

macro_rules! code_table {
    ($fn_name:ident, $rev_name:ident, { $($code:expr => $name:expr),+ $(,)? }) => {
        /// Look up the canonical name for a byte code
        pub fn $fn_name(code: u8) -> String {
            match code {
                $($code => $name.to_string(),)+
                other => unknown(other),
            }
        }

        /// Look up the byte code for a canonical name (case-insensitive)
        pub fn $rev_name(name: &str) -> Option<u8> {
            let upper = name.to_uppercase();
            match upper.as_str() {
                $(_ if upper == $name.to_uppercase() => Some($code),)+
                _ => None,
            }
        }
    };
}

code_table!(ml_telegram_type, ml_telegram_type_code, {
    0x0A => "COMMAND",
    0x0B => "REQUEST",
    0x14 => "RESPONSE",
    0x2C => "INFO",
});

code_table!(ml_command_type, ml_command_type_code, {
    0x45 => "GOTO_SOURCE",
    0x6C => "DISTRIBUTION_REQUEST",
    0x10 => "STANDBY",
    0x11 => "RELEASE",
    0x3C => "TIMER",
    0x0D => "BEO4_KEY",
    0x04 => "MASTER_PRESENT",
    0x5C => "LOCK_MANAGER_COMMAND",
    0x30 => "WHAT_AUDIO_SOURCE",
    0x08 => "UNKNOWN_SOURCE_REQUEST",
    0x40 => "CLOCK",
    0x44 => "TRACK_INFO",
    0x82 => "TRACK_INFO_LONG",
    0x87 => "STATUS_INFO",
    0x94 => "VIDEO_TRACK_INFO",
    0x20 => "MLGW_REMOTE_BEO4",
    0x06 => "DISPLAY_SOURCE",
    0x0B => "EXTENDED_SOURCE_INFORMATION",
    0x96 => "PC_PRESENT",
    0x98 => "PICTURE_STATUS_INFO",
});

code_table!(ml_lock_manager_subtype, ml_lock_manager_subtype_code, {
    0x01 => "Request Key",
    0x02 => "Transfer Key",
    0x03 => "Transfer Impossible",
    0x04 => "Key Received",
    0xFF => "Undefined",
});

code_table!(ml_state, ml_state_code, {
    0x00 => "Unknown",
    0x01 => "Stop",
    0x02 => "Playing",
    0x03 => "Fast Forward",
    0x04 => "Rewind",
    0x05 => "Record Lock",
    0x06 => "Standby",
    0x07 => "Load / No Media",
    0x08 => "Still Picture",
    0x14 => "Scan Forward",
    0x15 => "Scan Reverse",
    0xFF => "Blank Status",
});

/// `mlgw_sourceactivitydict` is a straight alias of `ml_state_dict` in the original source
pub fn mlgw_source_activity(code: u8) -> String {
    ml_state(code)
}

code_table!(ml_picture_format, ml_picture_format_code, {
    0x00 => "Not known",
    0x01 => "Known by decoder",
    0x02 => "4:3",
    0x03 => "16:9",
    0x04 => "4:3 Letterbox middle",
    0x05 => "4:3 Letterbox top",
    0x06 => "4:3 Letterbox bottom",
    0xFF => "Blank picture",
});

code_table!(ml_dest_selector, ml_dest_selector_code, {
    0x00 => "Video Source",
    0x01 => "Audio Source",
    0x05 => "V.TAPE/V.MEM",
    0x0F => "All Products",
    0x1B => "MLGW",
});

code_table!(ml_selected_source, ml_selected_source_code, {
    0x00 => "NONE",
    0x0B => "TV",
    0x15 => "V.MEM",
    0x16 => "DVD_2",
    0x1F => "DTV",
    0x29 => "DVD",
    0x33 => "V_AUX",
    0x3E => "V_AUX2",
    0x47 => "PC",
    0x6F => "RADIO",
    0x79 => "A.MEM",
    0x7A => "N.MUSIC",
    0x8D => "CD",
    0x97 => "A_AUX",
    0xA1 => "N.RADIO",
    0xFE => "<ALL>",
});

/// Beo4 key codes. `0x0D` genuinely exists under two names in the original
/// table (`Doorcam` then `Mute`, with `Mute` winning the dict literal) — see
/// DESIGN.md Open Question 2. The forward lookup below matches that: later
/// entries win ties, so `0x0D` decodes as `"Mute"`.
pub fn beo4_command(code: u8) -> String {
    match code {
        0x0C => "Standby",
        0x47 => "Sleep",
        0x80 => "TV",
        0x81 => "Radio",
        0x82 => "DTV2",
        0x83 => "Aux_A",
        0x85 => "V.Mem",
        0x86 => "DVD",
        0x87 => "Camera",
        0x88 => "Text",
        0x8A => "DTV",
        0x8B => "PC",
        0x91 => "A.Mem",
        0x92 => "CD",
        0x93 => "N.Radio",
        0x94 => "N.Music",
        0x97 => "CD2",
        0x96 => "Spotify",
        0xBF => "AV",
        0x00 => "Digit-0",
        0x01 => "Digit-1",
        0x02 => "Digit-2",
        0x03 => "Digit-3",
        0x04 => "Digit-4",
        0x05 => "Digit-5",
        0x06 => "Digit-6",
        0x07 => "Digit-7",
        0x08 => "Digit-8",
        0x09 => "Digit-9",
        0x1E => "STEP_UP",
        0x1F => "STEP_DW",
        0x32 => "REWIND",
        0x33 => "RETURN",
        0x34 => "WIND",
        0x35 => "Go / Play",
        0x36 => "Stop",
        0xD4 => "Yellow",
        0xD5 => "Green",
        0xD8 => "Blue",
        0xD9 => "Red",
        // 0x0D is assigned twice in the original dict literal (Doorcam, then
        // Mute); the later entry wins the forward lookup.
        0x0D => "Mute",
        0x1C => "P.Mute",
        0x2A => "Format",
        0x44 => "Sound / Speaker",
        0x5C => "Menu",
        0x60 => "Volume UP",
        0x64 => "Volume DOWN",
        0xDA => "Cinema_On",
        0xDB => "Cinema_Off",
        0x14 => "BACK",
        0x7F => "Exit",
        0x70 => "Rewind Repeat",
        0x71 => "Wind Repeat",
        0x72 => "Step_UP Repeat",
        0x73 => "Step_DW Repeat",
        0x75 => "Go Repeat",
        0x76 => "Green Repeat",
        0x77 => "Yellow Repeat",
        0x78 => "Blue Repeat",
        0x79 => "Red Repeat",
        0x7E => "Key Release",
        0x40 => "Guide",
        0x43 => "Info",
        0x13 => "SELECT",
        0xCA => "Cursor_Up",
        0xCB => "Cursor_Down",
        0xCC => "Cursor_Left",
        0xCD => "Cursor_Right",
        0x9B => "Light",
        0x9C => "Command",
        0x58 => "Light Timeout",
        0xFF => "<all>",
        // Shuffle/Repeat never show up in the retrieved source (the reference
        // integration doesn't expose them); these two match the codes B&O's
        // own Beo4 documentation assigns. See DESIGN.md Open Questions.
        0x6C => "Random",
        0x6D => "Repeat",
        other => return unknown(other),
    }
    .to_string()
}

/// Reverse lookup for Beo4 names. `"Doorcam"` also resolves to `0x0D` even
/// though the forward direction prefers `"Mute"`; both names are valid keys
/// into this table, matching `BEO4_CMDS` being built from the same dict.
/// Space and underscore are treated as equivalent separators (`"STEP UP"`
/// resolves the same as `"STEP_UP"`), and `"STEP DOWN"`/`"STEP_DOWN"` bridge
/// to the table's own `"STEP_DW"` abbreviation, matching callers that spell
/// the control-transport name out in full. This bridging is scoped to
/// `STEP DW` alone so it doesn't also fold e.g. `"Volume DOWN"` into some
/// nonexistent `"Volume DW"`.
pub fn beo4_command_code(name: &str) -> Option<u8> {
    let upper = name.to_uppercase().replace('_', " ");
    if upper == "DOORCAM" {
        return Some(0x0D);
    }
    if upper == "STEP DOWN" {
        return Some(0x1F);
    }
    for code in 0u16..=255u16 {
        let code = code as u8;
        if beo4_command(code).to_uppercase().replace('_', " ") == upper {
            return Some(code);
        }
    }
    None
}

code_table!(mlgw_payload_type, mlgw_payload_type_code, {
    0x01 => "Beo4 Command",
    0x02 => "Source Status",
    0x03 => "Pict&Snd Status",
    0x04 => "Light and Control command",
    0x05 => "All standby notification",
    0x06 => "BeoRemote One control command",
    0x07 => "BeoRemote One source selection",
    0x20 => "MLGW virtual button event",
    0x30 => "Login request",
    0x31 => "Login status",
    0x32 => "Change password request",
    0x33 => "Change password response",
    0x34 => "Secure login request",
    0x36 => "Ping",
    0x37 => "Pong",
    0x38 => "Configuration change notification",
    0x39 => "Request Serial Number",
    0x3A => "Serial Number",
    0x40 => "Location based event",
});

code_table!(mlgw_virtual_action, mlgw_virtual_action_code, {
    0x01 => "PRESS",
    0x02 => "HOLD",
    0x03 => "RELEASE",
});

code_table!(mlgw_sound_status, mlgw_sound_status_code, {
    0x00 => "Not muted",
    0x01 => "Muted",
});

code_table!(mlgw_speaker_mode, mlgw_speaker_mode_code, {
    0x01 => "Center channel",
    0x02 => "2ch stereo",
    0x03 => "Front surround",
    0x04 => "4ch stereo",
    0x05 => "Full surround",
    0xFD => "<all>",
});

code_table!(mlgw_screen_mute, mlgw_screen_mute_code, {
    0x00 => "not muted",
    0x01 => "muted",
});

code_table!(mlgw_screen_active, mlgw_screen_active_code, {
    0x00 => "not active",
    0x01 => "active",
});

code_table!(mlgw_cinema_mode, mlgw_cinema_mode_code, {
    0x00 => "Cinemamode=off",
    0x01 => "Cinemamode=on",
});

code_table!(mlgw_stereo_indicator, mlgw_stereo_indicator_code, {
    0x00 => "Mono",
    0x01 => "Stereo",
});

code_table!(mlgw_lc_type, mlgw_lc_type_code, {
    0x01 => "LIGHT",
    0x02 => "CONTROL",
});

code_table!(mlgw_login_status, mlgw_login_status_code, {
    0x00 => "OK",
    0x01 => "FAIL",
});

/// `decode_device()` in the original source: resolves MLGW/ML device codes
/// that are not plain product addresses.
code_table!(device_code, device_code_code, {
    0xC0 => "VIDEO_MASTER",
    0xC1 => "AUDIO_MASTER",
    0xC2 => "SOURCE_CENTER",
    0x80 => "ALL",
    0x81 => "ALL_AUDIO_LINK_DEVICES",
    0x82 => "ALL_VIDEO_LINK_DEVICES",
    0x83 => "ALL_LINK_DEVICES",
    0xF0 => "MLGW",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_sentinel() {
        assert_eq!(unknown(0x7B), "UNKNOWN (type=0x7B)");
        assert_eq!(ml_command_type(0x99), "UNKNOWN (type=0x99)");
    }

    #[test]
    fn codec_round_trip_ml_selected_source() {
        for code in [0x00u8, 0x0B, 0x6F, 0x8D, 0xA1, 0xFE] {
            let name = ml_selected_source(code);
            assert_eq!(ml_selected_source_code(&name), Some(code));
        }
    }

    #[test]
    fn codec_round_trip_mlgw_payload_type() {
        for code in [0x01u8, 0x20, 0x36, 0x3A] {
            let name = mlgw_payload_type(code);
            assert_eq!(mlgw_payload_type_code(&name), Some(code));
        }
    }

    #[test]
    fn beo4_mute_wins_forward_lookup() {
        assert_eq!(beo4_command(0x0D), "Mute");
        assert_eq!(beo4_command_code("Mute"), Some(0x0D));
        assert_eq!(beo4_command_code("Doorcam"), Some(0x0D));
    }

    #[test]
    fn beo4_command_code_tolerates_space_for_underscore() {
        assert_eq!(beo4_command_code("STEP UP"), Some(0x1E));
        assert_eq!(beo4_command_code("STEP DOWN"), Some(0x1F));
        assert_eq!(beo4_command_code("STEP_UP"), Some(0x1E));
        assert_eq!(beo4_command_code("STEP_DW"), Some(0x1F));
        assert_eq!(beo4_command_code("STEP DW"), Some(0x1F));
    }

    #[test]
    fn device_code_round_trip() {
        for code in [0xC0u8, 0xC1, 0xC2, 0xF0] {
            let name = device_code(code);
            assert_eq!(device_code_code(&name), Some(code));
        }
    }
}
