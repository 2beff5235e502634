//! ML decoder (C2): turns a raw MasterLink bus telegram into a [`MlTelegram`].
//!
//! The header is parsed with `nom`'s streaming combinators; the payload
//! fields are fixed byte offsets into the *whole*
//! telegram (not the payload alone) per the original source, so they are
//! read directly off the slice rather than threaded through further
//! combinators.

use nom::{error::VerboseError, number::streaming::be_u8, sequence::tuple, Err as NomErr};

use crate::codec::tables;
use crate::error::Error;
use crate::model::{MlPayload, MlTelegram};

type IResult<'a, O> = Result<(&'a [u8], O), NomErr<VerboseError<&'a [u8]>>>;

struct MlHeader {
    to_device: u8,
    from_device: u8,
    telegram_type: u8,
    src_dest: u8,
    orig_src: u8,
    payload_type: u8,
    payload_len: u8,
}

fn ml_header(buf: &[u8]) -> IResult<'_, MlHeader> {
    let (buf, (to_device, from_device, _reserved1, telegram_type, src_dest, orig_src, _reserved2, payload_type, payload_len)) =
        tuple((
            be_u8, be_u8, be_u8, be_u8, be_u8, be_u8, be_u8, be_u8, be_u8,
        ))(buf)?;
    Ok((
        buf,
        MlHeader {
            to_device,
            from_device,
            telegram_type,
            src_dest,
            orig_src,
            payload_type,
            payload_len,
        },
    ))
}

/// Read byte `idx` of the whole telegram, or `0` if the telegram is too
/// short. Malformed/truncated telegrams must never cause a panic (§8
/// property 3); a short read degrades gracefully to a zeroed field instead.
fn b(t: &[u8], idx: usize) -> u8 {
    t.get(idx).copied().unwrap_or(0)
}

fn hexword(hi: u8, lo: u8) -> u16 {
    ((hi as u16) << 8) | lo as u16
}

/// ASCII slice `t[start..end]`, clamped to the buffer length, lossily decoded
fn ascii_slice(t: &[u8], start: usize, end: usize) -> String {
    let end = end.min(t.len());
    if start >= end {
        return String::new();
    }
    String::from_utf8_lossy(&t[start..end]).to_string()
}

/// Decode one raw MasterLink telegram. Total length must be at least 9
/// bytes (the header); shorter input is a [`Error::ParseFailure`], never a
/// panic.
pub fn decode_ml(input: &[u8]) -> Result<MlTelegram, Error> {
    let (_, header) = ml_header(input).map_err(|_| {
        Error::ParseFailure(format!("ML telegram shorter than 9-byte header ({} bytes)", input.len()))
    })?;

    let payload_len = header.payload_len as usize;
    let t = input; // payload field offsets below are relative to the whole telegram

    let payload = match header.payload_type {
        0x87 => MlPayload::StatusInfo {
            source: tables::ml_selected_source(b(t, 10)),
            local_source: b(t, 13),
            source_medium: hexword(b(t, 18), b(t, 17)),
            channel_track: if payload_len < 27 {
                b(t, 19) as u16
            } else {
                hexword(b(t, 36), b(t, 37))
            },
            activity: b(t, 21),
            source_type: b(t, 22),
            picture_identifier: b(t, 23),
        },
        0x06 => MlPayload::DisplaySource {
            text: ascii_slice(t, 15, 15 + payload_len.saturating_sub(5)).trim_end().to_string(),
        },
        0x0B => MlPayload::ExtendedSourceInformation {
            info_type: b(t, 10),
            info_value: ascii_slice(t, 24, 24 + payload_len.saturating_sub(14)),
        },
        0x0D => MlPayload::Beo4Key {
            source: tables::ml_selected_source(b(t, 10)),
            command: tables::beo4_command(b(t, 11)),
        },
        0x82 => MlPayload::TrackInfoLong {
            source: tables::ml_selected_source(b(t, 11)),
            channel_track: b(t, 12),
            activity: b(t, 13),
        },
        0x94 => MlPayload::VideoTrackInfo {
            source: tables::ml_selected_source(b(t, 13)),
            channel_track: hexword(b(t, 11), b(t, 12)),
            activity: b(t, 14),
        },
        0x44 => match b(t, 9) {
            0x07 => MlPayload::TrackInfoChangeSource {
                prev_source: tables::ml_selected_source(b(t, 11)),
                source: tables::ml_selected_source(b(t, 22)),
            },
            0x05 => MlPayload::TrackInfoCurrentSource {
                source: tables::ml_selected_source(b(t, 11)),
            },
            _ => MlPayload::TrackInfoUndefined,
        },
        0x45 => MlPayload::GotoSource {
            source: tables::ml_selected_source(b(t, 11)),
            channel_track: b(t, 12),
        },
        0x20 => MlPayload::MlgwRemoteBeo4 {
            command: tables::beo4_command(b(t, 14)),
            dest_selector: tables::ml_dest_selector(b(t, 11)),
        },
        0x5C => MlPayload::LockManagerCommand {
            subtype: tables::ml_lock_manager_subtype(b(t, 9)),
        },
        0x08 => match b(t, 9) {
            0x01 => MlPayload::RequestDistributedSource {
                subtype: "Request",
                source: None,
            },
            0x04 => MlPayload::RequestDistributedSource {
                subtype: "No Source",
                source: None,
            },
            0x06 => MlPayload::RequestDistributedSource {
                subtype: "Source Active",
                source: Some(tables::ml_selected_source(b(t, 13))),
            },
            _ => MlPayload::RequestDistributedSource {
                subtype: "Undefined",
                source: None,
            },
        },
        0x30 => match b(t, 9) {
            0x02 => MlPayload::RequestLocalSource {
                subtype: "Request",
                source: None,
            },
            0x04 => MlPayload::RequestLocalSource {
                subtype: "No Source",
                source: None,
            },
            0x06 => MlPayload::RequestLocalSource {
                subtype: "Source Active",
                source: Some(tables::ml_selected_source(b(t, 11))),
            },
            _ => MlPayload::RequestLocalSource {
                subtype: "Undefined",
                source: None,
            },
        },
        _ => MlPayload::Other,
    };

    Ok(MlTelegram {
        to_device: tables::device_code(header.to_device),
        from_device: tables::device_code(header.from_device),
        telegram_type: tables::ml_telegram_type(header.telegram_type),
        src_dest: tables::ml_selected_source(header.src_dest),
        orig_src: tables::ml_selected_source(header.orig_src),
        payload_type: tables::ml_command_type(header.payload_type),
        payload_len,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S3 from §8: GOTO_SOURCE to=AUDIO_MASTER, from=VIDEO_MASTER, source=RADIO(0x6F), channel_track=2
    #[test]
    fn decodes_goto_source_scenario_s3() {
        let bytes = [
            0xC1, 0xC0, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x45, 0x05, 0x00, 0x00, 0x6F, 0x02, 0x00, 0x00,
        ];
        let telegram = decode_ml(&bytes).unwrap();
        assert_eq!(telegram.to_device, "AUDIO_MASTER");
        assert_eq!(telegram.from_device, "VIDEO_MASTER");
        assert_eq!(telegram.payload_type, "GOTO_SOURCE");
        match telegram.payload {
            MlPayload::GotoSource { source, channel_track } => {
                assert_eq!(source, "RADIO");
                assert_eq!(channel_track, 2);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn never_panics_on_short_input() {
        for len in 0..9 {
            let buf = vec![0u8; len];
            assert!(decode_ml(&buf).is_err());
        }
    }

    #[test]
    fn never_panics_on_truncated_payload() {
        // Claims a long payload but the buffer doesn't have it; offsets fall back to 0
        let bytes = [0xC1, 0xC0, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x87, 0xFF];
        let telegram = decode_ml(&bytes).unwrap();
        assert_eq!(telegram.payload_type, "STATUS_INFO");
    }

    #[test]
    fn unknown_payload_type_yields_other() {
        let bytes = [0xC1, 0xC0, 0x00, 0x0A, 0x00, 0x00, 0x01, 0x7B, 0x00];
        let telegram = decode_ml(&bytes).unwrap();
        assert_eq!(telegram.payload_type, "UNKNOWN (type=0x7B)");
        assert!(matches!(telegram.payload, MlPayload::Other));
    }
}
