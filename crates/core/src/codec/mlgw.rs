//! MLGW codec (C3): frames and parses the length-prefixed binary MLGW
//! packets on port 9000, and encodes outbound commands.

use bytes::{Buf, BytesMut};
use nom::{error::VerboseError, number::streaming::be_u8, sequence::tuple, Err as NomErr};

use crate::codec::tables;
use crate::error::Error;
use crate::model::{MlgwPayload, MlgwTelegram};

type IResult<'a, O> = Result<(&'a [u8], O), NomErr<VerboseError<&'a [u8]>>>;

/// `0x01 SOH` that must lead every MLGW frame
pub const SOH: u8 = 0x01;

struct FrameHeader {
    msg_type: u8,
    len: u8,
}

fn frame_header(buf: &[u8]) -> IResult<'_, FrameHeader> {
    let (buf, (soh, msg_type, len, reserved)) = tuple((be_u8, be_u8, be_u8, be_u8))(buf)?;
    if soh != SOH || reserved != 0x00 {
        // Caller maps this back to Error::ProtocolMalformed; nom just needs
        // any error to bubble the rejection up.
        return Err(NomErr::Failure(VerboseError { errors: vec![] }));
    }
    Ok((buf, FrameHeader { msg_type, len }))
}

/// Encode `frame(type, payload) = [0x01, type, len(payload), 0x00, payload…]`
pub fn encode_frame(msg_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + payload.len());
    out.push(SOH);
    out.push(msg_type);
    out.push(payload.len() as u8);
    out.push(0x00);
    out.extend_from_slice(payload);
    out
}

/// Try to take one complete frame off the front of `buf`. Returns `Ok(None)`
/// if more bytes are needed; advances `buf` past the frame on success.
pub fn try_decode_frame(buf: &mut BytesMut) -> Result<Option<MlgwTelegram>, Error> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let header = match frame_header(&buf[..4]) {
        Ok((_, h)) => h,
        Err(_) => {
            return Err(Error::ProtocolMalformed("bad SOH or reserved byte in MLGW frame"));
        }
    };
    let total = 4 + header.len as usize;
    if buf.len() < total {
        return Ok(None);
    }
    let frame = buf[..total].to_vec();
    buf.advance(total);

    let payload = &frame[4..total];
    let decoded = decode_payload(header.msg_type, payload)?;
    Ok(Some(MlgwTelegram {
        payload_type: header.msg_type,
        payload: decoded,
    }))
}

fn get(p: &[u8], idx: usize) -> u8 {
    p.get(idx).copied().unwrap_or(0)
}

fn hexword(hi: u8, lo: u8) -> u16 {
    ((hi as u16) << 8) | lo as u16
}

fn decode_payload(msg_type: u8, p: &[u8]) -> Result<MlgwPayload, Error> {
    let payload = match msg_type {
        0x02 => MlgwPayload::SourceStatus {
            mln: get(p, 0),
            source: get(p, 1),
            medium_position: hexword(get(p, 2), get(p, 3)),
            position: hexword(get(p, 4), get(p, 5)),
            activity: get(p, 6),
            picture_format: get(p, 7),
        },
        0x03 => MlgwPayload::PictSoundStatus {
            mln: get(p, 0),
            sound_status: get(p, 1),
            speaker_mode: get(p, 2),
            volume: get(p, 3),
            screen1_mute: get(p, 4),
            screen1_active: get(p, 5),
            screen2_mute: get(p, 6),
            screen2_active: get(p, 7),
            cinema_mode: get(p, 8),
            stereo_mode: get(p, 9),
        },
        0x04 => MlgwPayload::LightControlEvent {
            room: get(p, 0),
            kind: tables::mlgw_lc_type(get(p, 1)),
            command: get(p, 2),
        },
        0x05 => MlgwPayload::AllStandby,
        0x20 => MlgwPayload::VirtualButton {
            button: get(p, 0),
            action: if p.len() < 2 {
                "PRESS".to_string()
            } else {
                tables::mlgw_virtual_action(get(p, 1))
            },
        },
        0x31 => MlgwPayload::LoginStatus {
            ok: tables::mlgw_login_status(get(p, 0)) == "OK",
        },
        0x3A => MlgwPayload::SerialNumber {
            serial: String::from_utf8_lossy(p).trim_end_matches('\0').to_string(),
        },
        0x38 => MlgwPayload::ConfigChanged,
        other => {
            return Err(Error::ParseFailure(format!(
                "unhandled MLGW payload type 0x{other:02X}"
            )))
        }
    };
    Ok(payload)
}

/// `0x01 Beo4` encoder: `(mln,dest,cmd,sec,link)`
pub fn encode_beo4(mln: u8, dest: u8, cmd: u8, sec: u8, link: u8) -> Vec<u8> {
    encode_frame(0x01, &[mln, dest, cmd, sec, link])
}

/// `0x06 BeoRemote-One` encoder: `(mln,cmd,0x00,net_bit)`
pub fn encode_beoremoteone(mln: u8, cmd: u8, net_bit: bool) -> Vec<u8> {
    encode_frame(0x06, &[mln, cmd, 0x00, net_bit as u8])
}

/// `0x07 BeoRemote-One Select` encoder: `(mln,cmd,unit,0x00,net_bit)`
pub fn encode_beoremoteone_select(mln: u8, cmd: u8, unit: u8, net_bit: bool) -> Vec<u8> {
    encode_frame(0x07, &[mln, cmd, unit, 0x00, net_bit as u8])
}

/// `0x20 Virtual Button` encoder: `(btn,action)`
pub fn encode_virtual_button(btn: u8, action: u8) -> Vec<u8> {
    encode_frame(0x20, &[btn, action])
}

/// `0x30 Login` encoder: `username || 0x00 || password`, no terminator
pub fn encode_login(user: &str, password: &str) -> Vec<u8> {
    let mut payload = Vec::with_capacity(user.len() + 1 + password.len());
    payload.extend_from_slice(user.as_bytes());
    payload.push(0x00);
    payload.extend_from_slice(password.as_bytes());
    encode_frame(0x30, &payload)
}

/// `0x36 Ping` encoder
pub fn encode_ping() -> Vec<u8> {
    encode_frame(0x36, &[])
}

/// `0x39 Request Serial` encoder
pub fn encode_request_serial() -> Vec<u8> {
    encode_frame(0x39, &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_round_trip_s5_all_standby() {
        let mut buf = BytesMut::from(&[0x01u8, 0x05, 0x00, 0x00][..]);
        let telegram = try_decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(telegram.payload, MlgwPayload::AllStandby);
        assert!(buf.is_empty());
    }

    #[test]
    fn framing_round_trip_s6_virtual_button_default_action() {
        let mut buf = BytesMut::from(&[0x01u8, 0x20, 0x01, 0x00, 0x07][..]);
        let telegram = try_decode_frame(&mut buf).unwrap().unwrap();
        match telegram.payload {
            MlgwPayload::VirtualButton { button, action } => {
                assert_eq!(button, 7);
                assert_eq!(action, "PRESS");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn s2_login_encoding() {
        let login = encode_login("admin", "secret");
        assert_eq!(
            login,
            vec![0x01, 0x30, 0x0a, 0x00, b'a', b'd', b'm', b'i', b'n', 0x00, b's', b'e', b'c', b'r', b'e', b't']
        );
    }

    #[test]
    fn s1_ping_encoding() {
        assert_eq!(encode_ping(), vec![0x01, 0x36, 0x00, 0x00]);
    }

    #[test]
    fn incomplete_frame_returns_none() {
        let mut buf = BytesMut::from(&[0x01u8, 0x05, 0x02][..]);
        assert!(try_decode_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn bad_soh_is_malformed() {
        let mut buf = BytesMut::from(&[0x02u8, 0x05, 0x00, 0x00][..]);
        assert!(matches!(
            try_decode_frame(&mut buf),
            Err(Error::ProtocolMalformed(_))
        ));
    }

    #[test]
    fn generic_frame_round_trip_for_all_payload_lengths() {
        for len in 0u8..=255u8 {
            let payload: Vec<u8> = (0..len).collect();
            let frame = encode_frame(0x04, &payload);
            let mut buf = BytesMut::from(&frame[..]);
            // 0x04 decode only reads 3 bytes but must not panic or reject
            // regardless of payload length.
            let decoded = try_decode_frame(&mut buf);
            assert!(decoded.is_ok());
        }
    }
}
