//! RFC 6455 WebSocket framing: handshake accept-key computation and
//! frame parse/build. Only what the HMR channel needs: text, ping,
//! pong, close.

use base64::Engine;
use sha1::{Digest, Sha1};

pub const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Validate the handshake headers. `connection` and
/// `upgrade` are the raw header values (may contain multiple
/// comma-separated tokens); matching is case-insensitive and
/// token-wise.
pub fn is_valid_handshake(upgrade: Option<&str>, connection: Option<&str>, version: Option<&str>, key: Option<&str>) -> bool {
    let upgrade_ok = upgrade.map(|v| v.eq_ignore_ascii_case("websocket")).unwrap_or(false);
    let connection_ok = connection
        .map(|v| v.split(',').any(|tok| tok.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false);
    let version_ok = version.map(|v| v.trim() == "13").unwrap_or(false);
    let key_ok = key.map(|v| !v.trim().is_empty()).unwrap_or(false);
    upgrade_ok && connection_ok && version_ok && key_ok
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    fn from_raw(raw: u8) -> Option<Opcode> {
        match raw {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        }
    }

    fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

#[derive(Debug)]
pub struct Frame {
    pub fin: bool,
    pub opcode: Opcode,
    pub payload: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    Incomplete,
    InvalidOpcode,
    ReservedBitsSet,
    ControlFrameTooLarge,
    ControlFrameFragmented,
    UnmaskedClientFrame,
}

/// Parse one frame off the front of `buf`. Returns the frame and the
/// number of bytes consumed so the caller can advance its read buffer.
pub fn parse_frame(buf: &[u8]) -> Result<(Frame, usize), FrameError> {
    if buf.len() < 2 {
        return Err(FrameError::Incomplete);
    }
    let b0 = buf[0];
    let b1 = buf[1];

    if b0 & 0x70 != 0 {
        return Err(FrameError::ReservedBitsSet);
    }

    let fin = b0 & 0x80 != 0;
    let opcode = Opcode::from_raw(b0 & 0x0F).ok_or(FrameError::InvalidOpcode)?;
    let masked = b1 & 0x80 != 0;
    if !masked {
        return Err(FrameError::UnmaskedClientFrame);
    }

    let len_field = b1 & 0x7F;
    let mut idx = 2usize;
    let payload_len: u64 = if len_field == 126 {
        if buf.len() < idx + 2 {
            return Err(FrameError::Incomplete);
        }
        let v = u16::from_be_bytes([buf[idx], buf[idx + 1]]) as u64;
        idx += 2;
        v
    } else if len_field == 127 {
        if buf.len() < idx + 8 {
            return Err(FrameError::Incomplete);
        }
        let v = u64::from_be_bytes(buf[idx..idx + 8].try_into().unwrap());
        idx += 8;
        v
    } else {
        len_field as u64
    };

    if opcode.is_control() {
        if payload_len > 125 {
            return Err(FrameError::ControlFrameTooLarge);
        }
        if !fin {
            return Err(FrameError::ControlFrameFragmented);
        }
    }

    if buf.len() < idx + 4 {
        return Err(FrameError::Incomplete);
    }
    let mask = [buf[idx], buf[idx + 1], buf[idx + 2], buf[idx + 3]];
    idx += 4;

    let payload_len = payload_len as usize;
    if buf.len() < idx + payload_len {
        return Err(FrameError::Incomplete);
    }

    let mut payload = buf[idx..idx + payload_len].to_vec();
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
    idx += payload_len;

    Ok((Frame { fin, opcode, payload }, idx))
}

fn build_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    out.push(0x80 | opcode.to_raw()); // server frames are always final, unmasked

    let len = payload.len();
    if len <= 125 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

pub fn build_text(payload: &str) -> Vec<u8> {
    build_frame(Opcode::Text, payload.as_bytes())
}

pub fn build_ping() -> Vec<u8> {
    build_frame(Opcode::Ping, b"")
}

pub fn build_pong(payload: &[u8]) -> Vec<u8> {
    build_frame(Opcode::Pong, payload)
}

pub fn build_close() -> Vec<u8> {
    build_frame(Opcode::Close, b"")
}
