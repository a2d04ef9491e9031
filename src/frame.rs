//! WebSocket frame parsing and serialization
//!
//! RFC 6455 framing for a server endpoint:
//! - Single-shot decoding straight out of a connection's read buffer
//! - A non-consuming `peek_frame` so callers can inspect a frame before
//!   committing to it
//! - Three-tier length encoding (7-bit, 16-bit, 64-bit with a zero high word)
//!
//! Every frame is treated as a complete message. FIN is recorded but
//! fragments are never reassembled.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::mask::apply_mask;
use crate::utf8::as_str;
use crate::{MEDIUM_MESSAGE_THRESHOLD, SMALL_MESSAGE_THRESHOLD};

/// WebSocket opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Text frame
    Text,
    /// Binary frame
    Binary,
    /// Connection close
    Close,
    /// Ping
    Ping,
    /// Pong
    Pong,
    /// Continuation or reserved opcode, carrying the raw nibble
    Unknown(u8),
}

impl OpCode {
    /// Parse opcode from the low nibble of a header byte
    #[inline]
    pub fn from_u8(byte: u8) -> Self {
        match byte & 0x0F {
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => OpCode::Unknown(other),
        }
    }

    /// Wire value of this opcode
    #[inline]
    pub fn as_u8(self) -> u8 {
        match self {
            OpCode::Text => 0x1,
            OpCode::Binary => 0x2,
            OpCode::Close => 0x8,
            OpCode::Ping => 0x9,
            OpCode::Pong => 0xA,
            OpCode::Unknown(raw) => raw & 0x0F,
        }
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(self) -> bool {
        self.as_u8() >= 0x8
    }

    /// Short lowercase name, used in logs
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Text => "text",
            OpCode::Binary => "binary",
            OpCode::Close => "close",
            OpCode::Ping => "ping",
            OpCode::Pong => "pong",
            OpCode::Unknown(_) => "unknown",
        }
    }
}

/// A parsed WebSocket frame header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag
    pub fin: bool,
    /// Frame opcode
    pub opcode: OpCode,
    /// Mask flag (set on client->server frames)
    pub masked: bool,
    /// Declared payload length
    pub payload_len: u64,
    /// Masking key (if masked)
    pub mask: Option<[u8; 4]>,
}

impl FrameHeader {
    /// Parse a header from the front of `buf`
    ///
    /// Returns the header and the number of bytes it occupies, or `None`
    /// if the length extension or mask key has not fully arrived yet.
    pub fn parse(buf: &[u8]) -> Option<(FrameHeader, usize)> {
        if buf.len() < 2 {
            return None;
        }

        let b0 = buf[0];
        let b1 = buf[1];

        let fin = b0 & 0x80 != 0;
        let opcode = OpCode::from_u8(b0);
        let masked = b1 & 0x80 != 0;

        let (payload_len, mut offset) = match b1 & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return None;
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
            }
            127 => {
                if buf.len() < 10 {
                    return None;
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(raw), 10)
            }
            len => (len as u64, 2),
        };

        // Unmasked client frames are accepted and decoded from the unmasked
        // offsets rather than rejected or misread.
        let mask = if masked {
            if buf.len() < offset + 4 {
                return None;
            }
            let key = [
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ];
            offset += 4;
            Some(key)
        } else {
            None
        };

        Some((
            FrameHeader {
                fin,
                opcode,
                masked,
                payload_len,
                mask,
            },
            offset,
        ))
    }

    /// Header size this frame gets when encoded with minimal length tiers
    #[inline]
    pub fn header_size(&self) -> usize {
        encoded_header_size(self.payload_len as usize, self.masked)
    }
}

/// A complete WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header
    pub header: FrameHeader,
    /// Frame payload (already unmasked)
    pub payload: Bytes,
}

impl Frame {
    /// Create a final, unmasked frame
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        Self {
            header: FrameHeader {
                fin: true,
                opcode,
                masked: false,
                payload_len: payload.len() as u64,
                mask: None,
            },
            payload,
        }
    }

    /// Create a text frame
    #[inline]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, data)
    }

    /// Create a binary frame
    #[inline]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, data)
    }

    /// Create a ping frame
    #[inline]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Ping, data)
    }

    /// Create a pong frame
    #[inline]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Pong, data)
    }

    /// Create a close frame with a status code and reason
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(OpCode::Close, payload.freeze())
    }

    /// Frame opcode
    #[inline]
    pub fn opcode(&self) -> OpCode {
        self.header.opcode
    }

    /// Check if this is a control frame
    #[inline]
    pub fn is_control(&self) -> bool {
        self.header.opcode.is_control()
    }

    /// Get the payload as a string
    pub fn as_text(&self) -> Result<&str> {
        as_str(&self.payload).ok_or(Error::InvalidUtf8)
    }

    /// Parse close frame payload
    pub fn parse_close(&self) -> Option<CloseReason> {
        if self.header.opcode != OpCode::Close || self.payload.len() < 2 {
            return None;
        }
        let code = u16::from_be_bytes([self.payload[0], self.payload[1]]);
        let reason = String::from_utf8_lossy(&self.payload[2..]).into_owned();
        Some(CloseReason::new(code, reason))
    }

    /// Serialize as an unmasked (server) frame
    pub fn encode(&self, buf: &mut BytesMut) {
        encode_frame(buf, self.header.opcode, &self.payload, None);
    }
}

/// Close frame reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code
    pub code: u16,
    /// Optional reason string
    pub reason: String,
}

impl CloseReason {
    /// Normal closure
    pub const NORMAL: u16 = 1000;
    /// Going away (e.g., server shutdown)
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Invalid frame payload
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Message too big
    pub const TOO_BIG: u16 = 1009;

    /// Create a new close reason
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Parse one frame without consuming it
///
/// Returns the unmasked frame together with its total encoded length, or
/// `None` if `buf` does not yet hold the whole frame. Declared lengths above
/// `max_frame_size` can never complete and are reported as
/// [`Error::FrameTooLarge`].
pub fn peek_frame(buf: &[u8], max_frame_size: usize) -> Result<Option<(Frame, usize)>> {
    let Some((header, payload_offset)) = FrameHeader::parse(buf) else {
        return Ok(None);
    };
    let frame_len = checked_frame_len(&header, payload_offset, max_frame_size)?;

    if buf.len() < frame_len {
        return Ok(None);
    }

    let mut payload = BytesMut::from(&buf[payload_offset..frame_len]);
    if let Some(mask) = header.mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some((
        Frame {
            header,
            payload: payload.freeze(),
        },
        frame_len,
    )))
}

/// Decode one frame from the front of `buf`
///
/// On success exactly the frame's bytes are consumed and anything after it
/// stays in `buf` for the next call. Incomplete input leaves `buf` untouched.
pub fn decode_frame(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    let Some((header, payload_offset)) = FrameHeader::parse(buf) else {
        return Ok(None);
    };
    let frame_len = checked_frame_len(&header, payload_offset, max_frame_size)?;

    if buf.len() < frame_len {
        return Ok(None);
    }

    buf.advance(payload_offset);
    let mut payload = buf.split_to(frame_len - payload_offset);
    if let Some(mask) = header.mask {
        apply_mask(&mut payload, mask);
    }

    Ok(Some(Frame {
        header,
        payload: payload.freeze(),
    }))
}

fn checked_frame_len(
    header: &FrameHeader,
    payload_offset: usize,
    max_frame_size: usize,
) -> Result<usize> {
    if header.payload_len > max_frame_size as u64 {
        return Err(Error::FrameTooLarge);
    }
    (header.payload_len as usize)
        .checked_add(payload_offset)
        .ok_or(Error::FrameTooLarge)
}

/// Encoded header size for a payload of `payload_len` bytes
#[inline]
pub fn encoded_header_size(payload_len: usize, masked: bool) -> usize {
    let ext = if payload_len > MEDIUM_MESSAGE_THRESHOLD {
        8
    } else if payload_len > SMALL_MESSAGE_THRESHOLD {
        2
    } else {
        0
    };
    2 + ext + if masked { 4 } else { 0 }
}

/// Encode a final frame into a buffer
///
/// Server frames pass `mask = None`; a mask is only supplied when acting as
/// a client. The 64-bit length tier writes a zero high word, so payloads
/// must fit in 32 bits (callers enforce [`crate::MAX_PAYLOAD_LENGTH`]).
pub fn encode_frame(buf: &mut BytesMut, opcode: OpCode, payload: &[u8], mask: Option<[u8; 4]>) {
    let payload_len = payload.len();

    buf.reserve(encoded_header_size(payload_len, mask.is_some()) + payload_len);

    // FIN + opcode
    buf.put_u8(0x80 | opcode.as_u8());

    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };

    if payload_len <= SMALL_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | payload_len as u8);
    } else if payload_len <= MEDIUM_MESSAGE_THRESHOLD {
        buf.put_u8(mask_bit | 126);
        buf.put_u16(payload_len as u16);
    } else {
        buf.put_u8(mask_bit | 127);
        buf.put_u32(0);
        buf.put_u32(payload_len as u32);
    }

    if let Some(m) = mask {
        buf.put_slice(&m);

        let start = buf.len();
        buf.put_slice(payload);
        apply_mask(&mut buf[start..], m);
    } else {
        buf.put_slice(payload);
    }
}
