//! Fixed payload layouts exchanged with room clients.
//!
//! Every payload starts with a 4-byte timestamp. All integers are little-endian, as
//! written by the radio firmware the clients run. Text fields end at the first NUL
//! byte or at the end of the payload, because decrypted payloads carry zero
//! padding up to the cipher block size.
//!
//! | Payload | Layout |
//! | --- | --- |
//! | login request | `[ts:4][sync_since:4][password\0]` |
//! | login response | `[ts:4][status:1][keep_alive/16:1][is_admin:1][0:1]["OK"]` |
//! | text | `[ts:4][type<<2 \| attempt:1][text\0]` |
//! | pushed post | `[post_ts:4][SIGNED_PLAIN<<2:1][author:4][text]` |
//! | request | `[ts:4][req_type:1][force_since:4]?` |
//!
//! Acknowledgement tags are the first four bytes of `SHA-256(message ‖ public key)`.
use std::fmt;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::identity::{Identity, AUTHOR_PREFIX_SIZE};
use crate::mesh::MAX_PACKET_PAYLOAD;

pub const REQ_TYPE_GET_STATUS: u8 = 0x01;
pub const REQ_TYPE_KEEP_ALIVE: u8 = 0x02;

pub const RESP_SERVER_LOGIN_OK: u8 = 0;

/// Longest text a client message or command reply may carry.
pub const MAX_TEXT_LEN: usize = 160;
/// Longest stored post, leaving room for the pushed-post header.
pub const MAX_POST_TEXT_LEN: usize = MAX_TEXT_LEN - 9;

pub const LOGIN_RESPONSE_LEN: usize = 10;

const TEXT_HEADER_LEN: usize = 5;
const KEEP_ALIVE_SIGNED_LEN: usize = 9;

/// Upper six bits of a text payload's flags byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    Plain = 0,
    CliData = 1,
    SignedPlain = 2,
}

impl TextType {
    pub fn from_flags(flags: u8) -> Option<Self> {
        match flags >> 2 {
            0 => Some(TextType::Plain),
            1 => Some(TextType::CliData),
            2 => Some(TextType::SignedPlain),
            _ => None,
        }
    }

    pub fn flags(self, attempt: u8) -> u8 {
        ((self as u8) << 2) | (attempt & 0x03)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{kind} payload too short: {len} bytes, need {min}")]
    TooShort {
        kind: &'static str,
        len: usize,
        min: usize,
    },

    #[error("{kind} payload too long: {len} bytes, max {max}")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    #[error("unsupported text type {0}")]
    UnsupportedTextType(u8),
}

fn check_len(kind: &'static str, data: &[u8], min: usize) -> Result<(), PayloadError> {
    if data.len() < min {
        return Err(PayloadError::TooShort {
            kind,
            len: data.len(),
            min,
        });
    }
    if data.len() > MAX_PACKET_PAYLOAD {
        return Err(PayloadError::TooLong {
            kind,
            len: data.len(),
            max: MAX_PACKET_PAYLOAD,
        });
    }
    Ok(())
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn until_nul(data: &[u8]) -> &[u8] {
    match data.iter().position(|&b| b == 0) {
        Some(end) => &data[..end],
        None => data,
    }
}

/// Truncated digest proving receipt of one specific payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckTag([u8; 4]);

impl AckTag {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.get(..4).map(|b| Self([b[0], b[1], b[2], b[3]]))
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Debug for AckTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AckTag({})", hex::encode(self.0))
    }
}

impl fmt::Display for AckTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// `SHA-256(message ‖ key)` truncated to four bytes.
pub fn ack_digest(message: &[u8], key: &Identity) -> AckTag {
    let mut sha = Sha256::new();
    sha.update(message);
    sha.update(key.pub_key());
    let digest = sha.finalize();
    AckTag([digest[0], digest[1], digest[2], digest[3]])
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub timestamp: u32,
    pub sync_since: u32,
    pub password: Vec<u8>,
}

impl LoginRequest {
    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        check_len("login", data, 8)?;
        Ok(Self {
            timestamp: read_u32(data, 0),
            sync_since: read_u32(data, 4),
            password: until_nul(&data[8..]).to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9 + self.password.len());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.extend_from_slice(&self.sync_since.to_le_bytes());
        out.extend_from_slice(&self.password);
        out.push(0);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub timestamp: u32,
    pub status: u8,
    /// Recommended keep-alive interval in 16-second units.
    pub keep_alive_units: u8,
    pub is_admin: bool,
}

impl LoginResponse {
    pub fn ok(timestamp: u32, keep_alive_secs: u32, is_admin: bool) -> Self {
        Self {
            timestamp,
            status: RESP_SERVER_LOGIN_OK,
            keep_alive_units: (keep_alive_secs >> 4).min(u8::MAX as u32) as u8,
            is_admin,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(LOGIN_RESPONSE_LEN);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.status);
        out.push(self.keep_alive_units);
        out.push(u8::from(self.is_admin));
        out.push(0); // reserved
        out.extend_from_slice(b"OK");
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        check_len("login response", data, 8)?;
        Ok(Self {
            timestamp: read_u32(data, 0),
            status: data[4],
            keep_alive_units: data[5],
            is_admin: data[6] != 0,
        })
    }
}

/// A decoded text payload (post or command) borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextMessage<'a> {
    pub timestamp: u32,
    pub text_type: TextType,
    pub attempt: u8,
    pub text: &'a [u8],
    /// Header plus text, without padding: the bytes the sender's ack covers.
    pub signed: &'a [u8],
}

impl<'a> TextMessage<'a> {
    pub fn decode(data: &'a [u8]) -> Result<Self, PayloadError> {
        check_len("text", data, TEXT_HEADER_LEN + 1)?;
        let flags = data[4];
        let text_type =
            TextType::from_flags(flags).ok_or(PayloadError::UnsupportedTextType(flags >> 2))?;
        let text = until_nul(&data[TEXT_HEADER_LEN..]);
        Ok(Self {
            timestamp: read_u32(data, 0),
            text_type,
            attempt: flags & 0x03,
            text,
            signed: &data[..TEXT_HEADER_LEN + text.len()],
        })
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(self.text).into_owned()
    }

    pub fn ack_tag(&self, sender: &Identity) -> AckTag {
        ack_digest(self.signed, sender)
    }
}

/// Encode a text payload. `text` is cut to [`MAX_TEXT_LEN`] bytes.
pub fn encode_text(timestamp: u32, text_type: TextType, attempt: u8, text: &[u8]) -> Vec<u8> {
    let text = &text[..text.len().min(MAX_TEXT_LEN)];
    let mut out = Vec::with_capacity(TEXT_HEADER_LEN + text.len());
    out.extend_from_slice(&timestamp.to_le_bytes());
    out.push(text_type.flags(attempt));
    out.extend_from_slice(text);
    out
}

/// Encode a stored post for delivery to another client.
pub fn encode_pushed_post(
    post_timestamp: u32,
    author_prefix: &[u8; AUTHOR_PREFIX_SIZE],
    text: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(TEXT_HEADER_LEN + AUTHOR_PREFIX_SIZE + text.len());
    out.extend_from_slice(&post_timestamp.to_le_bytes());
    out.push(TextType::SignedPlain.flags(0));
    out.extend_from_slice(author_prefix);
    out.extend_from_slice(text);
    out
}

/// A decoded request payload (keep-alive or status).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub timestamp: u32,
    pub req_type: u8,
    /// Newest post timestamp the client holds; zero when absent (or decrypted padding).
    pub force_since: u32,
}

impl Request {
    pub fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        check_len("request", data, TEXT_HEADER_LEN)?;
        let force_since = if data.len() >= KEEP_ALIVE_SIGNED_LEN {
            read_u32(data, 5)
        } else {
            0
        };
        Ok(Self {
            timestamp: read_u32(data, 0),
            req_type: data[4],
            force_since,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(KEEP_ALIVE_SIGNED_LEN);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.req_type);
        out.extend_from_slice(&self.force_since.to_le_bytes());
        out
    }

    /// Ack over the nine request bytes, with a missing `force_since` counted as zeroes.
    pub fn ack_tag(&self, sender: &Identity) -> AckTag {
        ack_digest(&self.encode(), sender)
    }
}
