//! # Mesh Routing Boundary
//!
//! The room engine does not route, encrypt or frame packets. It hands fully described
//! [`OutboundPacket`]s to a [`MeshRouter`] implementation, which owns packet buffers,
//! encryption with the per-peer secret, path handling and the radio.
//!
//! In the other direction the routing layer calls the engine's inbound entry points
//! (`on_anonymous_request`, `on_peer_data`, `on_peer_path`, `on_ack`) with already
//! decrypted payloads and an [`InboundPacket`] describing how the packet arrived.
//!
//! ## Delivery modes
//!
//! - **Flood**: every node re-broadcasts; the packet accumulates a path on the way.
//! - **Direct**: the packet follows a previously learned hop path.
//! - **Zero hop**: a single local broadcast, never forwarded (periodic adverts).
//!
//! [`Outbox`] is a recording router. The binary uses it when no radio link is
//! attached, and tests use it to inspect what the engine sent.

pub mod advert;

use std::fmt;

use thiserror::Error;

use crate::identity::{Identity, SharedSecret};
use crate::room::codec::AckTag;

/// Longest hop path a direct packet can carry.
pub const MAX_PATH_SIZE: usize = 64;
/// Largest plaintext payload that fits one packet.
pub const MAX_PACKET_PAYLOAD: usize = 184;

/// Payload type field of a mesh packet header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    Req = 0x00,
    Response = 0x01,
    TxtMsg = 0x02,
    Ack = 0x03,
    Advert = 0x04,
    GrpTxt = 0x05,
    GrpData = 0x06,
    AnonReq = 0x07,
    Path = 0x08,
}

impl PayloadType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0x00 => PayloadType::Req,
            0x01 => PayloadType::Response,
            0x02 => PayloadType::TxtMsg,
            0x03 => PayloadType::Ack,
            0x04 => PayloadType::Advert,
            0x05 => PayloadType::GrpTxt,
            0x06 => PayloadType::GrpData,
            0x07 => PayloadType::AnonReq,
            0x08 => PayloadType::Path,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PayloadType::Req => "REQ",
            PayloadType::Response => "RESPONSE",
            PayloadType::TxtMsg => "TXT_MSG",
            PayloadType::Ack => "ACK",
            PayloadType::Advert => "ADVERT",
            PayloadType::GrpTxt => "GRP_TXT",
            PayloadType::GrpData => "GRP_DATA",
            PayloadType::AnonReq => "ANON_REQ",
            PayloadType::Path => "PATH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteType {
    Flood,
    Direct,
}

/// How a received packet reached us.
#[derive(Debug, Clone, Copy)]
pub struct InboundPacket<'a> {
    pub route: RouteType,
    /// Hops accumulated so far (flood) or remaining (direct).
    pub path: &'a [u8],
}

impl<'a> InboundPacket<'a> {
    pub fn flood(path: &'a [u8]) -> Self {
        Self {
            route: RouteType::Flood,
            path,
        }
    }

    pub fn direct() -> Self {
        Self {
            route: RouteType::Direct,
            path: &[],
        }
    }

    pub fn is_flood(&self) -> bool {
        self.route == RouteType::Flood
    }

    pub fn is_direct(&self) -> bool {
        self.route == RouteType::Direct
    }
}

/// A packet the routing layer should build, encrypt and transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPacket {
    /// Encrypted peer-to-peer payload.
    Datagram {
        payload_type: PayloadType,
        recipient: Identity,
        secret: SharedSecret,
        data: Vec<u8>,
    },
    /// Bare acknowledgement.
    Ack { tag: AckTag },
    /// Tells `recipient` the reverse of `path`, with another payload riding along.
    PathReturn {
        recipient: Identity,
        secret: SharedSecret,
        path: Vec<u8>,
        extra_type: PayloadType,
        extra: Vec<u8>,
    },
    /// Signed self advertisement carrying the given app data.
    Advert { app_data: Vec<u8> },
}

impl OutboundPacket {
    pub fn payload_len(&self) -> usize {
        match self {
            OutboundPacket::Datagram { data, .. } => data.len(),
            OutboundPacket::Ack { .. } => 4,
            OutboundPacket::PathReturn { path, extra, .. } => path.len() + extra.len(),
            OutboundPacket::Advert { app_data } => app_data.len(),
        }
    }
}

impl fmt::Display for OutboundPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutboundPacket::Datagram {
                payload_type,
                recipient,
                data,
                ..
            } => write!(f, "{} to {} ({} bytes)", payload_type.name(), recipient, data.len()),
            OutboundPacket::Ack { tag } => write!(f, "ACK {tag}"),
            OutboundPacket::PathReturn {
                recipient,
                path,
                extra_type,
                extra,
                ..
            } => write!(
                f,
                "PATH to {} ({} hops, {} {} bytes)",
                recipient,
                path.len(),
                extra_type.name(),
                extra.len()
            ),
            OutboundPacket::Advert { app_data } => write!(f, "ADVERT ({} bytes)", app_data.len()),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("no free packet buffers")]
    PoolExhausted,

    #[error("path of {0} hops exceeds the maximum")]
    PathTooLong(usize),

    #[error("payload of {0} bytes exceeds the maximum")]
    PayloadTooLarge(usize),
}

/// Capability interface the engine needs from the routing layer.
pub trait MeshRouter {
    fn send_flood(&mut self, packet: OutboundPacket, delay_millis: u32) -> Result<(), SendError>;

    fn send_direct(
        &mut self,
        packet: OutboundPacket,
        path: &[u8],
        delay_millis: u32,
    ) -> Result<(), SendError>;

    fn send_zero_hop(&mut self, packet: OutboundPacket) -> Result<(), SendError>;
}

/// How an [`Outbox`] entry was asked to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Flood { delay_millis: u32 },
    Direct { path: Vec<u8>, delay_millis: u32 },
    ZeroHop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPacket {
    pub packet: OutboundPacket,
    pub dispatch: Dispatch,
}

/// Recording [`MeshRouter`] with an optional packet-pool limit.
#[derive(Debug, Default)]
pub struct Outbox {
    sent: Vec<SentPacket>,
    free_buffers: Option<usize>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only `buffers` more packets may be sent before sends fail with
    /// [`SendError::PoolExhausted`].
    pub fn with_pool_limit(buffers: usize) -> Self {
        Self {
            sent: Vec::new(),
            free_buffers: Some(buffers),
        }
    }

    pub fn set_pool_limit(&mut self, buffers: Option<usize>) {
        self.free_buffers = buffers;
    }

    pub fn sent(&self) -> &[SentPacket] {
        &self.sent
    }

    pub fn drain(&mut self) -> Vec<SentPacket> {
        std::mem::take(&mut self.sent)
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }

    fn record(&mut self, packet: OutboundPacket, dispatch: Dispatch) -> Result<(), SendError> {
        if packet.payload_len() > MAX_PACKET_PAYLOAD {
            return Err(SendError::PayloadTooLarge(packet.payload_len()));
        }
        if let Some(free) = self.free_buffers.as_mut() {
            if *free == 0 {
                return Err(SendError::PoolExhausted);
            }
            *free -= 1;
        }
        self.sent.push(SentPacket { packet, dispatch });
        Ok(())
    }
}

impl MeshRouter for Outbox {
    fn send_flood(&mut self, packet: OutboundPacket, delay_millis: u32) -> Result<(), SendError> {
        self.record(packet, Dispatch::Flood { delay_millis })
    }

    fn send_direct(
        &mut self,
        packet: OutboundPacket,
        path: &[u8],
        delay_millis: u32,
    ) -> Result<(), SendError> {
        if path.len() > MAX_PATH_SIZE {
            return Err(SendError::PathTooLong(path.len()));
        }
        self.record(
            packet,
            Dispatch::Direct {
                path: path.to_vec(),
                delay_millis,
            },
        )
    }

    fn send_zero_hop(&mut self, packet: OutboundPacket) -> Result<(), SendError> {
        self.record(packet, Dispatch::ZeroHop)
    }
}
