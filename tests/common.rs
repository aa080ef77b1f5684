//! Test harness: a room on a hand-driven clock, with a recording router.
#![allow(dead_code)]

use meshroom::cli::AdminCli;
use meshroom::clock::ManualClock;
use meshroom::config::Config;
use meshroom::identity::{Identity, LocalIdentity};
use meshroom::mesh::{Dispatch, InboundPacket, Outbox, OutboundPacket, PayloadType, SentPacket};
use meshroom::room::clients::{ClientHandle, ClientSession};
use meshroom::room::codec::{encode_text, LoginRequest, LoginResponse, Request, TextType};
use meshroom::room::RoomServer;

pub const EPOCH: u32 = 1_700_000_000;
pub const ADMIN_PASSWORD: &str = "password";
pub const GUEST_PASSWORD: &str = "hello";

pub fn config() -> Config {
    let mut cfg = Config::default();
    cfg.room.name = "Test Room".into();
    cfg.room.admin_password = ADMIN_PASSWORD.into();
    cfg.room.guest_password = GUEST_PASSWORD.into();
    cfg.room.advert_interval = 0;
    cfg
}

pub fn client(seed: u8) -> Identity {
    LocalIdentity::from_seed(&[seed; 32]).identity()
}

pub struct Harness {
    pub room: RoomServer,
    pub clock: ManualClock,
    pub outbox: Outbox,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = ManualClock::new(EPOCH);
        let room = RoomServer::new(
            config,
            LocalIdentity::from_seed(&[0xEE; 32]),
            Box::new(clock.clone()),
            Box::new(AdminCli::new()),
        );
        Self {
            room,
            clock,
            outbox: Outbox::new(),
        }
    }

    /// Login request arriving by flood with an empty path.
    pub fn login(&mut self, who: &Identity, ts: u32, since: u32, password: &str) {
        let data = LoginRequest {
            timestamp: ts,
            sync_since: since,
            password: password.as_bytes().to_vec(),
        }
        .encode();
        self.room.on_anonymous_request(
            &mut self.outbox,
            &InboundPacket::flood(&[]),
            PayloadType::AnonReq,
            who,
            &data,
        );
    }

    pub fn handle(&self, who: &Identity) -> ClientHandle {
        self.room.clients().find(who).expect("client is known")
    }

    pub fn session(&self, who: &Identity) -> &ClientSession {
        self.room
            .clients()
            .get(self.handle(who))
            .expect("session is live")
    }

    pub fn text(&mut self, who: &Identity, ts: u32, text_type: TextType, text: &str) {
        self.text_bytes(who, ts, text_type, text.as_bytes());
    }

    pub fn text_bytes(&mut self, who: &Identity, ts: u32, text_type: TextType, text: &[u8]) {
        let data = encode_text(ts, text_type, 0, text);
        let handle = self.handle(who);
        self.room.on_peer_data(
            &mut self.outbox,
            &InboundPacket::direct(),
            handle,
            PayloadType::TxtMsg,
            &data,
        );
    }

    pub fn post(&mut self, who: &Identity, ts: u32, text: &str) {
        self.text(who, ts, TextType::Plain, text);
    }

    pub fn command(&mut self, who: &Identity, ts: u32, text: &str) {
        self.text(who, ts, TextType::CliData, text);
    }

    pub fn keep_alive(&mut self, who: &Identity, ts: u32, force_since: u32, direct: bool) {
        let data = Request {
            timestamp: ts,
            req_type: 0x02,
            force_since,
        }
        .encode();
        let handle = self.handle(who);
        let packet = if direct {
            InboundPacket::direct()
        } else {
            InboundPacket::flood(&[])
        };
        self.room
            .on_peer_data(&mut self.outbox, &packet, handle, PayloadType::Req, &data);
    }

    pub fn set_path(&mut self, who: &Identity, path: &[u8]) {
        let handle = self.handle(who);
        self.room.on_peer_path(handle, path, PayloadType::Response, &[]);
    }

    /// Advance by `millis` and run one loop pass.
    pub fn step(&mut self, millis: u64) {
        self.clock.advance(millis);
        self.room.poll(&mut self.outbox);
    }

    /// Run `n` push-sync ticks at the configured interval.
    pub fn ticks(&mut self, n: usize) {
        let interval = self.room.config().sync.push_interval_ms;
        for _ in 0..n {
            self.step(interval);
        }
    }

    pub fn drain(&mut self) -> Vec<SentPacket> {
        self.outbox.drain()
    }
}

/// Pushed posts in `sent`: (recipient, payload, dispatch).
pub fn pushes(sent: &[SentPacket]) -> Vec<(Identity, Vec<u8>, Dispatch)> {
    sent.iter()
        .filter_map(|s| match &s.packet {
            OutboundPacket::Datagram {
                payload_type: PayloadType::TxtMsg,
                recipient,
                data,
                ..
            } if data.get(4) == Some(&(2 << 2)) => {
                Some((*recipient, data.clone(), s.dispatch.clone()))
            }
            _ => None,
        })
        .collect()
}

pub fn acks(sent: &[SentPacket]) -> Vec<(meshroom::room::codec::AckTag, Dispatch)> {
    sent.iter()
        .filter_map(|s| match &s.packet {
            OutboundPacket::Ack { tag } => Some((*tag, s.dispatch.clone())),
            _ => None,
        })
        .collect()
}

/// Text replies (command output) in `sent`: (recipient, payload, dispatch).
pub fn replies(sent: &[SentPacket]) -> Vec<(Identity, Vec<u8>, Dispatch)> {
    sent.iter()
        .filter_map(|s| match &s.packet {
            OutboundPacket::Datagram {
                payload_type: PayloadType::TxtMsg,
                recipient,
                data,
                ..
            } if data.get(4) == Some(&(1 << 2)) => {
                Some((*recipient, data.clone(), s.dispatch.clone()))
            }
            _ => None,
        })
        .collect()
}

/// Decoded login response carried by a path return or a response datagram.
pub fn login_responses(sent: &[SentPacket]) -> Vec<(Identity, LoginResponse)> {
    sent.iter()
        .filter_map(|s| match &s.packet {
            OutboundPacket::PathReturn {
                recipient,
                extra_type: PayloadType::Response,
                extra,
                ..
            } => Some((*recipient, LoginResponse::decode(extra).ok()?)),
            OutboundPacket::Datagram {
                payload_type: PayloadType::Response,
                recipient,
                data,
                ..
            } => Some((*recipient, LoginResponse::decode(data).ok()?)),
            _ => None,
        })
        .collect()
}
