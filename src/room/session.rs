//! Inbound entry points called by the routing layer.
//!
//! Protocol violations (bad password, replayed timestamp, malformed payload) never
//! produce a reply. The client simply times out.
use log::{debug, info, warn};

use super::codec::{
    encode_text, AckTag, LoginRequest, LoginResponse, PayloadError, Request, TextMessage,
    TextType, REQ_TYPE_GET_STATUS, REQ_TYPE_KEEP_ALIVE,
};
use super::clients::ClientHandle;
use super::{auth, sec_log, RoomServer};
use crate::identity::{Identity, SharedSecret};
use crate::logutil::{escape_log, hex_prefix};
use crate::mesh::{InboundPacket, MeshRouter, OutboundPacket, PayloadType, MAX_PATH_SIZE};
use crate::metrics;

fn log_malformed(from: &Identity, e: &PayloadError, data: &[u8]) {
    metrics::inc_malformed();
    debug!("Malformed payload from {}: {} [{}]", from, e, hex_prefix(data, 16));
}

impl RoomServer {
    /// Login request from a sender that may not be known yet.
    pub fn on_anonymous_request(
        &mut self,
        router: &mut dyn MeshRouter,
        packet: &InboundPacket<'_>,
        payload_type: PayloadType,
        sender: &Identity,
        data: &[u8],
    ) {
        if payload_type != PayloadType::AnonReq {
            debug!("Ignoring anonymous {} from {}", payload_type.name(), sender);
            return;
        }
        let req = match LoginRequest::decode(data) {
            Ok(req) => req,
            Err(e) => return log_malformed(sender, &e, data),
        };

        let Some(role) = auth::check_password(&self.config.room, &req.password) else {
            metrics::inc_login_rejected();
            sec_log!("Login rejected for {}: incorrect room password", sender.to_hex());
            return;
        };

        let was_full = self.clients.is_full() && self.clients.find(sender).is_none();
        let handle = match self.clients.find_or_create(sender, &self.local) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Login from {} dropped: {}", sender, e);
                return;
            }
        };
        if was_full {
            metrics::inc_client_evicted();
        }

        let now = self.clock.current_time();
        let Some(client) = self.clients.get_mut(handle) else {
            return;
        };
        if req.timestamp <= client.last_timestamp {
            metrics::inc_replay_rejected();
            sec_log!(
                "Possible replay: login from {} with timestamp {} (last {})",
                sender.to_hex(),
                req.timestamp,
                client.last_timestamp
            );
            return;
        }

        client.is_admin = role.is_admin();
        client.last_timestamp = req.timestamp;
        client.sync_since = req.sync_since;
        client.clear_pending_ack();
        client.push_failures = 0;
        client.last_activity = now;

        let reply_ts = self.unique.next(self.clock.current_time());
        let response =
            LoginResponse::ok(reply_ts, self.config.sync.keep_alive_secs, role.is_admin())
                .encode();
        self.next_push = self.clock.millis() + self.config.sync.push_notify_delay_ms;

        let Some(client) = self.clients.get(handle) else {
            return;
        };
        let Some(secret) = client.secret.clone() else {
            return;
        };
        let sent = if packet.is_flood() {
            // tell the client the path to us, with the response riding along
            router.send_flood(
                OutboundPacket::PathReturn {
                    recipient: *sender,
                    secret,
                    path: packet.path.to_vec(),
                    extra_type: PayloadType::Response,
                    extra: response,
                },
                0,
            )
        } else {
            let reply = OutboundPacket::Datagram {
                payload_type: PayloadType::Response,
                recipient: *sender,
                secret,
                data: response,
            };
            Self::send_to_client(router, client, reply, 0)
        };

        metrics::inc_login_ok();
        info!(
            "Login ok: {} as {} (sync since {})",
            sender,
            if role.is_admin() { "admin" } else { "guest" },
            req.sync_since
        );
        if let Err(e) = sent {
            warn!("Unable to send login response to {}: {}", sender, e);
        }
    }

    /// Sessions whose key starts with `hash`, for the routing layer to try decrypting with.
    pub fn search_peers_by_hash(&self, hash: &[u8]) -> Vec<ClientHandle> {
        self.clients.search_by_hash(hash)
    }

    /// Pre-computed secret of a session returned by [`Self::search_peers_by_hash`].
    pub fn peer_shared_secret(&self, peer: ClientHandle) -> Option<SharedSecret> {
        let secret = self.clients.get(peer).and_then(|c| c.secret.clone());
        if secret.is_none() {
            debug!("peer_shared_secret: stale peer handle {:?}", peer);
        }
        secret
    }

    /// Decrypted payload from an authenticated peer.
    pub fn on_peer_data(
        &mut self,
        router: &mut dyn MeshRouter,
        packet: &InboundPacket<'_>,
        peer: ClientHandle,
        payload_type: PayloadType,
        data: &[u8],
    ) {
        if self.clients.get(peer).is_none() {
            debug!("on_peer_data: stale peer handle {:?}", peer);
            return;
        }
        match payload_type {
            PayloadType::TxtMsg => self.on_text(router, peer, data),
            PayloadType::Req => self.on_request(router, packet, peer, data),
            other => debug!("Ignoring {} from peer", other.name()),
        }
    }

    fn on_text(&mut self, router: &mut dyn MeshRouter, peer: ClientHandle, data: &[u8]) {
        let now = self.clock.current_time();
        let Some(client) = self.clients.get_mut(peer) else {
            return;
        };
        let Some(sender) = client.identity else {
            return;
        };
        let msg = match TextMessage::decode(data) {
            Ok(msg) if msg.text_type != TextType::SignedPlain => msg,
            Ok(msg) => {
                debug!("Unsupported text type {:?} from {}", msg.text_type, sender);
                return;
            }
            Err(PayloadError::UnsupportedTextType(t)) => {
                debug!("Unsupported text type {} from {}", t, sender);
                return;
            }
            Err(e) => return log_malformed(&sender, &e, data),
        };

        if msg.timestamp < client.last_timestamp {
            metrics::inc_replay_rejected();
            sec_log!(
                "Possible replay: text from {} with timestamp {} (last {})",
                sender.to_hex(),
                msg.timestamp,
                client.last_timestamp
            );
            return;
        }
        let is_retry = msg.timestamp == client.last_timestamp;
        client.last_timestamp = msg.timestamp;
        let now = self.unique.next(now);
        client.last_activity = now;
        client.push_failures = 0;
        let is_admin = client.is_admin;

        let ack = msg.ack_tag(&sender);
        let (send_ack, reply) = match msg.text_type {
            TextType::CliData if !is_admin => {
                sec_log!("Command from non-admin {} ignored", sender.to_hex());
                (false, String::new())
            }
            TextType::CliData if is_retry => (false, String::new()),
            TextType::CliData => {
                let command = msg.text_lossy();
                info!("Command from {}: {}", sender, escape_log(&command));
                (false, self.run_command(router, msg.timestamp, &command))
            }
            _ => {
                if !is_retry {
                    self.add_post(sender, msg.text);
                } else {
                    debug!("Retry of post {} from {}", msg.timestamp, sender);
                }
                (true, String::new())
            }
        };

        let Some(client) = self.clients.get(peer) else {
            return;
        };
        let delay_millis = if send_ack {
            if let Err(e) = Self::send_to_client(router, client, OutboundPacket::Ack { tag: ack }, 0)
            {
                warn!("Unable to send ack to {}: {}", sender, e);
            }
            self.config.sync.reply_delay_ms
        } else {
            0
        };

        if reply.is_empty() {
            return;
        }
        let Some(secret) = client.secret.clone() else {
            return;
        };
        // the client's view needs the two timestamps to differ
        let reply_ts = if now == msg.timestamp { now + 1 } else { now };
        let packet = OutboundPacket::Datagram {
            payload_type: PayloadType::TxtMsg,
            recipient: sender,
            secret,
            data: encode_text(reply_ts, TextType::CliData, 0, reply.as_bytes()),
        };
        if let Err(e) = Self::send_to_client(router, client, packet, delay_millis) {
            warn!("Unable to send command reply to {}: {}", sender, e);
        }
    }

    fn on_request(
        &mut self,
        router: &mut dyn MeshRouter,
        packet: &InboundPacket<'_>,
        peer: ClientHandle,
        data: &[u8],
    ) {
        let now = self.clock.current_time();
        let Some(client) = self.clients.get_mut(peer) else {
            return;
        };
        let Some(sender) = client.identity else {
            return;
        };
        let req = match Request::decode(data) {
            Ok(req) => req,
            Err(e) => return log_malformed(&sender, &e, data),
        };

        match req.req_type {
            REQ_TYPE_KEEP_ALIVE if packet.is_direct() => {
                // force_since may be zero decrypted padding, so zero means "not given"
                if req.force_since > 0 {
                    client.sync_since = req.force_since;
                }
                client.last_activity = now;
                client.push_failures = 0;
                client.clear_pending_ack();
                debug!("Keep-alive from {} (force since {})", sender, req.force_since);

                // keep-alive acks only ever go direct
                if let Some(path) = client.out_path.as_deref() {
                    let ack = OutboundPacket::Ack {
                        tag: req.ack_tag(&sender),
                    };
                    if let Err(e) = router.send_direct(ack, path, 0) {
                        warn!("Unable to ack keep-alive from {}: {}", sender, e);
                    }
                }
            }
            REQ_TYPE_KEEP_ALIVE => debug!("Flooded keep-alive from {} ignored", sender),
            REQ_TYPE_GET_STATUS => debug!("Status request from {} ignored", sender),
            other => debug!("Unknown request type {} from {}", other, sender),
        }
    }

    /// A peer told us its return path, possibly with an ack riding along.
    ///
    /// Always returns false: the room never sends a reciprocal path.
    pub fn on_peer_path(
        &mut self,
        peer: ClientHandle,
        path: &[u8],
        extra_type: PayloadType,
        extra: &[u8],
    ) -> bool {
        match self.clients.get_mut(peer) {
            Some(client) if path.len() <= MAX_PATH_SIZE => {
                debug!("Path to client #{}: {} hops", peer.index(), path.len());
                client.out_path = Some(path.to_vec());
            }
            Some(_) => debug!("on_peer_path: path of {} hops too long", path.len()),
            None => debug!("on_peer_path: stale peer handle {:?}", peer),
        }

        if extra_type == PayloadType::Ack {
            if let Some(tag) = AckTag::from_slice(extra) {
                self.process_ack(tag);
            }
        }
        false
    }

    /// Bare ACK packet. Returns true when it was ours, so the router can stop
    /// retransmitting it.
    pub fn on_ack(&mut self, tag: AckTag) -> bool {
        self.process_ack(tag)
    }
}
