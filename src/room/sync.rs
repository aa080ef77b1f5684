//! Push-sync: deliver stored posts to clients one acknowledged push at a time.
//!
//! Each tick first expires overdue acknowledgements, then looks at exactly one
//! client (round robin) and pushes it the oldest post it has not seen. The client's
//! sync cursor only moves when the matching ACK comes back, so a lost push is simply
//! sent again on that client's next turn.
use log::{debug, warn};

use super::codec::{ack_digest, encode_pushed_post, AckTag};
use super::posts::Post;
use super::RoomServer;
use crate::clock::has_passed;
use crate::logutil::escape_log;
use crate::mesh::{MeshRouter, OutboundPacket, PayloadType};
use crate::metrics;

impl RoomServer {
    pub(super) fn push_sync_tick(&mut self, router: &mut dyn MeshRouter) {
        let now = self.clock.millis();
        if !has_passed(now, self.next_push) || self.clients.is_empty() {
            return;
        }

        for client in self.clients.iter_mut() {
            if client.pending_ack.is_some() && has_passed(now, client.ack_deadline) {
                client.push_failures = client.push_failures.saturating_add(1);
                client.clear_pending_ack();
                metrics::inc_push_timeout();
                debug!(
                    "Pending ACK timed out for {}: push_failures {}",
                    client.identity.map(|i| i.to_string()).unwrap_or_default(),
                    client.push_failures
                );
            }
        }

        let idx = self.next_client_idx % self.clients.len();
        let max_failures = self.config.sync.max_push_failures;
        let candidate = self.clients.slot(idx).and_then(|client| {
            let identity = client.identity?;
            let ready = client.pending_ack.is_none()
                && client.last_activity != 0
                && client.push_failures < max_failures;
            if !ready {
                debug!("Skipping busy (or evicted) client #{}", idx);
                return None;
            }
            self.posts
                .find_next_unsynced_for(&identity, client.sync_since)
                .cloned()
        });
        if let Some(post) = candidate {
            self.push_post(router, idx, &post);
        }

        self.next_client_idx = (idx + 1) % self.clients.len();
        self.next_push = now + self.config.sync.push_interval_ms;
    }

    /// Send `post` to the client in slot `idx` and wait for its ACK.
    fn push_post(&mut self, router: &mut dyn MeshRouter, idx: usize, post: &Post) {
        let now = self.clock.millis();
        let sync = &self.config.sync;
        let Some(client) = self.clients.slot_mut(idx) else {
            return;
        };
        let (Some(recipient), Some(secret)) = (client.identity, client.secret.clone()) else {
            return;
        };

        let payload = encode_pushed_post(
            post.timestamp,
            &post.author.author_prefix(),
            &post.text,
        );
        client.pending_ack = Some(ack_digest(&payload, &recipient));
        client.push_post_timestamp = post.timestamp;

        let packet = OutboundPacket::Datagram {
            payload_type: PayloadType::TxtMsg,
            recipient,
            secret,
            data: payload,
        };
        let sent = match client.out_path.as_deref() {
            None => router
                .send_flood(packet, 0)
                .map(|()| sync.ack_timeout_flood_ms),
            Some(path) => router
                .send_direct(packet, path, 0)
                .map(|()| sync.direct_ack_timeout(path.len())),
        };
        match sent {
            Ok(timeout) => {
                client.ack_deadline = now + timeout;
                metrics::inc_push_sent();
                debug!(
                    "Pushed post {} to {}: {}",
                    post.timestamp,
                    recipient,
                    escape_log(&post.text_lossy())
                );
            }
            Err(e) => {
                client.clear_pending_ack();
                warn!("Unable to push post to {}: {}", recipient, e);
            }
        }
    }

    /// Match `tag` against the outstanding pushes. The first client waiting for it
    /// has its cursor advanced to the pushed post.
    pub(super) fn process_ack(&mut self, tag: AckTag) -> bool {
        let Some(client) = self
            .clients
            .iter_mut()
            .find(|c| c.pending_ack == Some(tag))
        else {
            return false;
        };
        client.clear_pending_ack();
        client.push_failures = 0;
        client.sync_since = client.push_post_timestamp;
        metrics::inc_push_acked();
        debug!(
            "ACK {} from {}, synced to {}",
            tag,
            client.identity.map(|i| i.to_string()).unwrap_or_default(),
            client.sync_since
        );
        true
    }
}
