//! Process-wide counters for the room engine.
//!
//! Cheap relaxed atomics; read with [`snapshot`] for status output. Counters only
//! ever increase, so tests compare deltas rather than absolute values.
use std::sync::atomic::{AtomicU64, Ordering};

static LOGINS_OK: AtomicU64 = AtomicU64::new(0);
static LOGINS_REJECTED: AtomicU64 = AtomicU64::new(0);
static REPLAYS_REJECTED: AtomicU64 = AtomicU64::new(0);
static POSTS_STORED: AtomicU64 = AtomicU64::new(0);
static PUSHES_SENT: AtomicU64 = AtomicU64::new(0);
static PUSHES_ACKED: AtomicU64 = AtomicU64::new(0);
static PUSH_TIMEOUTS: AtomicU64 = AtomicU64::new(0);
static CLIENTS_EVICTED: AtomicU64 = AtomicU64::new(0);
static MALFORMED_PAYLOADS: AtomicU64 = AtomicU64::new(0);

pub fn inc_login_ok() {
    LOGINS_OK.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_login_rejected() {
    LOGINS_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_replay_rejected() {
    REPLAYS_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_post_stored() {
    POSTS_STORED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_push_sent() {
    PUSHES_SENT.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_push_acked() {
    PUSHES_ACKED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_push_timeout() {
    PUSH_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_client_evicted() {
    CLIENTS_EVICTED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_malformed() {
    MALFORMED_PAYLOADS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub logins_ok: u64,
    pub logins_rejected: u64,
    pub replays_rejected: u64,
    pub posts_stored: u64,
    pub pushes_sent: u64,
    pub pushes_acked: u64,
    pub push_timeouts: u64,
    pub clients_evicted: u64,
    pub malformed_payloads: u64,
}

impl Snapshot {
    /// Share of pushes that were acknowledged, as a percentage.
    pub fn ack_rate_percent(&self) -> Option<u64> {
        if self.pushes_sent == 0 {
            None
        } else {
            Some(self.pushes_acked * 100 / self.pushes_sent)
        }
    }
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        logins_ok: LOGINS_OK.load(Ordering::Relaxed),
        logins_rejected: LOGINS_REJECTED.load(Ordering::Relaxed),
        replays_rejected: REPLAYS_REJECTED.load(Ordering::Relaxed),
        posts_stored: POSTS_STORED.load(Ordering::Relaxed),
        pushes_sent: PUSHES_SENT.load(Ordering::Relaxed),
        pushes_acked: PUSHES_ACKED.load(Ordering::Relaxed),
        push_timeouts: PUSH_TIMEOUTS.load(Ordering::Relaxed),
        clients_evicted: CLIENTS_EVICTED.load(Ordering::Relaxed),
        malformed_payloads: MALFORMED_PAYLOADS.load(Ordering::Relaxed),
    }
}
