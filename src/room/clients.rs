//! Fixed-capacity table of authenticated client sessions.
//!
//! Slots are allocated up front and never removed. A slot is appended while the table
//! has room; after that, a new identity takes over the slot with the smallest
//! `last_activity`. Evicted slots keep their place with `last_activity == 0`, so they
//! are the first to be recycled.
//!
//! Callers hold [`ClientHandle`]s. A handle names a slot and the generation of the
//! session living in it, so a handle taken before an eviction no longer resolves
//! once the slot has been given to someone else.
use log::debug;

use crate::identity::{Identity, IdentityError, LocalIdentity, SharedSecret};
use crate::room::codec::AckTag;

/// Reference to one session in a [`ClientTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientHandle {
    index: usize,
    generation: u32,
}

impl ClientHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Per-client session state.
#[derive(Debug, Clone, Default)]
pub struct ClientSession {
    /// `None` once the slot has been evicted.
    pub identity: Option<Identity>,
    pub secret: Option<SharedSecret>,
    /// Newest sender timestamp accepted from this client (replay guard).
    pub last_timestamp: u32,
    /// Room clock seconds of the last login, post or keep-alive. Zero = never active.
    pub last_activity: u32,
    /// Newest post timestamp this client is known to hold.
    pub sync_since: u32,
    pub pending_ack: Option<AckTag>,
    /// Timestamp of the post awaiting `pending_ack`.
    pub push_post_timestamp: u32,
    /// Millisecond deadline for `pending_ack`.
    pub ack_deadline: u64,
    pub push_failures: u8,
    pub is_admin: bool,
    /// Return path for direct sends. `None` means flood.
    pub out_path: Option<Vec<u8>>,
    generation: u32,
}

impl ClientSession {
    pub fn is_active(&self) -> bool {
        self.identity.is_some() && self.last_activity != 0
    }

    pub fn has_direct_path(&self) -> bool {
        self.out_path.is_some()
    }

    /// Drop the outstanding push, if any. The deadline goes with it.
    pub fn clear_pending_ack(&mut self) {
        self.pending_ack = None;
        self.ack_deadline = 0;
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
pub struct ClientTable {
    slots: Vec<ClientSession>,
    capacity: usize,
}

impl ClientTable {
    /// A table with room for `capacity` sessions, at least one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots in use, evicted ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Sessions that currently hold an identity.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.identity.is_some()).count()
    }

    pub fn find(&self, identity: &Identity) -> Option<ClientHandle> {
        self.slots.iter().enumerate().find_map(|(index, s)| {
            s.identity
                .filter(|id| id.matches(identity))
                .map(|_| ClientHandle {
                    index,
                    generation: s.generation,
                })
        })
    }

    /// Return the session for `identity`, creating it when unknown.
    ///
    /// A new session gets a freshly derived shared secret. When the table is full the
    /// session with the smallest `last_activity` is taken over (the first one wins a
    /// tie). The secret is derived before anything is evicted, so a bad public key
    /// leaves the table untouched.
    pub fn find_or_create(
        &mut self,
        identity: &Identity,
        local: &LocalIdentity,
    ) -> Result<ClientHandle, IdentityError> {
        if let Some(handle) = self.find(identity) {
            return Ok(handle);
        }
        let secret = local.shared_secret(identity)?;

        let index = if !self.is_full() {
            self.slots.push(ClientSession::default());
            self.slots.len() - 1
        } else {
            let index = self.least_active().unwrap_or(0);
            debug!(
                "client table full, recycling slot {} (last_activity {})",
                index, self.slots[index].last_activity
            );
            index
        };

        let slot = &mut self.slots[index];
        let generation = slot.generation.wrapping_add(1);
        *slot = ClientSession {
            identity: Some(*identity),
            secret: Some(secret),
            generation,
            ..ClientSession::default()
        };
        Ok(ClientHandle { index, generation })
    }

    /// Index of the slot with the globally smallest `last_activity`.
    pub fn least_active(&self) -> Option<usize> {
        let mut best: Option<(usize, u32)> = None;
        for (i, s) in self.slots.iter().enumerate() {
            match best {
                Some((_, activity)) if s.last_activity >= activity => {}
                _ => best = Some((i, s.last_activity)),
            }
        }
        best.map(|(i, _)| i)
    }

    /// Forget the session's identity and secret. The slot stays allocated and will be
    /// the first candidate for reuse.
    pub fn evict(&mut self, handle: ClientHandle) -> bool {
        let Some(slot) = self.get_mut(handle) else {
            return false;
        };
        slot.identity = None;
        slot.secret = None;
        slot.clear_pending_ack();
        slot.last_activity = 0;
        slot.generation = slot.generation.wrapping_add(1);
        true
    }

    pub fn get(&self, handle: ClientHandle) -> Option<&ClientSession> {
        self.slots
            .get(handle.index)
            .filter(|s| s.generation == handle.generation && s.identity.is_some())
    }

    pub fn get_mut(&mut self, handle: ClientHandle) -> Option<&mut ClientSession> {
        self.slots
            .get_mut(handle.index)
            .filter(|s| s.generation == handle.generation && s.identity.is_some())
    }

    /// Slot access by position, for the round-robin scheduler.
    pub fn slot(&self, index: usize) -> Option<&ClientSession> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut ClientSession> {
        self.slots.get_mut(index)
    }

    pub fn handle_at(&self, index: usize) -> Option<ClientHandle> {
        self.slots
            .get(index)
            .filter(|s| s.identity.is_some())
            .map(|s| ClientHandle {
                index,
                generation: s.generation,
            })
    }

    /// Sessions whose public key starts with `hash`.
    pub fn search_by_hash(&self, hash: &[u8]) -> Vec<ClientHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, s)| {
                s.identity
                    .filter(|id| id.is_hash_match(hash))
                    .map(|_| ClientHandle {
                        index,
                        generation: s.generation,
                    })
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientSession> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientSession> {
        self.slots.iter_mut()
    }
}
