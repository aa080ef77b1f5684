//! # Room Server Engine
//!
//! [`RoomServer`] is the store-and-forward core of a room node. Clients log in with
//! the admin or guest password, post short texts, and receive every other client's
//! posts through a round-robin push loop that waits for each push to be acknowledged
//! before sending the next one.
//!
//! ## Driving the engine
//!
//! The engine is a plain value with no threads, locks or timers of its own. The host
//! loop owns it together with a [`MeshRouter`] and:
//!
//! 1. forwards decrypted inbound payloads to the `on_*` entry points,
//! 2. calls [`RoomServer::poll`] on every pass, which runs the push-sync tick and the
//!    advert timer when their deadlines have passed.
//!
//! ```rust,no_run
//! use meshroom::clock::SystemClock;
//! use meshroom::cli::AdminCli;
//! use meshroom::config::Config;
//! use meshroom::identity::LocalIdentity;
//! use meshroom::mesh::Outbox;
//! use meshroom::room::RoomServer;
//!
//! let mut room = RoomServer::new(
//!     Config::default(),
//!     LocalIdentity::generate(),
//!     Box::new(SystemClock::new()),
//!     Box::new(AdminCli::new()),
//! );
//! let mut router = Outbox::new();
//! room.begin(&mut router);
//! loop {
//!     room.poll(&mut router);
//!     # break;
//! }
//! ```
//!
//! ## Submodules
//!
//! - [`codec`] - payload layouts and acknowledgement tags
//! - [`clients`] - session table with least-active eviction
//! - [`posts`] - cyclic post log
//! - [`auth`] - password checks
//! - `session` - login, text, command and keep-alive handling
//! - `sync` - push-sync tick and acknowledgement processing

pub mod auth;
pub mod clients;
pub mod codec;
pub mod posts;
mod session;
mod sync;

use log::{debug, info, warn};

use crate::cli::{CommandContext, CommandEffects, CommandHandler};
use crate::clock::{has_passed, Clock, UniqueClock};
use crate::config::Config;
use crate::identity::{Identity, LocalIdentity};
use crate::logutil::escape_log;
use crate::mesh::advert::AdvertData;
use crate::mesh::{MeshRouter, OutboundPacket, SendError};
use crate::metrics;

use clients::{ClientSession, ClientTable};
use posts::PostStore;

macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}
pub(crate) use sec_log;

/// Delay before the advertisement sent by [`RoomServer::begin`].
pub const STARTUP_ADVERT_DELAY_MILLIS: u32 = 2000;

const ADVERT_INTERVAL_UNIT_MILLIS: u64 = 2 * 60 * 1000;

pub struct RoomServer {
    config: Config,
    local: LocalIdentity,
    clock: Box<dyn Clock>,
    unique: UniqueClock,
    clients: ClientTable,
    posts: PostStore,
    cli: Box<dyn CommandHandler>,
    /// Millisecond deadline of the next push-sync tick.
    next_push: u64,
    next_client_idx: usize,
    next_local_advert: Option<u64>,
    config_dirty: bool,
}

impl RoomServer {
    pub fn new(
        config: Config,
        local: LocalIdentity,
        clock: Box<dyn Clock>,
        cli: Box<dyn CommandHandler>,
    ) -> Self {
        let clients = ClientTable::new(config.room.max_clients);
        let posts = PostStore::new(config.room.max_posts);
        Self {
            config,
            local,
            clock,
            unique: UniqueClock::default(),
            clients,
            posts,
            cli,
            next_push: 0,
            next_client_idx: 0,
            next_local_advert: None,
            config_dirty: false,
        }
    }

    /// Announce the room by flood and arm the periodic local advert.
    pub fn begin(&mut self, router: &mut dyn MeshRouter) {
        info!(
            "Room '{}' starting as {}",
            escape_log(&self.config.room.name),
            self.local.identity().to_hex()
        );
        self.send_self_advertisement(router, STARTUP_ADVERT_DELAY_MILLIS);
        self.update_advert_timer();
    }

    /// One pass of the cooperative loop: push-sync tick and advert timer.
    pub fn poll(&mut self, router: &mut dyn MeshRouter) {
        self.push_sync_tick(router);

        if let Some(deadline) = self.next_local_advert {
            if has_passed(self.clock.millis(), deadline) {
                let packet = self.self_advert();
                if let Err(e) = router.send_zero_hop(packet) {
                    warn!("Unable to send local advert: {e}");
                }
                self.update_advert_timer();
            }
        }
    }

    pub fn send_self_advertisement(&mut self, router: &mut dyn MeshRouter, delay_millis: u32) {
        let packet = self.self_advert();
        match router.send_flood(packet, delay_millis) {
            Ok(()) => debug!("Advert queued (delay {} ms)", delay_millis),
            Err(e) => warn!("Unable to send advertisement: {e}"),
        }
    }

    fn self_advert(&self) -> OutboundPacket {
        let room = &self.config.room;
        OutboundPacket::Advert {
            app_data: AdvertData::room(&room.name, room.latitude, room.longitude).encode(),
        }
    }

    fn update_advert_timer(&mut self) {
        let interval = self.config.room.advert_interval as u64;
        self.next_local_advert =
            (interval > 0).then(|| self.clock.millis() + interval * ADVERT_INTERVAL_UNIT_MILLIS);
    }

    /// Run a command typed on the local console. There is no sender timestamp there.
    pub fn handle_console_command(&mut self, router: &mut dyn MeshRouter, line: &str) -> String {
        info!("Console command: {}", escape_log(line));
        self.run_command(router, 0, line)
    }

    fn run_command(
        &mut self,
        router: &mut dyn MeshRouter,
        sender_timestamp: u32,
        command: &str,
    ) -> String {
        let mut ctx = CommandContext {
            config: &mut self.config,
            clock: self.clock.as_mut(),
            identity: self.local.identity(),
            clients: &self.clients,
            posts: &self.posts,
            effects: CommandEffects::default(),
        };
        let reply = self.cli.execute(&mut ctx, sender_timestamp, command);
        let effects = ctx.effects;

        if effects.config_changed {
            self.config_dirty = true;
        }
        if effects.advert_timer_changed {
            self.update_advert_timer();
        }
        if effects.send_advert {
            self.send_self_advertisement(router, 0);
        }
        reply
    }

    /// Store a post and pull the next push-sync tick in.
    fn add_post(&mut self, author: Identity, text: &[u8]) -> u32 {
        let timestamp = self.unique.next(self.clock.current_time());
        let post = self.posts.append(author, text, timestamp);
        info!("Post from {}: {}", author, escape_log(&post.text_lossy()));
        metrics::inc_post_stored();
        self.next_push = self.clock.millis() + self.config.sync.push_notify_delay_ms;
        timestamp
    }

    /// Flood when no return path is known, direct along it otherwise.
    fn send_to_client(
        router: &mut dyn MeshRouter,
        client: &ClientSession,
        packet: OutboundPacket,
        delay_millis: u32,
    ) -> Result<(), SendError> {
        match client.out_path.as_deref() {
            Some(path) => router.send_direct(packet, path, delay_millis),
            None => router.send_flood(packet, delay_millis),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True once if a command changed the configuration since the last call.
    pub fn take_config_dirty(&mut self) -> bool {
        std::mem::take(&mut self.config_dirty)
    }

    pub fn identity(&self) -> Identity {
        self.local.identity()
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn posts(&self) -> &PostStore {
        &self.posts
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Millisecond deadline of the next push-sync tick.
    pub fn next_push_at(&self) -> u64 {
        self.next_push
    }

    pub fn next_advert_at(&self) -> Option<u64> {
        self.next_local_advert
    }
}

impl std::fmt::Debug for RoomServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomServer")
            .field("identity", &self.local.identity())
            .field("clients", &self.clients.len())
            .field("posts", &self.posts.len())
            .field("next_push", &self.next_push)
            .finish_non_exhaustive()
    }
}
