//! # meshroom - Store-and-Forward Room Server for LoRa Mesh Networks
//!
//! A room is a fixed node on a packet-radio mesh that mobile clients visit
//! opportunistically. Clients log in with a password, post short messages, and
//! receive everything the other clients posted while they were away. The radio link
//! is half-duplex, lossy and shared, so every delivery is acknowledged and retried.
//!
//! ## Features
//!
//! - **Sessions**: admin and guest logins with replay protection and least-active eviction
//! - **Post Log**: fixed-capacity cyclic store stamped by a strictly increasing clock
//! - **Push Sync**: round-robin delivery of unseen posts, one acknowledged push per client
//! - **Key Agreement**: per-client X25519 secrets derived from Ed25519 identities
//! - **Administration**: remote and console command interpreter, argon2-hashed admin password
//! - **Cooperative Design**: no threads or timers inside the engine, only deadline polling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshroom::cli::AdminCli;
//! use meshroom::clock::SystemClock;
//! use meshroom::config::Config;
//! use meshroom::identity::LocalIdentity;
//! use meshroom::mesh::Outbox;
//! use meshroom::room::RoomServer;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("meshroom.toml").await?;
//!     let (identity, _) = LocalIdentity::load_or_create(config.identity.key_file.as_ref())?;
//!     let mut room = RoomServer::new(
//!         config,
//!         identity,
//!         Box::new(SystemClock::new()),
//!         Box::new(AdminCli::new()),
//!     );
//!     let mut router = Outbox::new();
//!     room.begin(&mut router);
//!     room.poll(&mut router);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`room`] - The engine: sessions, post log, push sync, payload codec
//! - [`mesh`] - Boundary to the routing layer and advertisement data
//! - [`identity`] - Public identities, the room keypair, shared secrets
//! - [`clock`] - Monotonic and real-time clocks, unique timestamps
//! - [`cli`] - Admin command interpreter
//! - [`config`] - Configuration management
//! - [`metrics`] - Process-wide counters
//! - [`logutil`] - Log formatting helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Routing Layer  │ ← decrypts, calls on_* entry points
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   RoomServer    │ ← sessions, posts, push sync
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │   MeshRouter    │ ← flood / direct / zero-hop sends
//! └─────────────────┘
//! ```

pub mod cli;
pub mod clock;
pub mod config;
pub mod identity;
pub mod logutil;
pub mod mesh;
pub mod metrics;
pub mod room;
