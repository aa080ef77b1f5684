//! # Configuration Management Module
//!
//! All tunable settings of a room node live in one TOML file: the room's public
//! profile and passwords, the radio parameters handed to the PHY layer, the push-sync
//! timing, the identity key location and logging.
//!
//! ## Configuration Structure
//!
//! - [`RoomConfig`] - Name, position, passwords, advert interval, table capacities
//! - [`RadioConfig`] - LoRa parameters and airtime/delay factors (consumed by the radio layer)
//! - [`SyncConfig`] - Push-sync cadence, acknowledgement deadlines and failure ceiling
//! - [`IdentityConfig`] - Where the room's private key is kept
//! - [`LoggingConfig`] - Log level and files
//! - [`SecurityConfig`] - Argon2 parameters for hashing the admin password
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshroom::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("meshroom.toml").await?;
//!     println!("Room: {}", config.room.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [room]
//! name = "Test BBS"
//! latitude = 0.0
//! longitude = 0.0
//! admin_password = "password"
//! guest_password = "hello"
//! advert_interval = 1      # units of 2 minutes, 0 disables
//!
//! [sync]
//! push_interval_ms = 2000
//! ack_timeout_flood_ms = 12000
//! ```
//!
//! The engine reads the configuration as a snapshot on every loop pass. Changes made
//! by the admin command interpreter are written back with [`Config::save`].

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub name: String,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    /// Plaintext admin password. Ignored when `admin_password_hash` is set.
    #[serde(default)]
    pub admin_password: String,
    /// Argon2 PHC string for the admin password (set with `meshroom set-password`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password_hash: Option<String>,
    /// Room (guest) password. Empty means guests log in with an empty password.
    #[serde(default)]
    pub guest_password: String,
    /// Local advert period in units of 2 minutes. 0 disables the periodic advert.
    #[serde(default = "default_advert_interval")]
    pub advert_interval: u8,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,
}

fn default_advert_interval() -> u8 {
    1
}

fn default_max_clients() -> usize {
    32
}

fn default_max_posts() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// MHz
    pub frequency: f32,
    /// kHz
    pub bandwidth: f32,
    pub spreading_factor: u8,
    pub coding_rate: u8,
    pub tx_power_dbm: i8,
    #[serde(default = "default_airtime_factor")]
    pub airtime_factor: f32,
    #[serde(default)]
    pub rx_delay_base: f32,
    #[serde(default = "default_tx_delay_factor")]
    pub tx_delay_factor: f32,
    #[serde(default)]
    pub direct_tx_delay_factor: f32,
    #[serde(default = "default_disable_forwarding")]
    pub disable_forwarding: bool,
}

fn default_airtime_factor() -> f32 {
    1.0
}

fn default_tx_delay_factor() -> f32 {
    0.5
}

fn default_disable_forwarding() -> bool {
    true
}

/// Push-sync timing. All durations in milliseconds unless the name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay for a reply sent right after an ACK, so the ACK clears the channel first.
    pub reply_delay_ms: u32,
    /// Debounce before the next push after a login or a new post.
    pub push_notify_delay_ms: u64,
    /// Period of the push-sync tick.
    pub push_interval_ms: u64,
    /// ACK deadline for pushes sent by flood.
    pub ack_timeout_flood_ms: u64,
    /// ACK deadline for direct pushes: base + per_hop * (hops + 1).
    pub ack_timeout_base_ms: u64,
    pub ack_timeout_per_hop_ms: u64,
    /// Keep-alive interval recommended to clients at login.
    pub keep_alive_secs: u32,
    /// Consecutive ACK timeouts after which a client is skipped.
    pub max_push_failures: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: 1500,
            push_notify_delay_ms: 2000,
            push_interval_ms: 2000,
            ack_timeout_flood_ms: 12000,
            ack_timeout_base_ms: 4000,
            ack_timeout_per_hop_ms: 2000,
            keep_alive_secs: 128,
            max_push_failures: 3,
        }
    }
}

impl SyncConfig {
    /// ACK deadline offset for a direct push along `path_len` hops.
    pub fn direct_ack_timeout(&self, path_len: usize) -> u64 {
        self.ack_timeout_base_ms + self.ack_timeout_per_hop_ms * (path_len as u64 + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub key_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Argon2Config {
    #[serde(default)]
    pub memory_kib: Option<u32>,
    #[serde(default)]
    pub time_cost: Option<u32>,
    #[serde(default)]
    pub parallelism: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    #[serde(default)]
    pub argon2: Option<Argon2Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub room: RoomConfig,
    pub radio: RadioConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: Option<SecurityConfig>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Write this configuration to `path`, replacing the file.
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        Config::default().save(path).await
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.room.max_clients == 0 {
            return Err(anyhow!("room.max_clients must be at least 1"));
        }
        if self.room.max_posts == 0 {
            return Err(anyhow!("room.max_posts must be at least 1"));
        }
        if self.sync.push_interval_ms == 0 {
            return Err(anyhow!("sync.push_interval_ms must be greater than 0"));
        }
        if self.room.admin_password.is_empty() && self.room.admin_password_hash.is_none() {
            return Err(anyhow!(
                "either room.admin_password or room.admin_password_hash must be set"
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            room: RoomConfig {
                name: "Test BBS".to_string(),
                latitude: 0.0,
                longitude: 0.0,
                admin_password: "password".to_string(),
                admin_password_hash: None,
                guest_password: String::new(),
                advert_interval: default_advert_interval(),
                max_clients: default_max_clients(),
                max_posts: default_max_posts(),
            },
            radio: RadioConfig {
                frequency: 915.0,
                bandwidth: 250.0,
                spreading_factor: 10,
                coding_rate: 5,
                tx_power_dbm: 20,
                airtime_factor: default_airtime_factor(),
                rx_delay_base: 0.0,
                tx_delay_factor: default_tx_delay_factor(),
                direct_tx_delay_factor: 0.0,
                disable_forwarding: default_disable_forwarding(),
            },
            sync: SyncConfig::default(),
            identity: IdentityConfig {
                key_file: "./data/identity.key".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("meshroom.log".to_string()),
                security_file: Some("meshroom-security.log".to_string()),
            },
            security: Some(SecurityConfig::default()),
        }
    }
}
