//! Admin command interpreter.
//!
//! Commands arrive from admin clients as `CLI_DATA` text messages, and from the local
//! console with a sender timestamp of zero. Every command produces a single short
//! reply line (at most one text payload). An empty reply means nothing is sent back.
//!
//! | Command | Effect |
//! | --- | --- |
//! | `ver` | firmware name and version |
//! | `clock` | current room time |
//! | `clock sync` | set the room clock from the sender's timestamp |
//! | `time <secs>` | set the room clock |
//! | `advert` | send a flood advertisement now |
//! | `password <new>` | replace the admin password (stored hashed) |
//! | `get <key>` / `set <key> <value>` | read or change a preference |
//! | `clients` / `posts` | table summaries |
//! | `stats` | push-sync counters |
//!
//! Preference changes mark the configuration as changed. The server writes it back.
use log::info;

use crate::clock::{format_timestamp, Clock};
use crate::config::Config;
use crate::identity::Identity;
use crate::logutil::escape_log;
use crate::metrics;
use crate::room::auth::hash_password;
use crate::room::clients::ClientTable;
use crate::room::posts::PostStore;

pub const FIRMWARE_NAME: &str = "meshroom";
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// What a command asked the server to do after it returned.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommandEffects {
    pub send_advert: bool,
    pub config_changed: bool,
    pub advert_timer_changed: bool,
}

/// Server state a command may read or change.
pub struct CommandContext<'a> {
    pub config: &'a mut Config,
    pub clock: &'a mut dyn Clock,
    pub identity: Identity,
    pub clients: &'a ClientTable,
    pub posts: &'a PostStore,
    pub effects: CommandEffects,
}

pub trait CommandHandler {
    /// Run `command` and return the reply text (empty for no reply).
    fn execute(&mut self, ctx: &mut CommandContext<'_>, sender_timestamp: u32, command: &str)
        -> String;
}

/// Built-in interpreter for room administration.
#[derive(Debug, Default)]
pub struct AdminCli;

impl AdminCli {
    pub fn new() -> Self {
        Self
    }

    fn get(&self, ctx: &CommandContext<'_>, key: &str) -> String {
        let c = &ctx.config;
        match key {
            "name" => format!("> {}", c.room.name),
            "lat" => format!("> {}", c.room.latitude),
            "lon" => format!("> {}", c.room.longitude),
            "guest.password" => format!("> {}", c.room.guest_password),
            "advert.interval" => format!("> {}", c.room.advert_interval as u32 * 2),
            "af" => format!("> {}", c.radio.airtime_factor),
            "tx" => format!("> {}", c.radio.tx_power_dbm),
            "freq" => format!("> {}", c.radio.frequency),
            "public.key" => format!("> {}", ctx.identity.to_hex()),
            _ => format!("??: {key}"),
        }
    }

    fn set(&self, ctx: &mut CommandContext<'_>, key: &str, value: &str) -> String {
        let reply = match key {
            "name" => {
                if value.is_empty() {
                    return "Error: name required".to_string();
                }
                ctx.config.room.name = value.to_string();
                "OK"
            }
            "lat" => match value.parse::<f64>() {
                Ok(v) if (-90.0..=90.0).contains(&v) => {
                    ctx.config.room.latitude = v;
                    "OK"
                }
                _ => return "Error: bad latitude".to_string(),
            },
            "lon" => match value.parse::<f64>() {
                Ok(v) if (-180.0..=180.0).contains(&v) => {
                    ctx.config.room.longitude = v;
                    "OK"
                }
                _ => return "Error: bad longitude".to_string(),
            },
            "guest.password" => {
                ctx.config.room.guest_password = value.to_string();
                "OK"
            }
            "advert.interval" => match value.parse::<u32>() {
                // minutes, stored in 2 minute units
                Ok(mins) if mins == 0 || (60..=240).contains(&mins) => {
                    ctx.config.room.advert_interval = (mins / 2) as u8;
                    ctx.effects.advert_timer_changed = true;
                    "OK"
                }
                _ => return "Error: interval range is 60-240 minutes (0 = off)".to_string(),
            },
            "af" => match value.parse::<f32>() {
                Ok(v) if v >= 0.0 => {
                    ctx.config.radio.airtime_factor = v;
                    "OK"
                }
                _ => return "Error: bad airtime factor".to_string(),
            },
            "tx" => match value.parse::<i8>() {
                Ok(v) => {
                    ctx.config.radio.tx_power_dbm = v;
                    "OK - reboot to apply"
                }
                Err(_) => return "Error: bad tx power".to_string(),
            },
            "freq" => match value.parse::<f32>() {
                Ok(v) if (100.0..=1000.0).contains(&v) => {
                    ctx.config.radio.frequency = v;
                    "OK - reboot to apply"
                }
                _ => return "Error: bad frequency".to_string(),
            },
            _ => return format!("unknown config: {key}"),
        };
        ctx.effects.config_changed = true;
        info!("Preference {} set to {}", key, escape_log(value));
        reply.to_string()
    }

    fn set_password(&self, ctx: &mut CommandContext<'_>, new_password: &str) -> String {
        if new_password.is_empty() {
            return "Error: password required".to_string();
        }
        match hash_password(new_password, ctx.config.security.as_ref()) {
            Ok(hash) => {
                ctx.config.room.admin_password_hash = Some(hash);
                ctx.config.room.admin_password.clear();
                ctx.effects.config_changed = true;
                "OK - password changed".to_string()
            }
            Err(e) => format!("Error: {e}"),
        }
    }

    fn set_clock(&self, ctx: &mut CommandContext<'_>, secs: u32) -> String {
        let now = ctx.clock.current_time();
        if secs > now {
            ctx.clock.set_current_time(secs);
            format!("OK - clock set: {}", format_timestamp(secs))
        } else {
            "ERR: clock cannot go backwards".to_string()
        }
    }
}

impl CommandHandler for AdminCli {
    fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        sender_timestamp: u32,
        command: &str,
    ) -> String {
        let command = command.trim();
        let (verb, rest) = match command.split_once(' ') {
            Some((v, r)) => (v, r.trim()),
            None => (command, ""),
        };
        match verb {
            "" => String::new(),
            "ver" => format!("{} v{}", FIRMWARE_NAME, FIRMWARE_VERSION),
            "clock" if rest == "sync" => {
                if sender_timestamp == 0 {
                    "ERR: no sender time to sync from".to_string()
                } else {
                    self.set_clock(ctx, sender_timestamp)
                }
            }
            "clock" => format_timestamp(ctx.clock.current_time()),
            "time" => match rest.parse::<u32>() {
                Ok(secs) => self.set_clock(ctx, secs),
                Err(_) => "Error: time <epoch secs>".to_string(),
            },
            "advert" => {
                ctx.effects.send_advert = true;
                "OK - Advert sent".to_string()
            }
            "password" => self.set_password(ctx, rest),
            "get" => self.get(ctx, rest),
            "set" => match rest.split_once(' ') {
                Some((key, value)) => self.set(ctx, key, value.trim()),
                None => "Error: set <key> <value>".to_string(),
            },
            "clients" => {
                let active = ctx.clients.iter().filter(|c| c.is_active()).count();
                let admins = ctx
                    .clients
                    .iter()
                    .filter(|c| c.is_active() && c.is_admin)
                    .count();
                let stalled = ctx
                    .clients
                    .iter()
                    .filter(|c| c.is_active() && c.push_failures > 0)
                    .count();
                format!(
                    "clients: {}/{} active, {} admin, {} stalled",
                    active,
                    ctx.clients.capacity(),
                    admins,
                    stalled
                )
            }
            "posts" => match ctx.posts.newest() {
                Some(p) => format!(
                    "posts: {}/{}, newest {}",
                    ctx.posts.len(),
                    ctx.posts.capacity(),
                    format_timestamp(p.timestamp)
                ),
                None => format!("posts: 0/{}", ctx.posts.capacity()),
            },
            "stats" => {
                let m = metrics::snapshot();
                let rate = m
                    .ack_rate_percent()
                    .map(|r| format!("{r}%"))
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "logins {} posts {} pushed {} acked {} timeouts {} ack rate {}",
                    m.logins_ok, m.posts_stored, m.pushes_sent, m.pushes_acked, m.push_timeouts, rate
                )
            }
            _ => format!("Unknown command: {}", escape_log(verb)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Argon2Config;
    use crate::config::SecurityConfig;

    struct Fixture {
        config: Config,
        clock: ManualClock,
        clients: ClientTable,
        posts: PostStore,
    }

    impl Fixture {
        fn new() -> Self {
            let mut config = Config::default();
            config.security = Some(SecurityConfig {
                argon2: Some(Argon2Config {
                    memory_kib: Some(1024),
                    time_cost: Some(1),
                    parallelism: Some(1),
                }),
            });
            Self {
                config,
                clock: ManualClock::new(1_700_000_000),
                clients: ClientTable::new(4),
                posts: PostStore::new(4),
            }
        }

        fn run(&mut self, ts: u32, cmd: &str) -> (String, CommandEffects) {
            let mut ctx = CommandContext {
                config: &mut self.config,
                clock: &mut self.clock,
                identity: Identity::from_bytes([0xAB; 32]),
                clients: &self.clients,
                posts: &self.posts,
                effects: CommandEffects::default(),
            };
            let reply = AdminCli::new().execute(&mut ctx, ts, cmd);
            (reply, ctx.effects)
        }
    }

    #[test]
    fn ver_names_the_firmware() {
        let mut f = Fixture::new();
        let (reply, effects) = f.run(0, "ver");
        assert!(reply.starts_with("meshroom v"));
        assert_eq!(effects, CommandEffects::default());
    }

    #[test]
    fn set_name_marks_config_changed() {
        let mut f = Fixture::new();
        let (reply, effects) = f.run(5, "set name Hilltop Room");
        assert_eq!(reply, "OK");
        assert!(effects.config_changed);
        assert_eq!(f.config.room.name, "Hilltop Room");
        assert_eq!(f.run(6, "get name").0, "> Hilltop Room");
    }

    #[test]
    fn bad_values_change_nothing() {
        let mut f = Fixture::new();
        let (reply, effects) = f.run(5, "set lat 123");
        assert!(reply.starts_with("Error"));
        assert!(!effects.config_changed);
        assert_eq!(f.run(5, "set colour blue").0, "unknown config: colour");
    }

    #[test]
    fn advert_interval_is_stored_in_two_minute_units() {
        let mut f = Fixture::new();
        let (_, effects) = f.run(5, "set advert.interval 120");
        assert!(effects.advert_timer_changed);
        assert_eq!(f.config.room.advert_interval, 60);
        assert_eq!(f.run(5, "get advert.interval").0, "> 120");
        assert!(f.run(5, "set advert.interval 10").0.starts_with("Error"));
    }

    #[test]
    fn clock_sync_only_moves_forward() {
        let mut f = Fixture::new();
        let (reply, _) = f.run(1_800_000_000, "clock sync");
        assert!(reply.starts_with("OK - clock set"));
        assert_eq!(f.clock.current_time(), 1_800_000_000);
        assert_eq!(f.run(1_000, "clock sync").0, "ERR: clock cannot go backwards");
        assert_eq!(f.run(0, "clock sync").0, "ERR: no sender time to sync from");
    }

    #[test]
    fn advert_requests_send() {
        let mut f = Fixture::new();
        let (reply, effects) = f.run(0, "advert");
        assert_eq!(reply, "OK - Advert sent");
        assert!(effects.send_advert);
    }

    #[test]
    fn password_is_stored_hashed() {
        let mut f = Fixture::new();
        let (reply, effects) = f.run(7, "password n3w-secret");
        assert_eq!(reply, "OK - password changed");
        assert!(effects.config_changed);
        assert!(f.config.room.admin_password.is_empty());
        let hash = f.config.room.admin_password_hash.clone().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(f.run(7, "password").0, "Error: password required");
    }

    #[test]
    fn summaries_on_empty_room() {
        let mut f = Fixture::new();
        assert_eq!(f.run(0, "clients").0, "clients: 0/4 active, 0 admin, 0 stalled");
        assert_eq!(f.run(0, "posts").0, "posts: 0/4");
        assert_eq!(f.run(0, "").0, "");
        assert_eq!(f.run(0, "reboot").0, "Unknown command: reboot");
    }
}
