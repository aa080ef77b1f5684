//! Binary entrypoint for the meshroom CLI.
//!
//! Commands:
//! - `start` - run the room engine with the local console on stdin
//! - `init` - create a starter `meshroom.toml` and the room identity key
//! - `status` - print the room profile, public key and sync settings
//! - `set-password [--guest]` - set the admin password (argon2 hashed) or the guest password
//!
//! See the library crate docs for module-level details: `meshroom::`.
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use meshroom::cli::AdminCli;
use meshroom::clock::{format_timestamp, Clock, SystemClock};
use meshroom::config::Config;
use meshroom::identity::LocalIdentity;
use meshroom::logutil::escape_log;
use meshroom::mesh::Outbox;
use meshroom::metrics;
use meshroom::room::auth::hash_password;
use meshroom::room::RoomServer;

const POLL_INTERVAL_MILLIS: u64 = 50;

#[derive(Parser)]
#[command(name = "meshroom")]
#[command(about = "Store-and-forward room server for LoRa mesh networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "meshroom.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the room server
    Start,
    /// Write a default configuration and create the room identity
    Init,
    /// Show the room profile and settings
    Status,
    /// Set the admin password (stored as an argon2 hash) or the guest password
    SetPassword {
        /// Set the guest (room) password instead
        #[arg(long)]
        guest: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    if !matches!(cli.command, Commands::Init) {
        init_logging(&pre_config, cli.verbose);
    }

    match cli.command {
        Commands::Start => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            run(config, &cli.config).await?;
        }
        Commands::Init => {
            if Path::new(&cli.config).exists() {
                println!("Configuration {} already exists, leaving it alone.", cli.config);
            } else {
                Config::create_default(&cli.config).await?;
                println!("Created default configuration at {}", cli.config);
            }
            let config = Config::load(&cli.config).await?;
            let (identity, created) =
                LocalIdentity::load_or_create(Path::new(&config.identity.key_file))?;
            if created {
                println!("Generated room identity in {}", config.identity.key_file);
            }
            println!("Public key: {}", identity.identity().to_hex());
            println!("Edit the configuration to set the room name and passwords, then run 'meshroom start'.");
        }
        Commands::Status => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            println!("Room: {}", config.room.name);
            match LocalIdentity::load(Path::new(&config.identity.key_file)) {
                Ok(id) => println!("Public key: {}", id.identity().to_hex()),
                Err(e) => println!("Public key: unavailable ({e})"),
            }
            println!(
                "Position: {:.6}, {:.6}",
                config.room.latitude, config.room.longitude
            );
            println!(
                "Capacity: {} clients, {} posts",
                config.room.max_clients, config.room.max_posts
            );
            println!(
                "Admin password: {}",
                if config.room.admin_password_hash.is_some() { "hashed" } else { "plaintext" }
            );
            println!(
                "Push: every {} ms, ack timeout {} ms flood / {}+{}/hop ms direct",
                config.sync.push_interval_ms,
                config.sync.ack_timeout_flood_ms,
                config.sync.ack_timeout_base_ms,
                config.sync.ack_timeout_per_hop_ms
            );
            match config.room.advert_interval {
                0 => println!("Local advert: off"),
                n => println!("Local advert: every {} minutes", n as u32 * 2),
            }
            println!(
                "Radio: {} MHz, BW {} kHz, SF{}, CR{}, {} dBm",
                config.radio.frequency,
                config.radio.bandwidth,
                config.radio.spreading_factor,
                config.radio.coding_rate,
                config.radio.tx_power_dbm
            );
        }
        Commands::SetPassword { guest } => {
            let mut config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            if guest {
                let pass = rpassword::prompt_password("New guest password (empty for open room): ")?;
                config.room.guest_password = pass;
            } else {
                println!("Setting admin password for room '{}'.", config.room.name);
                let pass1 = rpassword::prompt_password("New password: ")?;
                if pass1.len() < 8 {
                    println!("Error: password too short (min 8).");
                    return Ok(());
                }
                if pass1.len() > 64 {
                    println!("Error: password too long.");
                    return Ok(());
                }
                let pass2 = rpassword::prompt_password("Confirm password: ")?;
                if pass1 != pass2 {
                    println!("Error: passwords do not match.");
                    return Ok(());
                }
                let hash = hash_password(&pass1, config.security.as_ref())?;
                config.room.admin_password_hash = Some(hash);
                config.room.admin_password.clear();
            }
            config.save(&cli.config).await?;
            println!("Password updated successfully.");
        }
    }

    Ok(())
}

/// Cooperative host loop: poll the engine, feed console lines, log outbound packets.
async fn run(config: Config, config_path: &str) -> Result<()> {
    let (identity, created) = LocalIdentity::load_or_create(Path::new(&config.identity.key_file))
        .map_err(|e| anyhow!("Failed to load identity {}: {}", config.identity.key_file, e))?;
    if created {
        info!("Generated new room identity in {}", config.identity.key_file);
    }

    let clock = SystemClock::new();
    info!("Room clock: {}", format_timestamp(clock.current_time()));

    let mut room = RoomServer::new(config, identity, Box::new(clock), Box::new(AdminCli::new()));
    // no radio link attached: outbound packets are logged
    let mut outbox = Outbox::new();
    room.begin(&mut outbox);

    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;
    let mut ticker = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MILLIS));

    loop {
        tokio::select! {
            _ = ticker.tick() => room.poll(&mut outbox),
            line = console.next_line(), if console_open => match line {
                Ok(Some(line)) => {
                    let reply = room.handle_console_command(&mut outbox, line.trim_end_matches('\r'));
                    if !reply.is_empty() {
                        println!("  -> {reply}");
                    }
                }
                Ok(None) => console_open = false,
                Err(e) => {
                    warn!("Console read failed: {e}");
                    console_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }

        for sent in outbox.drain() {
            info!("TX {} via {:?}", sent.packet, sent.dispatch);
        }

        if room.take_config_dirty() {
            match room.config().save(config_path).await {
                Ok(()) => info!("Configuration saved to {}", config_path),
                Err(e) => warn!("{e}"),
            }
        }
    }

    let m = metrics::snapshot();
    info!(
        "Stopped: {} logins, {} posts, {} pushes ({} acked, {} timed out)",
        m.logins_ok, m.posts_stored, m.pushes_sent, m.pushes_acked, m.push_timeouts
    );
    info!("Room '{}' offline", escape_log(&room.config().room.name));
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    match log_file {
        Some(f) => {
            let file = std::sync::Mutex::new(f);
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = file.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
