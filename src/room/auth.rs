//! Login password checks.
//!
//! The admin password may be stored as an Argon2 PHC string (`admin_password_hash`),
//! in which case the plaintext `admin_password` is ignored. The guest password is
//! always plaintext, and an empty guest password admits an empty login password.
//!
//! Verifying against the hash costs a full Argon2 run inside the cooperative loop, so
//! the `[security.argon2]` costs bound how long a login can stall it. Guest logins
//! never pay it: with a hashed admin password, a non-empty guest password is matched
//! first and wins.
use anyhow::{anyhow, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::config::{RoomConfig, SecurityConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Guest,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }
}

/// Argon2 instance honouring the optional `[security.argon2]` overrides.
pub fn argon2_from_config(security: Option<&SecurityConfig>) -> Argon2<'static> {
    let Some(a) = security.and_then(|s| s.argon2.as_ref()) else {
        return Argon2::default();
    };
    let defaults = Params::DEFAULT;
    let params = Params::new(
        a.memory_kib.unwrap_or(defaults.m_cost()),
        a.time_cost.unwrap_or(defaults.t_cost()),
        a.parallelism.unwrap_or(defaults.p_cost()),
        None,
    );
    match params {
        Ok(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p),
        Err(e) => {
            log::warn!("Invalid argon2 parameters ({e}), using defaults");
            Argon2::default()
        }
    }
}

/// Hash `password` into a PHC string suitable for `admin_password_hash`.
pub fn hash_password(password: &str, security: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = argon2_from_config(security)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Password hash failure: {e}"))?;
    Ok(hash.to_string())
}

fn verify_admin(room: &RoomConfig, presented: &[u8]) -> bool {
    match room.admin_password_hash.as_deref() {
        Some(stored) => match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(presented, &parsed)
                .is_ok(),
            Err(e) => {
                log::error!("Corrupt admin password hash: {e}");
                false
            }
        },
        None => !room.admin_password.is_empty() && presented == room.admin_password.as_bytes(),
    }
}

/// Which role, if any, `presented` unlocks.
pub fn check_password(room: &RoomConfig, presented: &[u8]) -> Option<Role> {
    let guest = !room.guest_password.is_empty() && presented == room.guest_password.as_bytes();
    if guest && room.admin_password_hash.is_some() {
        return Some(Role::Guest);
    }
    if verify_admin(room, presented) {
        Some(Role::Admin)
    } else if presented == room.guest_password.as_bytes() {
        Some(Role::Guest)
    } else {
        None
    }
}
