//! Node identities and per-peer key agreement.
//!
//! A node is identified by its 32-byte Ed25519 public key. The secret shared with a
//! peer is X25519 over the Montgomery forms of both Ed25519 keys, which is what
//! the mesh's existing clients compute, so the derived bytes must stay bit-exact.
use std::fmt;
use std::path::Path;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha512};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const PUB_KEY_SIZE: usize = 32;
/// Bytes of a public key used as its hop/peer hash on the wire.
pub const PATH_HASH_SIZE: usize = 1;
/// Bytes of the author's key carried in front of a pushed post.
pub const AUTHOR_PREFIX_SIZE: usize = 4;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("public key is not a valid Ed25519 point")]
    InvalidPublicKey,

    #[error("expected {expected} key bytes, got {found}")]
    BadLength { expected: usize, found: usize },

    #[error("key file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key file is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Public identity of a mesh node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub_key: [u8; PUB_KEY_SIZE],
}

impl Identity {
    pub fn from_bytes(pub_key: [u8; PUB_KEY_SIZE]) -> Self {
        Self { pub_key }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let pub_key: [u8; PUB_KEY_SIZE] =
            bytes.try_into().map_err(|_| IdentityError::BadLength {
                expected: PUB_KEY_SIZE,
                found: bytes.len(),
            })?;
        Ok(Self { pub_key })
    }

    pub fn pub_key(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.pub_key
    }

    pub fn matches(&self, other: &Identity) -> bool {
        self.pub_key == other.pub_key
    }

    /// True when `hash` (a peer hash from a packet header) is a prefix of this key.
    pub fn is_hash_match(&self, hash: &[u8]) -> bool {
        hash.len() >= PATH_HASH_SIZE && self.pub_key[..PATH_HASH_SIZE] == hash[..PATH_HASH_SIZE]
    }

    pub fn author_prefix(&self) -> [u8; AUTHOR_PREFIX_SIZE] {
        let mut prefix = [0u8; AUTHOR_PREFIX_SIZE];
        prefix.copy_from_slice(&self.pub_key[..AUTHOR_PREFIX_SIZE]);
        prefix
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.pub_key)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", hex::encode(&self.pub_key[..AUTHOR_PREFIX_SIZE]))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.pub_key[0])
    }
}

/// Symmetric key shared with exactly one peer. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; PUB_KEY_SIZE]);

impl SharedSecret {
    pub fn from_bytes(bytes: [u8; PUB_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

/// The room's own keypair.
pub struct LocalIdentity {
    signing: SigningKey,
    identity: Identity,
}

impl LocalIdentity {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let identity = Identity::from_bytes(signing.verifying_key().to_bytes());
        Self { signing, identity }
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// X25519 agreement between our Ed25519 secret scalar and the peer's key.
    pub fn shared_secret(&self, peer: &Identity) -> Result<SharedSecret, IdentityError> {
        let peer_key =
            VerifyingKey::from_bytes(peer.pub_key()).map_err(|_| IdentityError::InvalidPublicKey)?;
        let peer_montgomery = peer_key.to_montgomery().to_bytes();

        let mut seed = self.signing.to_bytes();
        let digest = Sha512::digest(seed);
        seed.zeroize();
        let mut expanded = [0u8; 64];
        expanded.copy_from_slice(&digest);
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&expanded[..32]);
        expanded.zeroize();

        // x25519 clamps the scalar itself
        let shared = x25519_dalek::x25519(scalar, peer_montgomery);
        scalar.zeroize();
        Ok(SharedSecret(shared))
    }

    /// Load the hex-encoded seed at `path`, creating a fresh identity there if the
    /// file does not exist. Returns the identity and whether it was newly created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool), IdentityError> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }
        let id = Self::generate();
        id.save(path)?;
        Ok((id, true))
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let text = std::fs::read_to_string(path)?;
        let mut bytes = hex::decode(text.trim())?;
        let seed: Result<[u8; 32], _> = bytes.as_slice().try_into();
        let found = bytes.len();
        bytes.zeroize();
        let mut seed = seed.map_err(|_| IdentityError::BadLength {
            expected: 32,
            found,
        })?;
        let id = Self::from_seed(&seed);
        seed.zeroize();
        Ok(id)
    }

    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut seed = self.signing.to_bytes();
        let encoded = hex::encode(seed);
        seed.zeroize();
        std::fs::write(path, format!("{encoded}\n"))?;
        Ok(())
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}
