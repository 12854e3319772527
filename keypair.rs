//! User key pairs and recipient key wrapping.
//!
//! Each identity owns an X25519 key pair. A file is shared with a recipient by
//! wrapping its content key under a key agreed between a fresh ephemeral
//! secret and the recipient's public key:
//!
//! ```text
//! shared = X25519(ephemeral, recipient)
//! kek    = HKDF-SHA256(salt = ephemeral_pub || recipient_pub, ikm = shared)
//! block  = AES key wrap(kek, content key)
//! ```

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};
use hkdf::Hkdf;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::blocks::{AsymmetricKeyWrapBlock, RECIPIENT_TAG_LEN};
use crate::error::{AxCryptError, Result};
use crate::keys::SymmetricKey;
use crate::keywrap;
use crate::suite::CryptoId;

/// X25519 key size
pub const X25519_KEY_SIZE: usize = 32;

const RECIPIENT_KEK_INFO: &[u8] = b"axcrypt recipient kek v1";

/// Truncated SHA-256 fingerprint of a public key.
pub fn recipient_tag(public: &PublicKey) -> [u8; RECIPIENT_TAG_LEN] {
    let digest = Sha256::digest(public.as_bytes());
    let mut tag = [0u8; RECIPIENT_TAG_LEN];
    tag.copy_from_slice(&digest[..RECIPIENT_TAG_LEN]);
    tag
}

/// Lowercase hex form of [`recipient_tag`], used in key file names.
pub fn recipient_tag_hex(public: &PublicKey) -> String {
    recipient_tag(public).iter().map(|b| format!("{:02x}", b)).collect()
}

fn derive_kek(
    shared: &[u8],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut salt = [0u8; 2 * X25519_KEY_SIZE];
    salt[..X25519_KEY_SIZE].copy_from_slice(ephemeral.as_bytes());
    salt[X25519_KEY_SIZE..].copy_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut kek = Zeroizing::new([0u8; 32]);
    hkdf.expand(RECIPIENT_KEK_INFO, &mut kek[..])
        .map_err(|e| AxCryptError::key(format!("recipient key expansion failed: {}", e)))?;
    Ok(kek)
}

/// Wrap `content_key` so only the holder of `recipient`'s secret can recover it.
pub fn wrap_for_recipient(
    content_key: &SymmetricKey,
    suite: CryptoId,
    recipient: &PublicKey,
) -> Result<AsymmetricKeyWrapBlock> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);
    if !shared.was_contributory() {
        return Err(AxCryptError::key("recipient public key is a low-order point"));
    }

    let kek = derive_kek(shared.as_bytes(), &ephemeral_public, recipient)?;
    Ok(AsymmetricKeyWrapBlock {
        suite,
        recipient_tag: recipient_tag(recipient),
        ephemeral_public: ephemeral_public.to_bytes(),
        wrapped: keywrap::wrap(&kek[..], content_key.as_bytes())?,
    })
}

/// An identity's key pair. Equality covers timestamp, email and key material.
#[derive(Clone)]
pub struct UserKeyPair {
    email: String,
    timestamp: DateTime<Utc>,
    secret: StaticSecret,
    public: PublicKey,
}

impl UserKeyPair {
    /// Fresh key pair stamped with the current time.
    pub fn generate(email: impl Into<String>) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self {
            email: email.into(),
            timestamp: Utc::now().trunc_subsecs(3),
            public: PublicKey::from(&secret),
            secret,
        }
    }

    pub fn from_parts(email: impl Into<String>, timestamp: DateTime<Utc>, secret: [u8; 32]) -> Self {
        let secret = StaticSecret::from(secret);
        Self {
            email: email.into(),
            timestamp,
            public: PublicKey::from(&secret),
            secret,
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn tag(&self) -> [u8; RECIPIENT_TAG_LEN] {
        recipient_tag(&self.public)
    }

    /// Whether this pair belongs to `email` (case-insensitive).
    pub fn is_for(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email)
    }

    /// Recover a content key wrapped for this pair.
    ///
    /// A block addressed to a different key, or one that fails its integrity
    /// check, is an authentication failure.
    pub fn unwrap_content_key(&self, block: &AsymmetricKeyWrapBlock) -> Result<SymmetricKey> {
        if block.recipient_tag != self.tag() {
            return Err(AxCryptError::Authentication);
        }
        let ephemeral = PublicKey::from(block.ephemeral_public);
        let shared = self.secret.diffie_hellman(&ephemeral);
        if !shared.was_contributory() {
            return Err(AxCryptError::Authentication);
        }
        let kek = derive_kek(shared.as_bytes(), &ephemeral, &self.public)?;
        keywrap::unwrap(&kek[..], &block.wrapped).map(SymmetricKey::from)
    }

    /// Serialized form stored as the payload of a key file.
    pub fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        let stored = StoredKeyPair {
            email: self.email.clone(),
            timestamp: self.timestamp,
            public_key: BASE64.encode(self.public.as_bytes()),
            private_key: BASE64.encode(self.secret.as_bytes()),
        };
        serde_json::to_vec(&stored)
            .map(Zeroizing::new)
            .map_err(|e| AxCryptError::key(format!("serializing key pair: {}", e)))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let stored: StoredKeyPair = serde_json::from_slice(bytes)
            .map_err(|e| AxCryptError::key(format!("invalid key pair document: {}", e)))?;

        let secret = decode_key(&stored.private_key, "private")?;
        let pair = Self::from_parts(stored.email.clone(), stored.timestamp, *secret);
        let public = decode_key(&stored.public_key, "public")?;
        if !bool::from(pair.public.as_bytes()[..].ct_eq(&public[..])) {
            return Err(AxCryptError::key("public key does not match private key"));
        }
        Ok(pair)
    }
}

fn decode_key(encoded: &str, which: &str) -> Result<Zeroizing<[u8; X25519_KEY_SIZE]>> {
    let bytes = Zeroizing::new(
        BASE64
            .decode(encoded)
            .map_err(|e| AxCryptError::key(format!("invalid {} key encoding: {}", which, e)))?,
    );
    if bytes.len() != X25519_KEY_SIZE {
        return Err(AxCryptError::key(format!(
            "{} key must be {} bytes, got {}",
            which,
            X25519_KEY_SIZE,
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; X25519_KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

impl PartialEq for UserKeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
            && self.email == other.email
            && self.public.as_bytes() == other.public.as_bytes()
            && bool::from(self.secret.as_bytes()[..].ct_eq(&other.secret.as_bytes()[..]))
    }
}

impl Eq for UserKeyPair {}

impl std::fmt::Debug for UserKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserKeyPair")
            .field("email", &self.email)
            .field("timestamp", &self.timestamp)
            .field("tag", &recipient_tag_hex(&self.public))
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredKeyPair {
    email: String,
    timestamp: DateTime<Utc>,
    public_key: String,
    private_key: String,
}

impl Drop for StoredKeyPair {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}
