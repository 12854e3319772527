//! Passphrase-to-key derivation.
//!
//! Two policies coexist and are chosen by the crypto suite, never globally:
//!
//! - **Versioned**: PBKDF2-HMAC-SHA512 over a random salt with a tunable
//!   iteration count, folded down to the key length. Salt and iterations are
//!   stored in the KeyWrap block.
//! - **Legacy**: SHA-256 of the passphrase folded to the key length, with no
//!   persisted parameters. Only used to read old files.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::{AxCryptError, Result};
use crate::keys::{random_bytes, SymmetricKey};

/// Salt length for versioned derivation
pub const SALT_LEN: usize = 32;

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 20_000;

/// Upper bound accepted from a file, to keep a hostile header from stalling us.
pub const MAX_ITERATIONS: u32 = 50_000_000;

/// A passphrase-derived key together with the parameters that reproduce it.
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKey {
    key: SymmetricKey,
    salt: Vec<u8>,
    iterations: u32,
}

impl DerivedKey {
    /// Fresh versioned key with a random salt.
    pub fn versioned(passphrase: &SecretString, iterations: u32, key_bits: usize) -> Result<Self> {
        let salt = random_bytes::<SALT_LEN>();
        Self::restore_versioned(passphrase, &salt, iterations, key_bits)
    }

    /// Re-derive a versioned key from stored salt and iteration count.
    pub fn restore_versioned(
        passphrase: &SecretString,
        salt: &[u8],
        iterations: u32,
        key_bits: usize,
    ) -> Result<Self> {
        let key = derive(passphrase, salt, iterations, key_bits)?;
        Ok(Self {
            key,
            salt: salt.to_vec(),
            iterations,
        })
    }

    /// Key under the legacy fixed scheme.
    pub fn legacy(passphrase: &SecretString, key_bits: usize) -> Result<Self> {
        let len = key_len(key_bits)?;
        let mut digest = Zeroizing::new([0u8; 32]);
        digest.copy_from_slice(&Sha256::digest(passphrase.expose_secret().as_bytes()));
        Ok(Self {
            key: SymmetricKey::from(fold(&digest[..], len)),
            salt: Vec::new(),
            iterations: 0,
        })
    }

    pub fn key(&self) -> &SymmetricKey {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &self.key)
            .field("salt_len", &self.salt.len())
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// `reduce(PBKDF2-HMAC-SHA512(passphrase, salt, iterations), key_bits / 8)`.
pub fn derive(
    passphrase: &SecretString,
    salt: &[u8],
    iterations: u32,
    key_bits: usize,
) -> Result<SymmetricKey> {
    let len = key_len(key_bits)?;
    if iterations == 0 || iterations > MAX_ITERATIONS {
        return Err(AxCryptError::key(format!(
            "iteration count {} outside 1..={}",
            iterations, MAX_ITERATIONS
        )));
    }
    if salt.is_empty() {
        return Err(AxCryptError::key("versioned derivation requires a salt"));
    }

    let mut digest = Zeroizing::new([0u8; 64]);
    pbkdf2::pbkdf2_hmac::<Sha512>(
        passphrase.expose_secret().as_bytes(),
        salt,
        iterations,
        &mut digest[..],
    );
    Ok(SymmetricKey::from(fold(&digest[..], len)))
}

fn key_len(key_bits: usize) -> Result<usize> {
    if key_bits == 0 || key_bits % 64 != 0 || key_bits > 512 {
        return Err(AxCryptError::key(format!(
            "unsupported key size {} bits",
            key_bits
        )));
    }
    Ok(key_bits / 8)
}

/// XOR-fold `digest` into `len` bytes so every digest byte contributes.
fn fold(digest: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; len]);
    for (i, byte) in digest.iter().enumerate() {
        out[i % len] ^= byte;
    }
    out
}
