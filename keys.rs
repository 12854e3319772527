//! Symmetric key material and the per-file key hierarchy.
//!
//! Content key → HKDF-SHA256 (salt = preamble nonce) → header / data / HMAC keys.

use hkdf::Hkdf;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::cipher::BLOCK_SIZE;
use crate::error::{AxCryptError, Result};

/// Domain separation labels for sub-key expansion
mod domains {
    pub const HEADER_KEY: &[u8] = b"axcrypt header key v1";
    pub const DATA_KEY: &[u8] = b"axcrypt data key v1";
    pub const HMAC_KEY: &[u8] = b"axcrypt hmac key v1";
    pub const HEADER_IV: &[u8] = b"axcrypt header iv v1";
}

/// HMAC-SHA512 key length
pub const HMAC_KEY_SIZE: usize = 64;

/// Secret key bytes, wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SymmetricKey(Zeroizing<Vec<u8>>);

impl SymmetricKey {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    pub fn random(len: usize) -> Self {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Zeroizing<Vec<u8>>> for SymmetricKey {
    fn from(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED; {}])", self.0.len())
    }
}

/// Keys for one container, all expanded from the content key.
pub struct SubKeys {
    pub header: SymmetricKey,
    pub data: SymmetricKey,
    pub hmac: SymmetricKey,
}

impl SubKeys {
    pub fn derive(content_key: &SymmetricKey, nonce: &[u8]) -> Result<Self> {
        let hkdf = Hkdf::<Sha256>::new(Some(nonce), content_key.as_bytes());
        let expand = |info: &[u8], len: usize| -> Result<SymmetricKey> {
            let mut okm = Zeroizing::new(vec![0u8; len]);
            hkdf.expand(info, &mut okm[..])
                .map_err(|e| AxCryptError::key(format!("sub-key expansion failed: {}", e)))?;
            Ok(SymmetricKey(okm))
        };

        Ok(Self {
            header: expand(domains::HEADER_KEY, content_key.len())?,
            data: expand(domains::DATA_KEY, content_key.len())?,
            hmac: expand(domains::HMAC_KEY, HMAC_KEY_SIZE)?,
        })
    }
}

/// IV for the CBC encryption of one header block type.
pub(crate) fn header_iv(header_key: &SymmetricKey, block_type: u8) -> Result<[u8; BLOCK_SIZE]> {
    let hkdf = Hkdf::<Sha256>::new(None, header_key.as_bytes());
    let mut info = domains::HEADER_IV.to_vec();
    info.push(block_type);
    let mut iv = [0u8; BLOCK_SIZE];
    hkdf.expand(&info, &mut iv)
        .map_err(|e| AxCryptError::key(format!("header IV expansion failed: {}", e)))?;
    Ok(iv)
}

pub(crate) fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}
