//! Crypto-suite registry.
//!
//! A suite ("crypto factory") bundles a key size, a passphrase derivation
//! policy and the stream cipher. Suites are identified by a stable 128-bit
//! id that never changes between releases.
//!
//! The [`CryptoRegistry`] is a plain value handed to the reader and writer, so
//! tests can build isolated registries.

use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::cipher::{StreamCipher, BLOCK_SIZE};
use crate::error::{AxCryptError, Result};
use crate::kdf::{DerivedKey, DEFAULT_ITERATIONS};
use crate::keys::SymmetricKey;

/// Stable suite identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CryptoId(Uuid);

impl CryptoId {
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CryptoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ids of the suites installed by [`CryptoRegistry::standard`]
pub mod ids {
    use super::CryptoId;

    pub const LEGACY_AES_128: CryptoId = CryptoId::from_u128(0x2b0c_ce0c_8a5e_4c1f_9d3b_0000_0000_0001);
    pub const AES_128: CryptoId = CryptoId::from_u128(0x2b0c_ce0c_8a5e_4c1f_9d3b_0000_0000_0128);
    pub const AES_256: CryptoId = CryptoId::from_u128(0x2b0c_ce0c_8a5e_4c1f_9d3b_0000_0000_0256);
}

/// One installed crypto suite.
pub trait CryptoFactory: Send + Sync {
    fn id(&self) -> CryptoId;

    fn name(&self) -> &str;

    /// Higher wins when no default is marked explicitly.
    fn priority(&self) -> i32;

    fn key_bits(&self) -> usize;

    fn key_len(&self) -> usize {
        self.key_bits() / 8
    }

    /// Derive a fresh key for encryption, generating new parameters.
    fn create_passphrase_key(&self, passphrase: &SecretString) -> Result<DerivedKey>;

    /// Reproduce a key from parameters stored in a file.
    fn restore_passphrase_key(
        &self,
        passphrase: &SecretString,
        salt: &[u8],
        iterations: u32,
    ) -> Result<DerivedKey>;

    fn create_cipher(
        &self,
        key: &SymmetricKey,
        iv: &[u8; BLOCK_SIZE],
        keystream_offset: u64,
    ) -> Result<StreamCipher> {
        if key.len() != self.key_len() {
            return Err(AxCryptError::key(format!(
                "{} expects a {} byte key, got {}",
                self.name(),
                self.key_len(),
                key.len()
            )));
        }
        StreamCipher::new(key.as_bytes(), iv, keystream_offset)
    }
}

/// AES with PBKDF2-SHA512 derivation over a random salt.
pub struct VersionedAesFactory {
    id: CryptoId,
    name: String,
    priority: i32,
    key_bits: usize,
    iterations: u32,
}

impl VersionedAesFactory {
    pub fn new(id: CryptoId, name: impl Into<String>, priority: i32, key_bits: usize) -> Self {
        Self {
            id,
            name: name.into(),
            priority,
            key_bits,
            iterations: DEFAULT_ITERATIONS,
        }
    }

    /// Iteration count used for newly created keys.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }
}

impl CryptoFactory for VersionedAesFactory {
    fn id(&self) -> CryptoId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn key_bits(&self) -> usize {
        self.key_bits
    }

    fn create_passphrase_key(&self, passphrase: &SecretString) -> Result<DerivedKey> {
        DerivedKey::versioned(passphrase, self.iterations, self.key_bits)
    }

    fn restore_passphrase_key(
        &self,
        passphrase: &SecretString,
        salt: &[u8],
        iterations: u32,
    ) -> Result<DerivedKey> {
        DerivedKey::restore_versioned(passphrase, salt, iterations, self.key_bits)
    }
}

/// AES-128 with the original fixed derivation. Read-only compatibility.
pub struct LegacyAesFactory;

impl CryptoFactory for LegacyAesFactory {
    fn id(&self) -> CryptoId {
        ids::LEGACY_AES_128
    }

    fn name(&self) -> &str {
        "AES-128 (legacy)"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn key_bits(&self) -> usize {
        128
    }

    fn create_passphrase_key(&self, passphrase: &SecretString) -> Result<DerivedKey> {
        DerivedKey::legacy(passphrase, self.key_bits())
    }

    // Stored parameters are not part of the legacy scheme
    fn restore_passphrase_key(
        &self,
        passphrase: &SecretString,
        _salt: &[u8],
        _iterations: u32,
    ) -> Result<DerivedKey> {
        DerivedKey::legacy(passphrase, self.key_bits())
    }
}

/// Ordered catalog of installed suites.
#[derive(Clone, Default)]
pub struct CryptoRegistry {
    factories: Vec<Arc<dyn CryptoFactory>>,
    default_id: Option<CryptoId>,
    legacy_id: Option<CryptoId>,
}

impl CryptoRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the legacy, AES-128 and AES-256 suites, AES-256 as default.
    pub fn standard(iterations: u32) -> Self {
        let mut registry = Self::empty();
        registry.register_legacy(Arc::new(LegacyAesFactory));
        registry.register(Arc::new(
            VersionedAesFactory::new(ids::AES_128, "AES-128", 50, 128).with_iterations(iterations),
        ));
        registry.register_default(Arc::new(
            VersionedAesFactory::new(ids::AES_256, "AES-256", 100, 256).with_iterations(iterations),
        ));
        registry
    }

    /// Install a suite. Re-registering an id replaces it in place.
    pub fn register(&mut self, factory: Arc<dyn CryptoFactory>) {
        debug!(suite = %factory.id(), name = factory.name(), "registering crypto suite");
        match self.factories.iter_mut().find(|f| f.id() == factory.id()) {
            Some(slot) => *slot = factory,
            None => self.factories.push(factory),
        }
    }

    /// Install a suite and mark it as the default for encryption.
    pub fn register_default(&mut self, factory: Arc<dyn CryptoFactory>) {
        self.default_id = Some(factory.id());
        self.register(factory);
    }

    /// Install a suite and mark it as the legacy compatibility scheme.
    pub fn register_legacy(&mut self, factory: Arc<dyn CryptoFactory>) {
        self.legacy_id = Some(factory.id());
        self.register(factory);
    }

    pub fn set_default(&mut self, id: CryptoId) -> Result<()> {
        self.get(id)?;
        if Some(id) == self.legacy_id {
            return Err(AxCryptError::usage("the legacy suite cannot be the default"));
        }
        self.default_id = Some(id);
        Ok(())
    }

    pub fn get(&self, id: CryptoId) -> Result<&dyn CryptoFactory> {
        self.factories
            .iter()
            .find(|f| f.id() == id)
            .map(|f| f.as_ref())
            .ok_or(AxCryptError::UnsupportedSuite(id))
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn CryptoFactory> {
        self.factories
            .iter()
            .find(|f| f.name().eq_ignore_ascii_case(name))
            .map(|f| f.as_ref())
    }

    pub fn is_legacy(&self, id: CryptoId) -> bool {
        self.legacy_id == Some(id)
    }

    /// The suite for new files: the marked default, else the highest priority non-legacy suite.
    pub fn default_for_encryption(&self) -> Result<&dyn CryptoFactory> {
        if let Some(id) = self.default_id {
            return self.get(id);
        }
        self.factories
            .iter()
            .filter(|f| Some(f.id()) != self.legacy_id)
            .max_by_key(|f| f.priority())
            .map(|f| f.as_ref())
            .ok_or_else(|| AxCryptError::usage("no crypto suite available for encryption"))
    }

    pub fn legacy(&self) -> Option<&dyn CryptoFactory> {
        self.legacy_id.and_then(|id| self.get(id).ok())
    }

    /// Candidate suites for decryption: default first, then every other suite
    /// in registration order, legacy last.
    pub fn ordered_trial_ids(&self) -> Vec<CryptoId> {
        let default_id = self.default_for_encryption().ok().map(|f| f.id());
        let mut ids = Vec::with_capacity(self.factories.len());
        ids.extend(default_id);
        ids.extend(
            self.factories
                .iter()
                .map(|f| f.id())
                .filter(|id| Some(*id) != default_id && Some(*id) != self.legacy_id),
        );
        if let Some(legacy) = self.legacy_id {
            if self.get(legacy).is_ok() && Some(legacy) != default_id {
                ids.push(legacy);
            }
        }
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn CryptoFactory> {
        self.factories.iter().map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for CryptoRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoRegistry")
            .field("suites", &self.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .field("default", &self.default_id)
            .field("legacy", &self.legacy_id)
            .finish()
    }
}
