//! Symmetric primitives composed from the AES block function.
//!
//! - [`StreamCipher`]: AES-CTR that can start at any keystream offset, so a
//!   reader can resume mid-payload without touching earlier bytes.
//! - CBC helpers for the fixed, already padded header block fields.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256, Block};
use zeroize::Zeroize;

use crate::error::{AxCryptError, Result};

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// AES keyed for either supported key length
#[derive(Clone)]
pub(crate) enum AesBlock {
    Aes128(Aes128),
    Aes256(Aes256),
}

impl AesBlock {
    pub(crate) fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 => Aes128::new_from_slice(key)
                .map(Self::Aes128)
                .map_err(|_| AxCryptError::key("invalid AES-128 key")),
            32 => Aes256::new_from_slice(key)
                .map(Self::Aes256)
                .map_err(|_| AxCryptError::key("invalid AES-256 key")),
            n => Err(AxCryptError::key(format!(
                "AES key must be 16 or 32 bytes, got {}",
                n
            ))),
        }
    }

    pub(crate) fn encrypt(&self, bytes: &mut [u8; BLOCK_SIZE]) {
        let mut block = Block::from(*bytes);
        match self {
            Self::Aes128(c) => c.encrypt_block(&mut block),
            Self::Aes256(c) => c.encrypt_block(&mut block),
        }
        bytes.copy_from_slice(&block);
    }

    pub(crate) fn decrypt(&self, bytes: &mut [u8; BLOCK_SIZE]) {
        let mut block = Block::from(*bytes);
        match self {
            Self::Aes128(c) => c.decrypt_block(&mut block),
            Self::Aes256(c) => c.decrypt_block(&mut block),
        }
        bytes.copy_from_slice(&block);
    }
}

/// AES in counter mode with a big-endian 128-bit counter seeded by the IV.
pub struct StreamCipher {
    aes: AesBlock,
    counter: u128,
    keystream: [u8; BLOCK_SIZE],
    used: usize,
}

impl StreamCipher {
    /// Create a cipher positioned `offset` bytes into the keystream.
    pub fn new(key: &[u8], iv: &[u8; BLOCK_SIZE], offset: u64) -> Result<Self> {
        let aes = AesBlock::new(key)?;
        let counter = u128::from_be_bytes(*iv).wrapping_add(u128::from(offset / BLOCK_SIZE as u64));
        let mut cipher = Self {
            aes,
            counter,
            keystream: [0u8; BLOCK_SIZE],
            used: BLOCK_SIZE,
        };
        let skip = (offset % BLOCK_SIZE as u64) as usize;
        if skip > 0 {
            cipher.refill();
            cipher.used = skip;
        }
        Ok(cipher)
    }

    fn refill(&mut self) {
        self.keystream = self.counter.to_be_bytes();
        self.aes.encrypt(&mut self.keystream);
        self.counter = self.counter.wrapping_add(1);
        self.used = 0;
    }

    /// XOR the keystream into `data` in place. Encryption and decryption are the same call.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.used == BLOCK_SIZE {
                self.refill();
            }
            *byte ^= self.keystream[self.used];
            self.used += 1;
        }
    }
}

impl Drop for StreamCipher {
    fn drop(&mut self) {
        self.keystream.zeroize();
    }
}

/// CBC-encrypt `data` in place. The length must already be a multiple of the block size.
pub(crate) fn cbc_encrypt(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(AxCryptError::usage("CBC input is not block aligned"));
    }
    let aes = AesBlock::new(key)?;
    let mut prev = *iv;
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        for (b, (p, c)) in block.iter_mut().zip(prev.iter().zip(chunk.iter())) {
            *b = p ^ c;
        }
        aes.encrypt(&mut block);
        chunk.copy_from_slice(&block);
        prev = block;
    }
    Ok(())
}

/// CBC-decrypt `data` in place. A misaligned length means the block is damaged.
pub(crate) fn cbc_decrypt(key: &[u8], iv: &[u8; BLOCK_SIZE], data: &mut [u8]) -> Result<()> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(AxCryptError::malformed(format!(
            "encrypted field length {} is not a multiple of {}",
            data.len(),
            BLOCK_SIZE
        )));
    }
    let aes = AesBlock::new(key)?;
    let mut prev = *iv;
    for chunk in data.chunks_exact_mut(BLOCK_SIZE) {
        let mut block = [0u8; BLOCK_SIZE];
        block.copy_from_slice(chunk);
        let saved = block;
        aes.decrypt(&mut block);
        for (c, (b, p)) in chunk.iter_mut().zip(block.iter().zip(prev.iter())) {
            *c = b ^ p;
        }
        prev = saved;
    }
    Ok(())
}
