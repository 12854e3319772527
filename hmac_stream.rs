//! Write-side keyed MAC accumulator.
//!
//! [`HmacStream`] runs HMAC-SHA512 over every byte written to it and can
//! forward the same bytes to a chained writer, so computing the tag and
//! writing the output is a single pass. The tag is the first 16 bytes of the
//! digest; it is computed once and cached.

use std::io::{self, Write};

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::error::{AxCryptError, Result};
use crate::keys::SymmetricKey;

type HmacSha512 = Hmac<Sha512>;

/// Length of the stored authentication tag
pub const TAG_LEN: usize = 16;

pub type Tag = [u8; TAG_LEN];

pub struct HmacStream<W = io::Sink> {
    mac: Option<HmacSha512>,
    tag: Option<Tag>,
    chained: Option<W>,
    written: u64,
}

impl HmacStream<io::Sink> {
    /// MAC-only stream with no downstream writer.
    pub fn new(key: &SymmetricKey) -> Result<Self> {
        Self::build(key, None)
    }
}

impl<W: Write> HmacStream<W> {
    /// MAC stream that also forwards every byte to `chained`.
    pub fn with_chained(key: &SymmetricKey, chained: W) -> Result<Self> {
        Self::build(key, Some(chained))
    }

    fn build(key: &SymmetricKey, chained: Option<W>) -> Result<Self> {
        let mac = <HmacSha512 as Mac>::new_from_slice(key.as_bytes())
            .map_err(|_| AxCryptError::key("invalid HMAC key"))?;
        Ok(Self {
            mac: Some(mac),
            tag: None,
            chained,
            written: 0,
        })
    }

    /// The truncated tag. The first call finalizes the digest; later calls
    /// return the cached value and further writes are rejected.
    pub fn tag(&mut self) -> Tag {
        if let Some(tag) = self.tag {
            return tag;
        }
        let mut tag = [0u8; TAG_LEN];
        if let Some(mac) = self.mac.take() {
            tag.copy_from_slice(&mac.finalize().into_bytes()[..TAG_LEN]);
        }
        self.tag = Some(tag);
        tag
    }

    /// Constant-time comparison of the computed tag with `expected`.
    pub fn verify(&mut self, expected: &[u8]) -> bool {
        let tag = self.tag();
        expected.len() == TAG_LEN && bool::from(tag[..].ct_eq(expected))
    }

    /// Bytes accumulated so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn chained_mut(&mut self) -> Option<&mut W> {
        self.chained.as_mut()
    }

    pub fn into_chained(self) -> Option<W> {
        self.chained
    }
}

impl<W: Write> Write for HmacStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(mac) = self.mac.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "HMAC stream written after the tag was finalized",
            ));
        };
        let n = match self.chained.as_mut() {
            Some(w) => w.write(buf)?,
            None => buf.len(),
        };
        mac.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.chained.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}
