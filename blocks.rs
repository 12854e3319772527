//! Header block model.
//!
//! ## Wire layout
//!
//! ```text
//! [length:u32 LE][type:u8][payload:length-5]
//! ```
//!
//! `length` counts the 5-byte prefix. Blocks are a closed set of known kinds
//! plus [`HeaderBlock::Unrecognized`], which preserves unknown tags verbatim.
//!
//! ## Encrypted blocks
//!
//! Sensitive blocks hold only ciphertext ([`Sealed`]). Their plaintext is
//! `field bytes · terminator · zero padding to 16`, AES-CBC encrypted under
//! the header key with an IV derived from the block type. Decryption is an
//! explicit call that takes a [`HeaderCrypto`]; nothing caches plaintext.

use std::fmt;
use std::io::{self, Write};
use std::marker::PhantomData;

use chrono::{DateTime, Utc};

use crate::cipher::{cbc_decrypt, cbc_encrypt, BLOCK_SIZE};
use crate::error::{AxCryptError, Result};
use crate::keys::{header_iv, SymmetricKey};
use crate::suite::CryptoId;

/// Marker that precedes the first header block
pub const MAGIC: [u8; 16] = [
    0xC0, 0xB9, 0x07, 0x2E, 0x4F, 0x93, 0xF1, 0x46, 0xA0, 0x15, 0x79, 0x2C, 0xA1, 0xD9, 0xE8, 0x21,
];

/// Length field plus type byte
pub const BLOCK_PREFIX_LEN: usize = 5;

/// Largest payload a block may declare
pub const MAX_BLOCK_PAYLOAD: usize = 0xFFFFF;

/// Container format version written by this crate
pub const FORMAT_VERSION: VersionBlock = VersionBlock {
    major: 4,
    minor: 0,
    minuscule: 0,
};

/// Length of the preamble nonce
pub const PREAMBLE_NONCE_LEN: usize = 16;

/// Length of a recipient tag (truncated public key fingerprint)
pub const RECIPIENT_TAG_LEN: usize = 8;

/// Block discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Preamble,
    Version,
    KeyWrap,
    AsymmetricKeyWrap,
    IdTag,
    Data,
    Encrypted,
    FileNameInfo,
    EncryptionInfo,
    CompressionInfo,
    FileInfo,
    Compression,
    UnicodeFileNameInfo,
    Unrecognized(u8),
}

impl BlockType {
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            2 => Self::Preamble,
            3 => Self::Version,
            4 => Self::KeyWrap,
            5 => Self::AsymmetricKeyWrap,
            6 => Self::IdTag,
            63 => Self::Data,
            64 => Self::Encrypted,
            65 => Self::FileNameInfo,
            66 => Self::EncryptionInfo,
            67 => Self::CompressionInfo,
            68 => Self::FileInfo,
            69 => Self::Compression,
            70 => Self::UnicodeFileNameInfo,
            other => Self::Unrecognized(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Preamble => 2,
            Self::Version => 3,
            Self::KeyWrap => 4,
            Self::AsymmetricKeyWrap => 5,
            Self::IdTag => 6,
            Self::Data => 63,
            Self::Encrypted => 64,
            Self::FileNameInfo => 65,
            Self::EncryptionInfo => 66,
            Self::CompressionInfo => 67,
            Self::FileInfo => 68,
            Self::Compression => 69,
            Self::UnicodeFileNameInfo => 70,
            Self::Unrecognized(tag) => tag,
        }
    }

    /// Whether the payload is ciphertext under the header key.
    pub fn is_encrypted(self) -> bool {
        matches!(
            self,
            Self::Encrypted
                | Self::FileNameInfo
                | Self::EncryptionInfo
                | Self::CompressionInfo
                | Self::FileInfo
                | Self::Compression
                | Self::UnicodeFileNameInfo
        )
    }
}

/// Block-scoped cipher handle. Borrows the header key; never owns it.
#[derive(Clone, Copy)]
pub struct HeaderCrypto<'k> {
    key: &'k SymmetricKey,
}

impl<'k> HeaderCrypto<'k> {
    pub fn new(key: &'k SymmetricKey) -> Self {
        Self { key }
    }

    fn encrypt(&self, block_type: BlockType, mut plaintext: Vec<u8>) -> Result<Vec<u8>> {
        let iv = header_iv(self.key, block_type.tag())?;
        cbc_encrypt(self.key.as_bytes(), &iv, &mut plaintext)?;
        Ok(plaintext)
    }

    fn decrypt(&self, block_type: BlockType, ciphertext: &[u8]) -> Result<zeroize::Zeroizing<Vec<u8>>> {
        let iv = header_iv(self.key, block_type.tag())?;
        let mut plaintext = zeroize::Zeroizing::new(ciphertext.to_vec());
        cbc_decrypt(self.key.as_bytes(), &iv, &mut plaintext)?;
        Ok(plaintext)
    }
}

/// Plaintext schema of one encrypted block kind.
pub trait Field {
    const BLOCK_TYPE: BlockType;
    /// Zero bytes appended after the field bytes
    const TERMINATOR_LEN: usize = 1;
    type Plain;

    fn encode(value: &Self::Plain) -> Result<Vec<u8>>;

    /// Decode from the padded plaintext.
    fn decode(bytes: &[u8]) -> Result<Self::Plain>;
}

/// Ciphertext of an encrypted block whose plaintext follows schema `F`.
pub struct Sealed<F> {
    ciphertext: Vec<u8>,
    _field: PhantomData<F>,
}

impl<F: Field> Sealed<F> {
    pub fn seal(value: &F::Plain, crypto: &HeaderCrypto<'_>) -> Result<Self> {
        let mut plaintext = F::encode(value)?;
        plaintext.resize(plaintext.len() + F::TERMINATOR_LEN, 0);
        let padded = plaintext.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        plaintext.resize(padded, 0);
        let ciphertext = crypto.encrypt(F::BLOCK_TYPE, plaintext)?;
        Ok(Self::from_ciphertext(ciphertext))
    }

    pub fn decrypt(&self, crypto: &HeaderCrypto<'_>) -> Result<F::Plain> {
        let plaintext = crypto.decrypt(F::BLOCK_TYPE, &self.ciphertext)?;
        F::decode(&plaintext)
    }

    pub fn from_ciphertext(ciphertext: Vec<u8>) -> Self {
        Self {
            ciphertext,
            _field: PhantomData,
        }
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }
}

impl<F> Clone for Sealed<F> {
    fn clone(&self) -> Self {
        Self {
            ciphertext: self.ciphertext.clone(),
            _field: PhantomData,
        }
    }
}

impl<F> PartialEq for Sealed<F> {
    fn eq(&self, other: &Self) -> bool {
        self.ciphertext == other.ciphertext
    }
}

impl<F> Eq for Sealed<F> {}

impl<F> fmt::Debug for Sealed<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sealed({} bytes)", self.ciphertext.len())
    }
}

fn field_prefix<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| AxCryptError::malformed(format!("{} field is shorter than {} bytes", what, N)))
}

/// Narrow file name (ASCII; anything else becomes `_`).
pub struct FileName;

impl Field for FileName {
    const BLOCK_TYPE: BlockType = BlockType::FileNameInfo;
    type Plain = String;

    fn encode(value: &String) -> Result<Vec<u8>> {
        Ok(value
            .chars()
            .map(|c| if c.is_ascii() && c != '\0' { c as u8 } else { b'_' })
            .collect())
    }

    fn decode(bytes: &[u8]) -> Result<String> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(bytes[..end].iter().map(|&b| b as char).collect())
    }
}

/// Full file name as UTF-16LE.
pub struct UnicodeFileName;

impl Field for UnicodeFileName {
    const BLOCK_TYPE: BlockType = BlockType::UnicodeFileNameInfo;
    const TERMINATOR_LEN: usize = 2;
    type Plain = String;

    fn encode(value: &String) -> Result<Vec<u8>> {
        Ok(value.encode_utf16().flat_map(u16::to_le_bytes).collect())
    }

    fn decode(bytes: &[u8]) -> Result<String> {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();
        String::from_utf16(&units)
            .map_err(|_| AxCryptError::malformed("file name is not valid UTF-16"))
    }
}

/// Payload parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionParams {
    /// Plaintext length before compression
    pub plaintext_length: u64,
    /// Initial counter block for the payload cipher
    pub iv: [u8; BLOCK_SIZE],
}

pub struct EncryptionInfo;

impl Field for EncryptionInfo {
    const BLOCK_TYPE: BlockType = BlockType::EncryptionInfo;
    type Plain = EncryptionParams;

    fn encode(value: &EncryptionParams) -> Result<Vec<u8>> {
        let mut out = value.plaintext_length.to_le_bytes().to_vec();
        out.extend_from_slice(&value.iv);
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<EncryptionParams> {
        let raw: [u8; 24] = field_prefix(bytes, "encryption info")?;
        let mut length = [0u8; 8];
        length.copy_from_slice(&raw[..8]);
        let mut iv = [0u8; BLOCK_SIZE];
        iv.copy_from_slice(&raw[8..]);
        Ok(EncryptionParams {
            plaintext_length: u64::from_le_bytes(length),
            iv,
        })
    }
}

/// Uncompressed length of a compressed payload.
pub struct CompressionInfo;

impl Field for CompressionInfo {
    const BLOCK_TYPE: BlockType = BlockType::CompressionInfo;
    type Plain = u64;

    fn encode(value: &u64) -> Result<Vec<u8>> {
        Ok(value.to_le_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<u64> {
        Ok(u64::from_le_bytes(field_prefix(bytes, "compression info")?))
    }
}

/// Whether the payload is zlib compressed.
pub struct Compression;

impl Field for Compression {
    const BLOCK_TYPE: BlockType = BlockType::Compression;
    type Plain = bool;

    fn encode(value: &bool) -> Result<Vec<u8>> {
        Ok(u32::from(*value).to_le_bytes().to_vec())
    }

    fn decode(bytes: &[u8]) -> Result<bool> {
        Ok(u32::from_le_bytes(field_prefix(bytes, "compression")?) != 0)
    }
}

/// File system timestamps of the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    pub created: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FileTimes {
    /// All three set to the current time, truncated to what the block stores.
    pub fn now() -> Self {
        let now = Utc::now();
        let now = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        Self {
            created: now,
            accessed: now,
            modified: now,
        }
    }
}

pub struct FileInfo;

impl Field for FileInfo {
    const BLOCK_TYPE: BlockType = BlockType::FileInfo;
    type Plain = FileTimes;

    fn encode(value: &FileTimes) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(24);
        for time in [value.created, value.accessed, value.modified] {
            out.extend_from_slice(&time.timestamp_millis().to_le_bytes());
        }
        Ok(out)
    }

    fn decode(bytes: &[u8]) -> Result<FileTimes> {
        let raw: [u8; 24] = field_prefix(bytes, "file info")?;
        let time = |i: usize| -> Result<DateTime<Utc>> {
            let mut ms = [0u8; 8];
            ms.copy_from_slice(&raw[i * 8..i * 8 + 8]);
            DateTime::from_timestamp_millis(i64::from_le_bytes(ms))
                .ok_or_else(|| AxCryptError::malformed("file time out of range"))
        };
        Ok(FileTimes {
            created: time(0)?,
            accessed: time(1)?,
            modified: time(2)?,
        })
    }
}

/// Generic wrapper sealing an entire inner block.
pub struct Wrapped;

impl Field for Wrapped {
    const BLOCK_TYPE: BlockType = BlockType::Encrypted;
    type Plain = HeaderBlock;

    fn encode(value: &HeaderBlock) -> Result<Vec<u8>> {
        if !value.can_be_wrapped() {
            return Err(AxCryptError::usage(format!(
                "{:?} blocks cannot be wrapped",
                value.block_type()
            )));
        }
        value.to_bytes()
    }

    fn decode(bytes: &[u8]) -> Result<HeaderBlock> {
        let prefix: [u8; BLOCK_PREFIX_LEN] = field_prefix(bytes, "wrapped block")?;
        let length = payload_length(u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]))?;
        let payload = bytes
            .get(BLOCK_PREFIX_LEN..BLOCK_PREFIX_LEN + length)
            .ok_or_else(|| AxCryptError::malformed("wrapped block overruns its container"))?;
        let inner = HeaderBlock::from_raw(prefix[4], payload.to_vec())?;
        if !inner.can_be_wrapped() {
            return Err(AxCryptError::malformed(format!(
                "{:?} block found inside an encrypted wrapper",
                inner.block_type()
            )));
        }
        Ok(inner)
    }
}

/// Validate a raw length field and return the payload length it announces.
pub fn payload_length(field: u32) -> Result<usize> {
    let total = field as usize;
    if total < BLOCK_PREFIX_LEN || total - BLOCK_PREFIX_LEN > MAX_BLOCK_PAYLOAD {
        return Err(AxCryptError::malformed(format!(
            "invalid header block length {}",
            field
        )));
    }
    Ok(total - BLOCK_PREFIX_LEN)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub nonce: [u8; PREAMBLE_NONCE_LEN],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionBlock {
    pub major: u8,
    pub minor: u8,
    pub minuscule: u8,
}

/// Content key wrapped under a passphrase-derived key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyWrapBlock {
    pub iterations: u32,
    pub salt: Vec<u8>,
    pub wrapped: Vec<u8>,
}

/// Content key wrapped for one recipient's public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsymmetricKeyWrapBlock {
    pub suite: CryptoId,
    pub recipient_tag: [u8; RECIPIENT_TAG_LEN],
    pub ephemeral_public: [u8; 32],
    pub wrapped: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderBlock {
    Preamble(Preamble),
    Version(VersionBlock),
    KeyWrap(KeyWrapBlock),
    AsymmetricKeyWrap(AsymmetricKeyWrapBlock),
    IdTag(String),
    /// Ciphertext payload length
    Data(u64),
    Encrypted(Sealed<Wrapped>),
    FileNameInfo(Sealed<FileName>),
    EncryptionInfo(Sealed<EncryptionInfo>),
    CompressionInfo(Sealed<CompressionInfo>),
    FileInfo(Sealed<FileInfo>),
    Compression(Sealed<Compression>),
    UnicodeFileNameInfo(Sealed<UnicodeFileName>),
    Unrecognized { tag: u8, payload: Vec<u8> },
}

impl HeaderBlock {
    /// Build the typed block for a tag and payload.
    pub fn from_raw(tag: u8, payload: Vec<u8>) -> Result<Self> {
        let block_type = BlockType::from_tag(tag);
        let block = match block_type {
            BlockType::Preamble => {
                let nonce = payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| AxCryptError::malformed("preamble must hold a 16 byte nonce"))?;
                Self::Preamble(Preamble { nonce })
            }
            BlockType::Version => match payload.as_slice() {
                [major, minor, minuscule, ..] => Self::Version(VersionBlock {
                    major: *major,
                    minor: *minor,
                    minuscule: *minuscule,
                }),
                _ => return Err(AxCryptError::malformed("version block too short")),
            },
            BlockType::KeyWrap => Self::KeyWrap(parse_key_wrap(&payload)?),
            BlockType::AsymmetricKeyWrap => {
                Self::AsymmetricKeyWrap(parse_asymmetric_key_wrap(&payload)?)
            }
            BlockType::IdTag => Self::IdTag(
                String::from_utf8(payload)
                    .map_err(|_| AxCryptError::malformed("id tag is not valid UTF-8"))?,
            ),
            BlockType::Data => {
                let length: [u8; 8] = payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| AxCryptError::malformed("data block must hold a u64 length"))?;
                Self::Data(u64::from_le_bytes(length))
            }
            BlockType::Encrypted => Self::Encrypted(Sealed::from_ciphertext(payload)),
            BlockType::FileNameInfo => Self::FileNameInfo(Sealed::from_ciphertext(payload)),
            BlockType::EncryptionInfo => Self::EncryptionInfo(Sealed::from_ciphertext(payload)),
            BlockType::CompressionInfo => Self::CompressionInfo(Sealed::from_ciphertext(payload)),
            BlockType::FileInfo => Self::FileInfo(Sealed::from_ciphertext(payload)),
            BlockType::Compression => Self::Compression(Sealed::from_ciphertext(payload)),
            BlockType::UnicodeFileNameInfo => {
                Self::UnicodeFileNameInfo(Sealed::from_ciphertext(payload))
            }
            BlockType::Unrecognized(tag) => Self::Unrecognized { tag, payload },
        };
        Ok(block)
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Self::Preamble(_) => BlockType::Preamble,
            Self::Version(_) => BlockType::Version,
            Self::KeyWrap(_) => BlockType::KeyWrap,
            Self::AsymmetricKeyWrap(_) => BlockType::AsymmetricKeyWrap,
            Self::IdTag(_) => BlockType::IdTag,
            Self::Data(_) => BlockType::Data,
            Self::Encrypted(_) => BlockType::Encrypted,
            Self::FileNameInfo(_) => BlockType::FileNameInfo,
            Self::EncryptionInfo(_) => BlockType::EncryptionInfo,
            Self::CompressionInfo(_) => BlockType::CompressionInfo,
            Self::FileInfo(_) => BlockType::FileInfo,
            Self::Compression(_) => BlockType::Compression,
            Self::UnicodeFileNameInfo(_) => BlockType::UnicodeFileNameInfo,
            Self::Unrecognized { tag, .. } => BlockType::Unrecognized(*tag),
        }
    }

    /// Raw payload bytes as they appear on the wire.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Preamble(p) => p.nonce.to_vec(),
            Self::Version(v) => vec![v.major, v.minor, v.minuscule],
            Self::KeyWrap(k) => {
                let mut out = k.iterations.to_le_bytes().to_vec();
                out.push(k.salt.len() as u8);
                out.extend_from_slice(&k.salt);
                out.push(k.wrapped.len() as u8);
                out.extend_from_slice(&k.wrapped);
                out
            }
            Self::AsymmetricKeyWrap(a) => {
                let mut out = a.suite.as_bytes().to_vec();
                out.extend_from_slice(&a.recipient_tag);
                out.extend_from_slice(&a.ephemeral_public);
                out.extend_from_slice(&a.wrapped);
                out
            }
            Self::IdTag(tag) => tag.as_bytes().to_vec(),
            Self::Data(length) => length.to_le_bytes().to_vec(),
            Self::Encrypted(s) => s.ciphertext().to_vec(),
            Self::FileNameInfo(s) => s.ciphertext().to_vec(),
            Self::EncryptionInfo(s) => s.ciphertext().to_vec(),
            Self::CompressionInfo(s) => s.ciphertext().to_vec(),
            Self::FileInfo(s) => s.ciphertext().to_vec(),
            Self::Compression(s) => s.ciphertext().to_vec(),
            Self::UnicodeFileNameInfo(s) => s.ciphertext().to_vec(),
            Self::Unrecognized { payload, .. } => payload.clone(),
        }
    }

    /// Serialized block including the length and type prefix.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = self.payload();
        if payload.len() > MAX_BLOCK_PAYLOAD {
            return Err(AxCryptError::usage(format!(
                "{:?} block payload of {} bytes exceeds the limit",
                self.block_type(),
                payload.len()
            )));
        }
        let total = (payload.len() + BLOCK_PREFIX_LEN) as u32;
        let mut out = Vec::with_capacity(payload.len() + BLOCK_PREFIX_LEN);
        out.extend_from_slice(&total.to_le_bytes());
        out.push(self.block_type().tag());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes).map_err(AxCryptError::from)
    }

    fn can_be_wrapped(&self) -> bool {
        !matches!(
            self,
            Self::Preamble(_) | Self::Data(_) | Self::Encrypted(_) | Self::Version(_)
        )
    }
}

fn parse_key_wrap(payload: &[u8]) -> Result<KeyWrapBlock> {
    let bad = || AxCryptError::malformed("truncated key wrap block");
    let iterations = u32::from_le_bytes(field_prefix(payload, "key wrap")?);
    let rest = &payload[4..];
    let (&salt_len, rest) = rest.split_first().ok_or_else(bad)?;
    let salt = rest.get(..salt_len as usize).ok_or_else(bad)?;
    let rest = &rest[salt_len as usize..];
    let (&wrapped_len, rest) = rest.split_first().ok_or_else(bad)?;
    let wrapped = rest.get(..wrapped_len as usize).ok_or_else(bad)?;
    Ok(KeyWrapBlock {
        iterations,
        salt: salt.to_vec(),
        wrapped: wrapped.to_vec(),
    })
}

fn parse_asymmetric_key_wrap(payload: &[u8]) -> Result<AsymmetricKeyWrapBlock> {
    const FIXED: usize = 16 + RECIPIENT_TAG_LEN + 32;
    if payload.len() <= FIXED {
        return Err(AxCryptError::malformed("truncated asymmetric key wrap block"));
    }
    let mut suite = [0u8; 16];
    suite.copy_from_slice(&payload[..16]);
    let mut recipient_tag = [0u8; RECIPIENT_TAG_LEN];
    recipient_tag.copy_from_slice(&payload[16..16 + RECIPIENT_TAG_LEN]);
    let mut ephemeral_public = [0u8; 32];
    ephemeral_public.copy_from_slice(&payload[16 + RECIPIENT_TAG_LEN..FIXED]);
    Ok(AsymmetricKeyWrapBlock {
        suite: CryptoId::from_bytes(suite),
        recipient_tag,
        ephemeral_public,
        wrapped: payload[FIXED..].to_vec(),
    })
}

/// Write raw bytes as one block, for callers that already hold a payload.
pub fn write_raw_block<W: Write>(writer: &mut W, tag: u8, payload: &[u8]) -> io::Result<()> {
    let total = (payload.len() + BLOCK_PREFIX_LEN) as u32;
    writer.write_all(&total.to_le_bytes())?;
    writer.write_all(&[tag])?;
    writer.write_all(payload)
}
