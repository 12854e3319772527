//! Whole-container encryption and decryption.
//!
//! ## Layout written by [`encrypt`]
//!
//! ```text
//! MAGIC
//! Preamble · Version · KeyWrap* · AsymmetricKeyWrap* · Encrypted(IdTag)?
//! FileInfo · FileNameInfo · UnicodeFileNameInfo · EncryptionInfo
//! Compression · CompressionInfo? · Data
//! payload (AES-CTR)
//! tag (16 bytes)
//! ```
//!
//! The tag covers everything from the Preamble through the payload. When the
//! payload length is unknown up front, or compression is on, ciphertext is
//! spooled to an anonymous temp file first. Plaintext never touches disk.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use secrecy::SecretString;
use tracing::{debug, info, warn};
use x25519_dalek::PublicKey;

use crate::blocks::{
    EncryptionParams, FileTimes, HeaderBlock, HeaderCrypto, KeyWrapBlock, Preamble, Sealed,
    VersionBlock, FORMAT_VERSION, MAGIC, PREAMBLE_NONCE_LEN,
};
use crate::cipher::{StreamCipher, BLOCK_SIZE};
use crate::error::{AxCryptError, Result};
use crate::hmac_stream::HmacStream;
use crate::keypair::{wrap_for_recipient, UserKeyPair};
use crate::keys::{random_bytes, SubKeys, SymmetricKey};
use crate::keywrap;
use crate::reader::{AxCryptReader, ReadItem};
use crate::streaming::{check_cancelled, pump, CipherReader, CipherWriter, NoProgress, Progress};
use crate::suite::{CryptoFactory, CryptoId, CryptoRegistry};

/// What to encrypt for whom.
#[derive(Default)]
pub struct EncryptOptions {
    /// Suite to use; the registry default when absent
    pub suite: Option<CryptoId>,
    pub passphrases: Vec<SecretString>,
    pub recipients: Vec<PublicKey>,
    pub file_name: String,
    /// Defaults to the current time
    pub file_times: Option<FileTimes>,
    pub compress: bool,
    pub id_tag: Option<String>,
}

impl EncryptOptions {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            ..Self::default()
        }
    }

    pub fn with_passphrase(mut self, passphrase: SecretString) -> Self {
        self.passphrases.push(passphrase);
        self
    }

    pub fn with_recipient(mut self, public_key: PublicKey) -> Self {
        self.recipients.push(public_key);
        self
    }

    pub fn with_suite(mut self, suite: CryptoId) -> Self {
        self.suite = Some(suite);
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_file_times(mut self, times: FileTimes) -> Self {
        self.file_times = Some(times);
        self
    }

    pub fn with_id_tag(mut self, tag: impl Into<String>) -> Self {
        self.id_tag = Some(tag.into());
        self
    }
}

/// One candidate secret for decryption.
pub enum Credential {
    /// A passphrase, optionally restricted to one suite
    Passphrase {
        secret: SecretString,
        suite: Option<CryptoId>,
    },
    KeyPair(UserKeyPair),
}

impl Credential {
    pub fn passphrase(secret: impl Into<String>) -> Self {
        Self::Passphrase {
            secret: SecretString::from(secret.into()),
            suite: None,
        }
    }
}

/// Headers recovered from a successfully authenticated container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedDocument {
    pub file_name: String,
    pub file_times: Option<FileTimes>,
    pub plaintext_length: u64,
    pub compressed: bool,
    pub suite: CryptoId,
    pub version: VersionBlock,
    pub id_tag: Option<String>,
}

/// Encrypt `input` into a container on `output`. Returns the plaintext length.
///
/// With `declared_length` and no compression the payload streams straight
/// through; a length mismatch is a usage fault.
pub fn encrypt<R: Read, W: Write>(
    registry: &CryptoRegistry,
    mut input: R,
    declared_length: Option<u64>,
    mut output: W,
    options: &EncryptOptions,
    progress: &dyn Progress,
) -> Result<u64> {
    let suite = match options.suite {
        Some(id) => registry.get(id)?,
        None => registry.default_for_encryption()?,
    };
    if registry.is_legacy(suite.id()) {
        return Err(AxCryptError::usage(format!(
            "{} can only be used for decryption",
            suite.name()
        )));
    }
    if options.passphrases.is_empty() && options.recipients.is_empty() {
        return Err(AxCryptError::usage(
            "at least one passphrase or recipient is required",
        ));
    }
    debug!(suite = suite.name(), compress = options.compress, "encrypting container");

    let content_key = SymmetricKey::random(suite.key_len());
    let nonce = random_bytes::<PREAMBLE_NONCE_LEN>();
    let keys = SubKeys::derive(&content_key, &nonce)?;
    let data_iv = random_bytes::<BLOCK_SIZE>();

    let mut spool = None;
    let (plaintext_length, payload_length) = match declared_length {
        Some(length) if !options.compress => (length, length),
        _ => {
            let cipher = suite.create_cipher(&keys.data, &data_iv, 0)?;
            let (file, read, written) =
                spool_payload(&mut input, cipher, options.compress, progress)?;
            if let Some(declared) = declared_length {
                if declared != read {
                    return Err(length_mismatch(declared, read));
                }
            }
            spool = Some(file);
            (read, written)
        }
    };

    let crypto = HeaderCrypto::new(&keys.header);
    let mut headers = vec![
        HeaderBlock::Preamble(Preamble { nonce }),
        HeaderBlock::Version(FORMAT_VERSION),
    ];
    for passphrase in &options.passphrases {
        let derived = suite.create_passphrase_key(passphrase)?;
        headers.push(HeaderBlock::KeyWrap(KeyWrapBlock {
            iterations: derived.iterations(),
            salt: derived.salt().to_vec(),
            wrapped: keywrap::wrap(derived.key().as_bytes(), content_key.as_bytes())?,
        }));
    }
    for recipient in &options.recipients {
        headers.push(HeaderBlock::AsymmetricKeyWrap(wrap_for_recipient(
            &content_key,
            suite.id(),
            recipient,
        )?));
    }
    if let Some(tag) = &options.id_tag {
        headers.push(HeaderBlock::Encrypted(Sealed::seal(
            &HeaderBlock::IdTag(tag.clone()),
            &crypto,
        )?));
    }
    let times = options.file_times.unwrap_or_else(FileTimes::now);
    headers.push(HeaderBlock::FileInfo(Sealed::seal(&times, &crypto)?));
    headers.push(HeaderBlock::FileNameInfo(Sealed::seal(&options.file_name, &crypto)?));
    headers.push(HeaderBlock::UnicodeFileNameInfo(Sealed::seal(
        &options.file_name,
        &crypto,
    )?));
    headers.push(HeaderBlock::EncryptionInfo(Sealed::seal(
        &EncryptionParams {
            plaintext_length: payload_length,
            iv: data_iv,
        },
        &crypto,
    )?));
    headers.push(HeaderBlock::Compression(Sealed::seal(&options.compress, &crypto)?));
    if options.compress {
        headers.push(HeaderBlock::CompressionInfo(Sealed::seal(
            &plaintext_length,
            &crypto,
        )?));
    }
    headers.push(HeaderBlock::Data(payload_length));

    output.write_all(&MAGIC)?;
    let mut mac = HmacStream::with_chained(&keys.hmac, &mut output)?;
    for block in &headers {
        check_cancelled(progress)?;
        block.write_to(&mut mac)?;
    }

    match spool {
        Some(mut file) => {
            io::copy(&mut file, &mut mac)?;
        }
        None => {
            let cipher = suite.create_cipher(&keys.data, &data_iv, 0)?;
            let mut writer = CipherWriter::new(cipher, &mut mac);
            let read = pump(&mut input, &mut writer, progress)?;
            if read != payload_length {
                return Err(length_mismatch(payload_length, read));
            }
        }
    }

    let tag = mac.tag();
    drop(mac);
    output.write_all(&tag)?;
    output.flush()?;

    info!(
        suite = suite.name(),
        plaintext_length,
        payload_length,
        passphrases = options.passphrases.len(),
        recipients = options.recipients.len(),
        "container encrypted"
    );
    Ok(plaintext_length)
}

fn length_mismatch(declared: u64, actual: u64) -> AxCryptError {
    AxCryptError::usage(format!(
        "declared length {} does not match the {} bytes read",
        declared, actual
    ))
}

/// Encrypt (and optionally deflate) into an anonymous temp file.
/// Returns the rewound file, plaintext bytes read and payload bytes written.
fn spool_payload<R: Read>(
    input: &mut R,
    cipher: StreamCipher,
    compress: bool,
    progress: &dyn Progress,
) -> Result<(File, u64, u64)> {
    let mut file = tempfile::tempfile()?;
    let read = {
        let mut writer = CipherWriter::new(cipher, &mut file);
        if compress {
            let mut zlib = ZlibEncoder::new(writer, flate2::Compression::default());
            let read = pump(input, &mut zlib, progress)?;
            zlib.finish()?;
            read
        } else {
            pump(input, &mut writer, progress)?
        }
    };
    let written = file.stream_position()?;
    file.seek(SeekFrom::Start(0))?;
    debug!(read, written, "payload spooled");
    Ok((file, read, written))
}

/// Decrypt a container from `input` into `output`.
///
/// Bytes written to `output` are untrusted until this returns `Ok`. A bad tag
/// is reported as [`AxCryptError::Authentication`] even when a later stage
/// such as inflation failed first.
pub fn decrypt<R: Read, W: Write>(
    registry: &CryptoRegistry,
    input: R,
    mut output: W,
    credentials: &[Credential],
    progress: &dyn Progress,
) -> Result<DecryptedDocument> {
    let mut reader = AxCryptReader::new(input);
    let blocks = read_headers(&mut reader, progress)?;

    let nonce = match blocks.first() {
        Some(HeaderBlock::Preamble(preamble)) => preamble.nonce,
        _ => return Err(AxCryptError::malformed("missing Preamble block")),
    };
    let version = blocks
        .iter()
        .find_map(|b| match b {
            HeaderBlock::Version(v) => Some(*v),
            _ => None,
        })
        .ok_or_else(|| AxCryptError::malformed("missing Version block"))?;
    if version.major > FORMAT_VERSION.major {
        return Err(AxCryptError::malformed(format!(
            "unsupported format version {}.{}.{}",
            version.major, version.minor, version.minuscule
        )));
    }

    let (content_key, suite_id) = recover_content_key(registry, &blocks, credentials)?;
    let suite = registry.get(suite_id)?;
    debug!(suite = suite.name(), "content key recovered");

    let keys = SubKeys::derive(&content_key, &nonce)?;
    let crypto = HeaderCrypto::new(&keys.header);
    let params = blocks
        .iter()
        .find_map(|b| match b {
            HeaderBlock::EncryptionInfo(s) => Some(s),
            _ => None,
        })
        .ok_or_else(|| AxCryptError::malformed("missing EncryptionInfo block"))?
        .decrypt(&crypto)?;
    let compressed = match blocks.iter().find_map(|b| match b {
        HeaderBlock::Compression(s) => Some(s),
        _ => None,
    }) {
        Some(sealed) => sealed.decrypt(&crypto)?,
        None => false,
    };

    let mut mac = HmacStream::new(&keys.hmac)?;
    let outcome = {
        let mut payload = reader.data_stream(Some(&mut mac))?;
        let cipher = suite.create_cipher(&keys.data, &params.iv, 0)?;
        let outcome = {
            let mut plain = CipherReader::new(cipher, &mut payload);
            if compressed {
                pump(&mut ZlibDecoder::new(&mut plain), &mut output, progress)
            } else {
                pump(&mut plain, &mut output, progress)
            }
        };
        if matches!(outcome, Err(AxCryptError::Cancelled)) {
            return Err(AxCryptError::Cancelled);
        }
        // Whatever happened above, the rest of the payload still feeds the tag.
        io::copy(&mut payload, &mut io::sink()).map_err(AxCryptError::from_payload_io)?;
        outcome
    };

    let tag = reader.read_tag()?;
    if !mac.verify(&tag) {
        warn!(suite = suite.name(), "authentication tag mismatch");
        return Err(AxCryptError::Authentication);
    }
    let written = outcome.map_err(corrupt_payload)?;

    let expected = if compressed {
        blocks
            .iter()
            .find_map(|b| match b {
                HeaderBlock::CompressionInfo(s) => Some(s),
                _ => None,
            })
            .map(|s| s.decrypt(&crypto))
            .transpose()?
            .unwrap_or(written)
    } else {
        params.plaintext_length
    };
    if written != expected {
        return Err(AxCryptError::malformed(format!(
            "payload decoded to {} bytes, header declares {}",
            written, expected
        )));
    }

    let document = DecryptedDocument {
        file_name: file_name(&blocks, &crypto)?,
        file_times: blocks
            .iter()
            .find_map(|b| match b {
                HeaderBlock::FileInfo(s) => Some(s),
                _ => None,
            })
            .map(|s| s.decrypt(&crypto))
            .transpose()?,
        plaintext_length: written,
        compressed,
        suite: suite_id,
        version,
        id_tag: id_tag(&blocks, &crypto)?,
    };
    info!(
        suite = suite.name(),
        plaintext_length = written,
        compressed,
        "container decrypted"
    );
    Ok(document)
}

/// The header blocks of a container, read without any key.
pub fn inspect<R: Read>(input: R) -> Result<Vec<HeaderBlock>> {
    let mut reader = AxCryptReader::new(input);
    read_headers(&mut reader, &NoProgress)
}

fn read_headers<R: Read>(
    reader: &mut AxCryptReader<R>,
    progress: &dyn Progress,
) -> Result<Vec<HeaderBlock>> {
    let mut blocks = Vec::new();
    loop {
        check_cancelled(progress)?;
        match reader.next_item()? {
            ReadItem::MagicFound => {}
            ReadItem::Block(block) => blocks.push(block),
            ReadItem::Data(_) => return Ok(blocks),
            ReadItem::EndOfStream => {
                return Err(AxCryptError::malformed("container ended before the payload"));
            }
        }
    }
}

/// Try every credential against every key wrap. Passphrases without a suite
/// hint go through the registry's trial order.
fn recover_content_key(
    registry: &CryptoRegistry,
    blocks: &[HeaderBlock],
    credentials: &[Credential],
) -> Result<(SymmetricKey, CryptoId)> {
    for credential in credentials {
        match credential {
            Credential::Passphrase { secret, suite } => {
                let candidates = match suite {
                    Some(id) => {
                        registry.get(*id)?;
                        vec![*id]
                    }
                    None => registry.ordered_trial_ids(),
                };
                for id in candidates {
                    let factory = registry.get(id)?;
                    for wrap in blocks.iter().filter_map(|b| match b {
                        HeaderBlock::KeyWrap(w) => Some(w),
                        _ => None,
                    }) {
                        match unwrap_with_passphrase(factory, secret, wrap) {
                            Ok(key) => return Ok((key, id)),
                            Err(e) => debug!(suite = factory.name(), error = %e, "passphrase did not unwrap"),
                        }
                    }
                }
            }
            Credential::KeyPair(pair) => {
                for wrap in blocks.iter().filter_map(|b| match b {
                    HeaderBlock::AsymmetricKeyWrap(w) if w.recipient_tag == pair.tag() => Some(w),
                    _ => None,
                }) {
                    let factory = registry.get(wrap.suite)?;
                    match pair.unwrap_content_key(wrap) {
                        Ok(key) if key.len() == factory.key_len() => return Ok((key, wrap.suite)),
                        Ok(_) => debug!(suite = factory.name(), "recipient key has the wrong size"),
                        Err(e) => debug!(email = pair.email(), error = %e, "key pair did not unwrap"),
                    }
                }
            }
        }
    }
    Err(AxCryptError::Authentication)
}

fn unwrap_with_passphrase(
    factory: &dyn CryptoFactory,
    passphrase: &SecretString,
    wrap: &KeyWrapBlock,
) -> Result<SymmetricKey> {
    let derived = factory.restore_passphrase_key(passphrase, &wrap.salt, wrap.iterations)?;
    let key = keywrap::unwrap(derived.key().as_bytes(), &wrap.wrapped)?;
    if key.len() != factory.key_len() {
        return Err(AxCryptError::Authentication);
    }
    Ok(SymmetricKey::from(key))
}

fn file_name(blocks: &[HeaderBlock], crypto: &HeaderCrypto<'_>) -> Result<String> {
    for block in blocks {
        if let HeaderBlock::UnicodeFileNameInfo(s) = block {
            return s.decrypt(crypto);
        }
    }
    for block in blocks {
        if let HeaderBlock::FileNameInfo(s) = block {
            return s.decrypt(crypto);
        }
    }
    Ok(String::new())
}

fn id_tag(blocks: &[HeaderBlock], crypto: &HeaderCrypto<'_>) -> Result<Option<String>> {
    for block in blocks {
        match block {
            HeaderBlock::IdTag(tag) => return Ok(Some(tag.clone())),
            HeaderBlock::Encrypted(sealed) => {
                if let HeaderBlock::IdTag(tag) = sealed.decrypt(crypto)? {
                    return Ok(Some(tag));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Inflate errors only surface after the tag verified, so they mean a
/// damaged payload rather than a disk fault.
fn corrupt_payload(err: AxCryptError) -> AxCryptError {
    match err {
        AxCryptError::Storage(e)
            if matches!(
                e.kind(),
                io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput
            ) =>
        {
            AxCryptError::malformed(format!("corrupt compressed payload: {}", e))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suite::{ids, LegacyAesFactory, VersionedAesFactory};
    use std::io::Cursor;
    use std::sync::Arc;

    fn registry() -> CryptoRegistry {
        CryptoRegistry::standard(1000)
    }

    fn encrypt_to_vec(registry: &CryptoRegistry, data: &[u8], options: &EncryptOptions) -> Vec<u8> {
        let mut out = Vec::new();
        encrypt(registry, Cursor::new(data), Some(data.len() as u64), &mut out, options, &NoProgress)
            .unwrap();
        out
    }

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_suite_hint_restricts_trial() {
        let registry = registry();
        let options = EncryptOptions::new("a.txt")
            .with_passphrase(pw("pw"))
            .with_suite(ids::AES_128);
        let container = encrypt_to_vec(&registry, b"data", &options);

        let wrong_hint = [Credential::Passphrase {
            secret: pw("pw"),
            suite: Some(ids::AES_256),
        }];
        assert!(matches!(
            decrypt(&registry, Cursor::new(&container), io::sink(), &wrong_hint, &NoProgress),
            Err(AxCryptError::Authentication)
        ));

        let right_hint = [Credential::Passphrase {
            secret: pw("pw"),
            suite: Some(ids::AES_128),
        }];
        let doc = decrypt(&registry, Cursor::new(&container), io::sink(), &right_hint, &NoProgress)
            .unwrap();
        assert_eq!(doc.suite, ids::AES_128);
    }

    #[test]
    fn test_unknown_suite_hint() {
        let registry = registry();
        let container = encrypt_to_vec(
            &registry,
            b"data",
            &EncryptOptions::new("a").with_passphrase(pw("pw")),
        );
        let unknown = CryptoId::from_u128(7);
        let credentials = [Credential::Passphrase {
            secret: pw("pw"),
            suite: Some(unknown),
        }];
        assert!(matches!(
            decrypt(&registry, Cursor::new(&container), io::sink(), &credentials, &NoProgress),
            Err(AxCryptError::UnsupportedSuite(id)) if id == unknown
        ));
    }

    #[test]
    fn test_legacy_files_decrypt_through_trial() {
        // A writer that still treats the legacy scheme as an ordinary suite
        let mut old_writer = CryptoRegistry::empty();
        old_writer.register_default(Arc::new(LegacyAesFactory));
        let container = encrypt_to_vec(
            &old_writer,
            b"from an old release",
            &EncryptOptions::new("old.txt").with_passphrase(pw("legacy")),
        );

        let mut out = Vec::new();
        let doc = decrypt(
            &registry(),
            Cursor::new(&container),
            &mut out,
            &[Credential::passphrase("legacy")],
            &NoProgress,
        )
        .unwrap();
        assert_eq!(out, b"from an old release");
        assert_eq!(doc.suite, ids::LEGACY_AES_128);
    }

    #[test]
    fn test_legacy_suite_cannot_encrypt() {
        let registry = registry();
        let options = EncryptOptions::new("x")
            .with_passphrase(pw("pw"))
            .with_suite(ids::LEGACY_AES_128);
        let result = encrypt(&registry, Cursor::new(b"x"), Some(1), io::sink(), &options, &NoProgress);
        assert!(matches!(result, Err(AxCryptError::Usage(_))));
    }

    #[test]
    fn test_requires_a_credential() {
        let result = encrypt(
            &registry(),
            Cursor::new(b"x"),
            Some(1),
            io::sink(),
            &EncryptOptions::new("x"),
            &NoProgress,
        );
        assert!(matches!(result, Err(AxCryptError::Usage(_))));
    }

    #[test]
    fn test_declared_length_mismatch() {
        let options = EncryptOptions::new("x").with_passphrase(pw("pw"));
        for compress in [false, true] {
            let options = EncryptOptions {
                compress,
                ..EncryptOptions::new("x").with_passphrase(pw("pw"))
            };
            let result = encrypt(&registry(), Cursor::new(b"abc"), Some(4), io::sink(), &options, &NoProgress);
            assert!(matches!(result, Err(AxCryptError::Usage(_))), "compress {}", compress);
        }
        let result = encrypt(&registry(), Cursor::new(b"abc"), None, io::sink(), &options, &NoProgress);
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_custom_suite_round_trip() {
        let mut registry = registry();
        let custom = CryptoId::from_u128(0xC0FFEE);
        registry.register(Arc::new(
            VersionedAesFactory::new(custom, "AES-256 fast", 10, 256).with_iterations(10),
        ));
        let options = EncryptOptions::new("c").with_passphrase(pw("pw")).with_suite(custom);
        let container = encrypt_to_vec(&registry, b"custom", &options);

        let doc = decrypt(
            &registry,
            Cursor::new(&container),
            io::sink(),
            &[Credential::passphrase("pw")],
            &NoProgress,
        )
        .unwrap();
        assert_eq!(doc.suite, custom);
    }

    #[test]
    fn test_inspect_lists_clear_structure() {
        let options = EncryptOptions::new("secret-name.txt")
            .with_passphrase(pw("a"))
            .with_passphrase(pw("b"));
        let container = encrypt_to_vec(&registry(), b"hello", &options);
        let blocks = inspect(Cursor::new(&container)).unwrap();

        assert!(matches!(blocks[0], HeaderBlock::Preamble(_)));
        assert_eq!(blocks[1], HeaderBlock::Version(FORMAT_VERSION));
        assert_eq!(
            blocks.iter().filter(|b| matches!(b, HeaderBlock::KeyWrap(_))).count(),
            2
        );
        assert_eq!(blocks.last(), Some(&HeaderBlock::Data(5)));
        let raw = String::from_utf8_lossy(&container);
        assert!(!raw.contains("secret-name"));
    }
}
