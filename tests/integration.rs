use anyhow::Result;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use axcrypt::blocks::{BlockType, HeaderBlock, MAGIC};
use axcrypt::document::{self, Credential, DecryptedDocument, EncryptOptions};
use axcrypt::file_ops::{encrypted_path, FileOps};
use axcrypt::keypair::UserKeyPair;
use axcrypt::keystore::{key_file_name, seal_key_pair, KeyStore};
use axcrypt::streaming::{NoProgress, Progress, CHUNK_SIZE};
use axcrypt::suite::{ids, CryptoRegistry, LegacyAesFactory};
use axcrypt::AxCryptError;
use chrono::{TimeZone, Utc};
use secrecy::SecretString;

const ITERATIONS: u32 = 1000;

fn registry() -> CryptoRegistry {
    CryptoRegistry::standard(ITERATIONS)
}

fn secret(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

fn axcrypt_error(err: &anyhow::Error) -> Option<&AxCryptError> {
    err.downcast_ref::<AxCryptError>()
}

/// Encrypt in memory with the standard registry.
fn seal(plaintext: &[u8], options: &EncryptOptions) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    document::encrypt(
        &registry(),
        Cursor::new(plaintext),
        Some(plaintext.len() as u64),
        &mut out,
        options,
        &NoProgress,
    )?;
    Ok(out)
}

fn open(
    container: &[u8],
    credentials: &[Credential],
) -> axcrypt::Result<(Vec<u8>, DecryptedDocument)> {
    let mut out = Vec::new();
    let doc = document::decrypt(
        &registry(),
        Cursor::new(container),
        &mut out,
        credentials,
        &NoProgress,
    )?;
    Ok((out, doc))
}

/// Byte ranges of encrypted block payloads, the payload itself and the tag.
fn layout(container: &[u8]) -> (Vec<std::ops::Range<usize>>, std::ops::Range<usize>, std::ops::Range<usize>) {
    let mut pos = MAGIC.len();
    let mut sealed = Vec::new();
    loop {
        let len = u32::from_le_bytes(container[pos..pos + 4].try_into().unwrap()) as usize;
        let block_type = BlockType::from_tag(container[pos + 4]);
        let payload = pos + 5..pos + len;
        if block_type.is_encrypted() {
            sealed.push(payload.clone());
        }
        pos += len;
        if block_type == BlockType::Data {
            let data_len =
                u64::from_le_bytes(container[payload.start..payload.end].try_into().unwrap());
            let data = pos..pos + data_len as usize;
            let tag = data.end..container.len();
            return (sealed, data, tag);
        }
    }
}

/// Counts progress and cancels once `limit` bytes went through.
struct CancelAfter {
    seen: Arc<AtomicU64>,
    limit: u64,
}

impl Progress for CancelAfter {
    fn advance(&self, bytes: u64) {
        self.seen.fetch_add(bytes, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.seen.load(Ordering::SeqCst) >= self.limit
    }
}

#[tokio::test]
async fn fileops_roundtrip_every_suite() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("report.txt");
    let data = b"integration secret".repeat(100);
    fs::write(&input, &data)?;

    let ops = FileOps::new(registry());
    for suite in [ids::AES_128, ids::AES_256] {
        let container = encrypted_path(&input);
        let options = EncryptOptions::new("report.txt")
            .with_suite(suite)
            .with_passphrase(secret("hunter2"));
        let written = ops.encrypt_file(&input, &container, options, NoProgress).await?;
        assert_eq!(written, data.len() as u64);

        let output = tmp.path().join("out.txt");
        let (path, doc) = ops
            .decrypt_file(
                &container,
                Some(output.as_path()),
                vec![Credential::passphrase("hunter2")],
                NoProgress,
            )
            .await?;
        assert_eq!(path, output);
        assert_eq!(fs::read(&output)?, data);
        assert_eq!(doc.suite, suite);
        assert_eq!(doc.file_name, "report.txt");
        assert_eq!(doc.plaintext_length, data.len() as u64);
        assert!(!doc.compressed);
        fs::remove_file(&container)?;
    }
    Ok(())
}

#[tokio::test]
async fn fileops_roundtrip_compressed_multi_chunk() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("big.log");
    let data: Vec<u8> = b"line of very repetitive log output\n"
        .iter()
        .copied()
        .cycle()
        .take(CHUNK_SIZE * 3 + 17)
        .collect();
    fs::write(&input, &data)?;

    let ops = FileOps::new(registry()).with_compression(true);
    let container = encrypted_path(&input);
    ops.encrypt_file(
        &input,
        &container,
        EncryptOptions::new("big.log").with_passphrase(secret("pw")),
        NoProgress,
    )
    .await?;
    assert!(fs::metadata(&container)?.len() < data.len() as u64);

    let output = tmp.path().join("big.out");
    let (_, doc) = ops
        .decrypt_file(&container, Some(output.as_path()), vec![Credential::passphrase("pw")], NoProgress)
        .await?;
    assert!(doc.compressed);
    assert_eq!(doc.plaintext_length, data.len() as u64);
    assert_eq!(fs::read(&output)?, data);
    Ok(())
}

#[tokio::test]
async fn decrypt_uses_stored_name_and_times() -> Result<()> {
    let tmp = TempDir::new()?;
    let src_dir = tmp.path().join("src");
    fs::create_dir(&src_dir)?;
    let input = src_dir.join("notes.md");
    fs::write(&input, b"# notes")?;

    let times = axcrypt::blocks::FileTimes {
        created: Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap(),
        accessed: Utc.with_ymd_and_hms(2021, 6, 7, 8, 9, 10).unwrap(),
        modified: Utc.with_ymd_and_hms(2022, 11, 12, 13, 14, 15).unwrap(),
    };
    let ops = FileOps::new(registry());
    let container = tmp.path().join("sealed.axx");
    ops.encrypt_file(
        &input,
        &container,
        EncryptOptions::new("../../escape/notes.md")
            .with_passphrase(secret("pw"))
            .with_file_times(times),
        NoProgress,
    )
    .await?;

    let (path, doc) = ops
        .decrypt_file(&container, None, vec![Credential::passphrase("pw")], NoProgress)
        .await?;
    assert_eq!(path, tmp.path().join("notes.md"));
    assert_eq!(fs::read(&path)?, b"# notes");
    assert_eq!(doc.file_name, "../../escape/notes.md");
    assert_eq!(doc.file_times, Some(times));
    Ok(())
}

#[tokio::test]
async fn wrong_passphrase_is_authentication_failure() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("a.txt");
    fs::write(&input, b"top secret")?;

    let ops = FileOps::new(registry());
    let container = encrypted_path(&input);
    ops.encrypt_file(
        &input,
        &container,
        EncryptOptions::new("a.txt").with_passphrase(secret("right")),
        NoProgress,
    )
    .await?;

    let output = tmp.path().join("a.out");
    let err = ops
        .decrypt_file(&container, Some(output.as_path()), vec![Credential::passphrase("wrong")], NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(axcrypt_error(&err), Some(AxCryptError::Authentication)));
    Ok(())
}

#[tokio::test]
async fn failed_decryption_leaves_no_output() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("a.txt");
    fs::write(&input, vec![7u8; 5000])?;

    let ops = FileOps::new(registry());
    let container = encrypted_path(&input);
    ops.encrypt_file(
        &input,
        &container,
        EncryptOptions::new("a.txt").with_passphrase(secret("pw")),
        NoProgress,
    )
    .await?;

    // Flip one payload byte so the tag no longer verifies
    let mut bytes = fs::read(&container)?;
    let (_, payload, _) = layout(&bytes);
    bytes[payload.start + 100] ^= 0x01;
    fs::write(&container, &bytes)?;

    let before = fs::read_dir(tmp.path())?.count();
    let output = tmp.path().join("a.out");
    let err = ops
        .decrypt_file(&container, Some(output.as_path()), vec![Credential::passphrase("pw")], NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(axcrypt_error(&err), Some(AxCryptError::Authentication)));
    assert!(!output.exists());
    assert_eq!(fs::read_dir(tmp.path())?.count(), before);
    Ok(())
}

#[tokio::test]
async fn cancellation_is_never_success() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("big.bin");
    fs::write(&input, vec![1u8; CHUNK_SIZE * 4])?;
    let ops = FileOps::new(registry());
    let container = encrypted_path(&input);

    let progress = CancelAfter {
        seen: Arc::new(AtomicU64::new(0)),
        limit: CHUNK_SIZE as u64,
    };
    let err = ops
        .encrypt_file(
            &input,
            &container,
            EncryptOptions::new("big.bin").with_passphrase(secret("pw")),
            progress,
        )
        .await
        .unwrap_err();
    assert!(matches!(axcrypt_error(&err), Some(AxCryptError::Cancelled)));
    assert!(!container.exists());

    ops.encrypt_file(
        &input,
        &container,
        EncryptOptions::new("big.bin").with_passphrase(secret("pw")),
        NoProgress,
    )
    .await?;
    let seen = Arc::new(AtomicU64::new(0));
    let output = tmp.path().join("big.out");
    let err = ops
        .decrypt_file(
            &container,
            Some(output.as_path()),
            vec![Credential::passphrase("pw")],
            CancelAfter {
                seen: Arc::clone(&seen),
                limit: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(axcrypt_error(&err), Some(AxCryptError::Cancelled)));
    assert!(seen.load(Ordering::SeqCst) < (CHUNK_SIZE * 4) as u64);
    assert!(!output.exists());
    Ok(())
}

#[test]
fn empty_payload_and_empty_name() -> Result<()> {
    let container = seal(b"", &EncryptOptions::new("").with_passphrase(secret("pw")))?;
    let (plain, doc) = open(&container, &[Credential::passphrase("pw")])?;
    assert!(plain.is_empty());
    assert_eq!(doc.file_name, "");
    assert_eq!(doc.plaintext_length, 0);

    let (_, payload, tag) = layout(&container);
    assert!(payload.is_empty());
    assert_eq!(tag.len(), 16);
    Ok(())
}

#[test]
fn block_sized_payload() -> Result<()> {
    let data = *b"0123456789abcdef";
    let container = seal(&data, &EncryptOptions::new("x").with_passphrase(secret("pw")))?;
    let (_, payload, _) = layout(&container);
    assert_eq!(payload.len(), 16);
    let (plain, _) = open(&container, &[Credential::passphrase("pw")])?;
    assert_eq!(plain, data);
    Ok(())
}

#[test]
fn leading_garbage_is_skipped() -> Result<()> {
    let container = seal(b"payload", &EncryptOptions::new("p").with_passphrase(secret("pw")))?;
    let mut prefixed = vec![0xAB; 5000];
    prefixed.extend_from_slice(&container);
    let (plain, _) = open(&prefixed, &[Credential::passphrase("pw")])?;
    assert_eq!(plain, b"payload");
    Ok(())
}

#[test]
fn truncated_container_is_malformed() -> Result<()> {
    let container = seal(&[9u8; 300], &EncryptOptions::new("t").with_passphrase(secret("pw")))?;
    let (_, payload, _) = layout(&container);

    for cut in [MAGIC.len() + 3, payload.start - 1, payload.start + 10, container.len() - 1] {
        let result = open(&container[..cut], &[Credential::passphrase("pw")]);
        assert!(
            matches!(result, Err(AxCryptError::Malformed(_))),
            "cut at {} gave {:?}",
            cut,
            result.map(|r| r.1)
        );
    }
    assert!(matches!(
        open(&[0u8; 64], &[Credential::passphrase("pw")]),
        Err(AxCryptError::Malformed(_))
    ));
    Ok(())
}

#[test]
fn any_flipped_bit_is_rejected() -> Result<()> {
    // Recipient-only, so tampering never turns into an expensive derivation
    let alice = UserKeyPair::generate("alice@example.com");
    let options = EncryptOptions::new("ledger.csv")
        .with_recipient(*alice.public_key())
        .with_id_tag("ledger");
    let container = seal(b"date,amount\n2024-01-01,10\n", &options)?;
    let credentials = [Credential::KeyPair(alice)];
    open(&container, &credentials)?;

    let (sealed, payload, tag) = layout(&container);
    assert!(!sealed.is_empty());

    for i in 0..container.len() {
        let mut tampered = container.clone();
        tampered[i] ^= 0x01;
        let result = open(&tampered, &credentials);
        assert!(result.is_err(), "flip at byte {} went unnoticed", i);

        let must_authenticate = payload.contains(&i)
            || tag.contains(&i)
            || sealed.iter().any(|r| r.contains(&i));
        if must_authenticate {
            assert!(
                matches!(result, Err(AxCryptError::Authentication)),
                "flip at byte {} gave {:?}",
                i,
                result.map(|r| r.1)
            );
        }
    }
    Ok(())
}

#[test]
fn tampered_passphrase_wrap_is_authentication_failure() -> Result<()> {
    let container = seal(b"data", &EncryptOptions::new("d").with_passphrase(secret("pw")))?;
    let blocks = document::inspect(Cursor::new(&container))?;
    let wrapped_len = blocks
        .iter()
        .find_map(|b| match b {
            HeaderBlock::KeyWrap(w) => Some(w.wrapped.len()),
            _ => None,
        })
        .unwrap();

    // The wrapped key is the tail of the KeyWrap block
    let mut pos = MAGIC.len();
    let wrap_end = loop {
        let len = u32::from_le_bytes(container[pos..pos + 4].try_into().unwrap()) as usize;
        if BlockType::from_tag(container[pos + 4]) == BlockType::KeyWrap {
            break pos + len;
        }
        pos += len;
    };
    for i in wrap_end - wrapped_len..wrap_end {
        let mut tampered = container.clone();
        tampered[i] ^= 0x40;
        assert!(matches!(
            open(&tampered, &[Credential::passphrase("pw")]),
            Err(AxCryptError::Authentication)
        ));
    }
    Ok(())
}

#[test]
fn recipients_share_one_file() -> Result<()> {
    let alice = UserKeyPair::generate("alice@example.com");
    let bob = UserKeyPair::generate("bob@example.com");
    let carol = UserKeyPair::generate("carol@example.com");
    let options = EncryptOptions::new("plan.txt")
        .with_recipient(*alice.public_key())
        .with_recipient(*bob.public_key())
        .with_passphrase(secret("fallback"));
    let container = seal(b"meet at noon", &options)?;

    for who in [alice, bob] {
        let (plain, doc) = open(&container, &[Credential::KeyPair(who)])?;
        assert_eq!(plain, b"meet at noon");
        assert_eq!(doc.suite, ids::AES_256);
    }
    assert!(matches!(
        open(&container, &[Credential::KeyPair(carol.clone())]),
        Err(AxCryptError::Authentication)
    ));

    // A non-matching key pair does not stop the passphrase from being tried
    let (plain, _) = open(
        &container,
        &[Credential::KeyPair(carol), Credential::passphrase("fallback")],
    )?;
    assert_eq!(plain, b"meet at noon");
    Ok(())
}

#[test]
fn names_never_appear_in_clear() -> Result<()> {
    let name = "quarterly-salaries.xlsx";
    let container = seal(
        b"salaries",
        &EncryptOptions::new(name)
            .with_passphrase(secret("pw"))
            .with_id_tag("hr-department"),
    )?;
    for needle in [name.as_bytes(), b"hr-department", b"salaries"] {
        assert!(!container.windows(needle.len()).any(|w| w == needle));
    }

    let blocks = document::inspect(Cursor::new(&container))?;
    assert!(matches!(blocks.first(), Some(HeaderBlock::Preamble(_))));
    assert!(matches!(blocks.get(1), Some(HeaderBlock::Version(_))));
    assert!(matches!(blocks.last(), Some(HeaderBlock::Data(8))));

    let (_, doc) = open(&container, &[Credential::passphrase("pw")])?;
    assert_eq!(doc.id_tag.as_deref(), Some("hr-department"));
    Ok(())
}

#[tokio::test]
async fn legacy_files_still_open() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("old.txt");
    fs::write(&input, b"written long ago")?;

    // A writer whose only suite is the legacy scheme, as old clients had
    let mut old = CryptoRegistry::empty();
    old.register_default(Arc::new(LegacyAesFactory));
    let container = encrypted_path(&input);
    FileOps::new(old)
        .encrypt_file(
            &input,
            &container,
            EncryptOptions::new("old.txt").with_passphrase(secret("pw")),
            NoProgress,
        )
        .await?;

    let output = tmp.path().join("old.out");
    let (_, doc) = FileOps::new(registry())
        .decrypt_file(&container, Some(output.as_path()), vec![Credential::passphrase("pw")], NoProgress)
        .await?;
    assert_eq!(doc.suite, ids::LEGACY_AES_128);
    assert_eq!(fs::read(&output)?, b"written long ago");

    // New files never use it
    let err = FileOps::new(registry())
        .encrypt_file(
            &input,
            &tmp.path().join("new.axx"),
            EncryptOptions::new("old.txt")
                .with_suite(ids::LEGACY_AES_128)
                .with_passphrase(secret("pw")),
            NoProgress,
        )
        .await
        .unwrap_err();
    assert!(matches!(axcrypt_error(&err), Some(AxCryptError::Usage(_))));
    Ok(())
}

#[tokio::test]
async fn inspect_file_reports_structure() -> Result<()> {
    let tmp = TempDir::new()?;
    let input = tmp.path().join("i.txt");
    fs::write(&input, b"abc")?;
    let ops = FileOps::new(registry());
    let container = encrypted_path(&input);
    let bob = UserKeyPair::generate("bob@example.com");
    ops.encrypt_file(
        &input,
        &container,
        EncryptOptions::new("i.txt")
            .with_passphrase(secret("pw"))
            .with_recipient(*bob.public_key()),
        NoProgress,
    )
    .await?;

    let blocks = ops.inspect_file(&container).await?;
    let count = |t: BlockType| blocks.iter().filter(|b| b.block_type() == t).count();
    assert_eq!(count(BlockType::KeyWrap), 1);
    assert_eq!(count(BlockType::AsymmetricKeyWrap), 1);
    assert_eq!(count(BlockType::Data), 1);
    assert_eq!(count(BlockType::EncryptionInfo), 1);
    Ok(())
}

#[tokio::test]
async fn key_store_create_list_reopen() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = tmp.path().join("keys");

    let store =
        KeyStore::open_or_create(&dir, "erin@example.com", secret("pw"), registry(), Vec::new())
            .await?;
    let first = store.current().cloned().unwrap();
    let file = dir.join(key_file_name(&first));
    assert!(file.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        assert_eq!(fs::metadata(&file)?.permissions().mode() & 0o777, 0o600);
    }

    // Key files are ordinary containers
    let (json, doc) = open(&fs::read(&file)?, &[Credential::passphrase("pw")])?;
    assert_eq!(UserKeyPair::from_json(&json)?, first);
    assert_eq!(doc.id_tag.as_deref(), Some("erin@example.com"));

    // A second, newer pair goes first
    let mut store = store;
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = UserKeyPair::generate("erin@example.com");
    store.add(second.clone()).await?;
    assert_eq!(store.pairs(), &[second.clone(), first.clone()]);

    // Case-insensitive identity, account pairs merged and deduplicated
    let reopened = KeyStore::open(
        &dir,
        "ERIN@example.com",
        secret("pw"),
        registry(),
        vec![first.clone()],
    )
    .await?;
    assert_eq!(reopened.pairs(), &[second, first]);
    Ok(())
}

#[tokio::test]
async fn key_store_skips_other_identities_and_passphrases() -> Result<()> {
    let tmp = TempDir::new()?;
    let dir = tmp.path();

    let mine = UserKeyPair::generate("frank@example.com");
    let theirs = UserKeyPair::generate("grace@example.com");
    let locked = UserKeyPair::generate("frank@example.com");
    fs::write(dir.join(key_file_name(&mine)), seal_key_pair(&registry(), &mine, &secret("pw"))?)?;
    fs::write(
        dir.join(key_file_name(&theirs)),
        seal_key_pair(&registry(), &theirs, &secret("pw"))?,
    )?;
    fs::write(
        dir.join(key_file_name(&locked)),
        seal_key_pair(&registry(), &locked, &secret("other"))?,
    )?;
    fs::write(dir.join("Keys-garbage.axx"), b"not a container")?;

    let store = KeyStore::open(dir, "frank@example.com", secret("pw"), registry(), Vec::new()).await?;
    assert_eq!(store.pairs(), &[mine]);
    Ok(())
}

#[tokio::test]
async fn key_store_import_rules() -> Result<()> {
    let tmp = TempDir::new()?;
    let store_dir = tmp.path().join("store");
    let outside = tmp.path().join("outside");
    fs::create_dir(&outside)?;

    let secret_bytes = [0x33u8; 32];
    let older = UserKeyPair::from_parts(
        "heidi@example.com",
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        secret_bytes,
    );
    let mut store =
        KeyStore::open(&store_dir, "heidi@example.com", secret("pw"), registry(), Vec::new())
            .await?;
    store.add(older.clone()).await?;

    // Same pair again is a no-op
    let same = write_key_file(&outside, "same.axx", &older, "pw")?;
    assert_eq!(store.import(&same).await?, older);
    assert_eq!(store.pairs().len(), 1);

    // Same key material under a different timestamp would overwrite a different file
    let newer = UserKeyPair::from_parts(
        "heidi@example.com",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        secret_bytes,
    );
    let clash = write_key_file(&outside, "clash.axx", &newer, "pw")?;
    assert!(store.import(&clash).await.is_err());

    // Another identity's key file is refused
    let stranger = UserKeyPair::generate("ivan@example.com");
    let foreign = write_key_file(&outside, "foreign.axx", &stranger, "pw")?;
    assert!(store.import(&foreign).await.is_err());

    // A fresh pair for this identity is copied in
    let fresh = UserKeyPair::generate("heidi@example.com");
    let incoming = write_key_file(&outside, "fresh.axx", &fresh, "pw")?;
    store.import(&incoming).await?;
    assert!(store_dir.join(key_file_name(&fresh)).exists());
    assert_eq!(store.current(), Some(&fresh));
    Ok(())
}

fn write_key_file(dir: &Path, name: &str, pair: &UserKeyPair, passphrase: &str) -> Result<std::path::PathBuf> {
    let path = dir.join(name);
    fs::write(&path, seal_key_pair(&registry(), pair, &secret(passphrase))?)?;
    Ok(path)
}

#[tokio::test]
async fn concurrent_operations() -> Result<()> {
    let tmp = TempDir::new()?;
    let ops = Arc::new(FileOps::new(registry()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let ops = Arc::clone(&ops);
        let dir = tmp.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            let input = dir.join(format!("f{}.txt", i));
            let data = format!("file number {}", i).repeat(i + 1);
            fs::write(&input, &data)?;
            let container = encrypted_path(&input);
            ops.encrypt_file(
                &input,
                &container,
                EncryptOptions::new(format!("f{}.txt", i)).with_passphrase(secret("pw")),
                NoProgress,
            )
            .await?;
            let output = dir.join(format!("f{}.out", i));
            ops.decrypt_file(&container, Some(output.as_path()), vec![Credential::passphrase("pw")], NoProgress)
                .await?;
            anyhow::ensure!(fs::read(&output)? == data.as_bytes());
            Ok::<(), anyhow::Error>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }
    Ok(())
}
