//! Per-identity key store.
//!
//! Key pairs live in `Keys-<tag>.axx` files, each a container whose payload is
//! the JSON form of one [`UserKeyPair`], protected by the owner's passphrase.
//! The store depends on the container codec; the codec knows nothing of it.
//!
//! ## Security Features
//!
//! - Key files are written with mode 0600 on Unix
//! - An existing key file is never silently replaced
//! - Decrypted key documents are zeroized after parsing

use anyhow::{bail, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::document::{self, Credential, EncryptOptions};
use crate::keypair::{recipient_tag_hex, UserKeyPair};
use crate::streaming::NoProgress;
use crate::suite::CryptoRegistry;

pub const KEY_FILE_PREFIX: &str = "Keys-";
pub const KEY_FILE_EXTENSION: &str = "axx";

/// File name a key pair is stored under.
pub fn key_file_name(pair: &UserKeyPair) -> String {
    format!(
        "{}{}.{}",
        KEY_FILE_PREFIX,
        recipient_tag_hex(pair.public_key()),
        KEY_FILE_EXTENSION
    )
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

/// Seal a key pair into a container under `passphrase`.
pub fn seal_key_pair(
    registry: &CryptoRegistry,
    pair: &UserKeyPair,
    passphrase: &SecretString,
) -> crate::Result<Vec<u8>> {
    let json = pair.to_json()?;
    let options = EncryptOptions::new(key_file_name(pair))
        .with_passphrase(copy_secret(passphrase))
        .with_id_tag(pair.email());
    let mut out = Vec::new();
    document::encrypt(
        registry,
        Cursor::new(&json[..]),
        Some(json.len() as u64),
        &mut out,
        &options,
        &NoProgress,
    )?;
    Ok(out)
}

/// Open a sealed key pair.
pub fn open_key_pair(
    registry: &CryptoRegistry,
    container: &[u8],
    passphrase: &SecretString,
) -> crate::Result<UserKeyPair> {
    let mut json = Zeroizing::new(Vec::new());
    let credentials = [Credential::Passphrase {
        secret: copy_secret(passphrase),
        suite: None,
    }];
    document::decrypt(
        registry,
        Cursor::new(container),
        &mut *json,
        &credentials,
        &NoProgress,
    )?;
    UserKeyPair::from_json(&json)
}

/// Key pairs of one identity, newest first.
pub struct KeyStore {
    dir: PathBuf,
    email: String,
    passphrase: Arc<SecretString>,
    registry: CryptoRegistry,
    pairs: Vec<UserKeyPair>,
}

impl KeyStore {
    /// Load every key file in `dir` that opens with `passphrase` and belongs
    /// to `email`, merged with `account_pairs` from the account record.
    pub async fn open(
        dir: impl Into<PathBuf>,
        email: impl Into<String>,
        passphrase: SecretString,
        registry: CryptoRegistry,
        account_pairs: Vec<UserKeyPair>,
    ) -> Result<Self> {
        let mut store = Self {
            dir: dir.into(),
            email: email.into(),
            passphrase: Arc::new(passphrase),
            registry,
            pairs: Vec::new(),
        };

        for path in store.candidate_files()? {
            match store.load_file(&path).await {
                Ok(pair) if pair.is_for(&store.email) => store.insert(pair),
                Ok(pair) => debug!(path = %path.display(), owner = pair.email(), "key file belongs to another identity"),
                Err(e) => debug!(path = %path.display(), error = %e, "key file did not open"),
            }
        }
        for pair in account_pairs {
            if pair.is_for(&store.email) {
                store.insert(pair);
            }
        }

        info!(email = %store.email, pairs = store.pairs.len(), "key store loaded");
        Ok(store)
    }

    /// Like [`KeyStore::open`], generating and saving a fresh pair when none validate.
    pub async fn open_or_create(
        dir: impl Into<PathBuf>,
        email: impl Into<String>,
        passphrase: SecretString,
        registry: CryptoRegistry,
        account_pairs: Vec<UserKeyPair>,
    ) -> Result<Self> {
        let mut store = Self::open(dir, email, passphrase, registry, account_pairs).await?;
        if store.pairs.is_empty() {
            info!(email = %store.email, "no key pair found, generating a new one");
            let pair = UserKeyPair::generate(store.email.clone());
            store.add(pair).await?;
        }
        Ok(store)
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The most recent pair.
    pub fn current(&self) -> Option<&UserKeyPair> {
        self.pairs.first()
    }

    pub fn pairs(&self) -> &[UserKeyPair] {
        &self.pairs
    }

    /// Persist `pair` and make it part of the store. Returns the key file path.
    pub async fn add(&mut self, pair: UserKeyPair) -> Result<PathBuf> {
        if !pair.is_for(&self.email) {
            bail!(
                "key pair for {} cannot be added to the store of {}",
                pair.email(),
                self.email
            );
        }
        let path = self.write_pair(&pair).await?;
        self.insert(pair);
        Ok(path)
    }

    /// Copy a key file from elsewhere into the store.
    ///
    /// The file must open with this store's passphrase and belong to this
    /// identity. An existing file for the same key is left alone when it holds
    /// the same pair and is an error otherwise.
    pub async fn import(&mut self, source: &Path) -> Result<UserKeyPair> {
        let pair = self
            .load_file(source)
            .await
            .with_context(|| format!("opening key file {}", source.display()))?;
        if !pair.is_for(&self.email) {
            bail!(
                "{} holds a key pair for {}, not {}",
                source.display(),
                pair.email(),
                self.email
            );
        }
        let path = self.write_pair(&pair).await?;
        info!(path = %path.display(), "imported key pair");
        self.insert(pair.clone());
        Ok(pair)
    }

    fn insert(&mut self, pair: UserKeyPair) {
        if !self.pairs.contains(&pair) {
            self.pairs.push(pair);
        }
        self.pairs.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
    }

    fn candidate_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.dir.join(format!("{}*.{}", KEY_FILE_PREFIX, KEY_FILE_EXTENSION));
        let pattern = pattern
            .to_str()
            .with_context(|| format!("key store path {} is not UTF-8", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in glob::glob(pattern).context("building key file pattern")? {
            match entry {
                Ok(path) => files.push(path),
                Err(e) => warn!(error = %e, "skipping unreadable key store entry"),
            }
        }
        Ok(files)
    }

    async fn load_file(&self, path: &Path) -> Result<UserKeyPair> {
        let container = fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let registry = self.registry.clone();
        let passphrase = Arc::clone(&self.passphrase);
        let pair = tokio::task::spawn_blocking(move || {
            open_key_pair(&registry, &container, &passphrase)
        })
        .await??;
        Ok(pair)
    }

    /// Write `pair` to its key file unless an identical pair is already there.
    async fn write_pair(&self, pair: &UserKeyPair) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating key store directory {}", self.dir.display()))?;
        let path = self.dir.join(key_file_name(pair));

        if fs::try_exists(&path)
            .await
            .with_context(|| format!("checking existence of {}", path.display()))?
        {
            match self.load_file(&path).await {
                Ok(existing) if existing == *pair => {
                    debug!(path = %path.display(), "key file already present");
                    return Ok(path);
                }
                _ => bail!(
                    "refusing to overwrite existing key file {}",
                    path.display()
                ),
            }
        }

        let registry = self.registry.clone();
        let passphrase = Arc::clone(&self.passphrase);
        let pair = pair.clone();
        let target = path.clone();
        tokio::task::spawn_blocking(move || {
            let container = seal_key_pair(&registry, &pair, &passphrase)?;
            write_new_file(&target, &container)
        })
        .await??;

        info!(path = %path.display(), "key pair saved");
        Ok(path)
    }
}

fn write_new_file(path: &Path, data: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}
