//! High-level file operations.
//!
//! [`FileOps`] wraps the blocking container codec for async callers. Every
//! operation runs on the blocking pool and writes through a temp file in the
//! destination directory, which is only persisted once the codec succeeded.
//! A failed or cancelled decryption therefore leaves no output behind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{File, Metadata};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::blocks::{FileTimes, HeaderBlock};
use crate::config::Config;
use crate::document::{self, Credential, DecryptedDocument, EncryptOptions};
use crate::streaming::Progress;
use crate::suite::CryptoRegistry;

/// Extension given to encrypted files
pub const ENCRYPTED_EXTENSION: &str = "axx";

pub struct FileOps {
    registry: CryptoRegistry,
    compress: bool,
}

impl FileOps {
    pub fn new(registry: CryptoRegistry) -> Self {
        Self {
            registry,
            compress: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.registry()?).with_compression(config.compress))
    }

    /// Compress payloads even when the per-call options do not ask for it.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn registry(&self) -> &CryptoRegistry {
        &self.registry
    }

    /// Encrypt `input` into a container at `output`. Returns the plaintext length.
    ///
    /// File times default to the input's timestamps.
    pub async fn encrypt_file<P>(
        &self,
        input: &Path,
        output: &Path,
        mut options: EncryptOptions,
        progress: P,
    ) -> Result<u64>
    where
        P: Progress + Send + 'static,
    {
        options.compress |= self.compress;
        debug!(input = %input.display(), output = %output.display(), compress = options.compress, "encrypting file");

        let registry = self.registry.clone();
        let input_path = input.to_path_buf();
        let output_path = output.to_path_buf();
        let written = tokio::task::spawn_blocking(move || -> Result<u64> {
            let file = File::open(&input_path)
                .with_context(|| format!("opening {}", input_path.display()))?;
            let metadata = file
                .metadata()
                .with_context(|| format!("reading metadata for {}", input_path.display()))?;
            if options.file_times.is_none() {
                options.file_times = Some(file_times(&metadata));
            }

            let mut temp = temp_beside(&output_path)?;
            let length = {
                let mut writer = BufWriter::new(temp.as_file_mut());
                let length = document::encrypt(
                    &registry,
                    BufReader::new(file),
                    Some(metadata.len()),
                    &mut writer,
                    &options,
                    &progress,
                )?;
                writer.flush()?;
                length
            };
            temp.as_file_mut().sync_all()?;
            temp.persist(&output_path)
                .map_err(|e| e.error)
                .with_context(|| format!("persisting {}", output_path.display()))?;
            Ok(length)
        })
        .await??;

        info!(input = %input.display(), output = %output.display(), bytes = written, "file encrypted");
        Ok(written)
    }

    /// Decrypt the container at `input`.
    ///
    /// Without an explicit `output` the plaintext lands next to the container
    /// under the file name stored inside it. Returns the path written and the
    /// recovered headers.
    pub async fn decrypt_file<P>(
        &self,
        input: &Path,
        output: Option<&Path>,
        credentials: Vec<Credential>,
        progress: P,
    ) -> Result<(PathBuf, DecryptedDocument)>
    where
        P: Progress + Send + 'static,
    {
        debug!(input = %input.display(), credentials = credentials.len(), "decrypting file");

        let registry = self.registry.clone();
        let input_path = input.to_path_buf();
        let explicit = output.map(Path::to_path_buf);
        let result = tokio::task::spawn_blocking(move || -> Result<(PathBuf, DecryptedDocument)> {
            let file = File::open(&input_path)
                .with_context(|| format!("opening {}", input_path.display()))?;
            let staging_dir = match &explicit {
                Some(path) => parent_dir(path),
                None => parent_dir(&input_path),
            };
            let mut temp = NamedTempFile::new_in(&staging_dir)
                .with_context(|| format!("creating temp file in {}", staging_dir.display()))?;

            let doc = {
                let mut writer = BufWriter::new(temp.as_file_mut());
                let doc = document::decrypt(
                    &registry,
                    BufReader::new(file),
                    &mut writer,
                    &credentials,
                    &progress,
                )?;
                writer.flush()?;
                doc
            };

            let target = match explicit {
                Some(path) => path,
                None => staging_dir.join(output_name(&doc.file_name, &input_path)),
            };
            temp.as_file_mut().sync_all()?;
            temp.persist(&target)
                .map_err(|e| e.error)
                .with_context(|| format!("persisting {}", target.display()))?;
            Ok((target, doc))
        })
        .await?;

        match &result {
            Ok((path, doc)) => info!(
                input = %input.display(),
                output = %path.display(),
                bytes = doc.plaintext_length,
                compressed = doc.compressed,
                "file decrypted"
            ),
            Err(e) => error!(input = %input.display(), error = %e, "decryption failed"),
        }
        result
    }

    /// Clear header blocks of the container at `input`.
    pub async fn inspect_file(&self, input: &Path) -> Result<Vec<HeaderBlock>> {
        let input_path = input.to_path_buf();
        let blocks = tokio::task::spawn_blocking(move || -> Result<Vec<HeaderBlock>> {
            let file = File::open(&input_path)
                .with_context(|| format!("opening {}", input_path.display()))?;
            Ok(document::inspect(BufReader::new(file))?)
        })
        .await??;
        debug!(input = %input.display(), blocks = blocks.len(), "file inspected");
        Ok(blocks)
    }
}

/// Default container path for `input`: the same path with `.axx` appended
/// to the extension.
pub fn encrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(ENCRYPTED_EXTENSION);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn temp_beside(path: &Path) -> Result<NamedTempFile> {
    let dir = parent_dir(path);
    NamedTempFile::new_in(&dir).with_context(|| format!("creating temp file in {}", dir.display()))
}

/// Only the final component of a stored name is trusted. Anything unusable
/// falls back to the container name minus its extension.
fn output_name(stored: &str, container: &Path) -> PathBuf {
    match Path::new(stored).file_name() {
        Some(name) => PathBuf::from(name),
        None => {
            let stem = container
                .file_stem()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("decrypted"));
            if container.extension().is_some() {
                stem
            } else {
                PathBuf::from(format!("{}.decrypted", stem.display()))
            }
        }
    }
}

fn file_times(metadata: &Metadata) -> FileTimes {
    let fallback = FileTimes::now();
    let convert = |t: std::io::Result<std::time::SystemTime>, default: DateTime<Utc>| {
        t.ok()
            .map(DateTime::<Utc>::from)
            .and_then(|d| DateTime::from_timestamp_millis(d.timestamp_millis()))
            .unwrap_or(default)
    };
    let modified = convert(metadata.modified(), fallback.modified);
    FileTimes {
        created: convert(metadata.created(), modified),
        accessed: convert(metadata.accessed(), modified),
        modified,
    }
}
