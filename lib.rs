//! # axcrypt - Encrypted Container Format Library
//!
//! Reads and writes self-describing encrypted containers: a magic marker,
//! a sequence of typed header blocks (some of them encrypted), an AES-CTR
//! payload and a truncated HMAC-SHA512 tag over everything after the marker.
//!
//! ## Features
//!
//! - **Header blocks**: typed, length-prefixed, sensitive fields sealed with AES-CBC
//! - **Crypto suites**: pluggable registry with an ordered trial for decryption
//! - **Passphrases**: PBKDF2-SHA512 derivation plus the salt-less legacy scheme
//! - **Sharing**: content keys wrapped for X25519 recipients
//! - **Key store**: key pairs kept in containers of the same format
//! - **Streaming**: constant memory, progress reporting and cancellation
//!
//! ## Quick Start
//!
//! ```no_run
//! use axcrypt::{config::Config, document::{Credential, EncryptOptions}, file_ops::FileOps};
//! use axcrypt::streaming::NoProgress;
//! use secrecy::SecretString;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cfg = Config::load_with_env(None)?;
//!     let ops = FileOps::from_config(&cfg)?;
//!
//!     let options = EncryptOptions::new("secret.txt")
//!         .with_passphrase(SecretString::from("correct horse".to_string()));
//!     ops.encrypt_file(Path::new("secret.txt"), Path::new("secret.txt.axx"), options, NoProgress)
//!         .await?;
//!
//!     let (path, doc) = ops
//!         .decrypt_file(
//!             Path::new("secret.txt.axx"),
//!             None,
//!             vec![Credential::passphrase("correct horse")],
//!             NoProgress,
//!         )
//!         .await?;
//!     println!("{} ({} bytes)", path.display(), doc.plaintext_length);
//!     Ok(())
//! }
//! ```

pub mod blocks;
pub mod cipher;
pub mod config;
pub mod document;
pub mod error;
pub mod file_ops;
pub mod hmac_stream;
pub mod kdf;
pub mod keypair;
pub mod keys;
pub mod keystore;
pub mod keywrap;
pub mod lookahead;
pub mod reader;
pub mod streaming;
pub mod suite;

// Re-export common types for convenience
pub use error::{AxCryptError, Result};
