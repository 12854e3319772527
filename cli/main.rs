use anyhow::{bail, Context, Result};
use axcrypt::blocks::HeaderBlock;
use axcrypt::config::Config;
use axcrypt::document::{Credential, EncryptOptions};
use axcrypt::file_ops::{encrypted_path, FileOps};
use axcrypt::keypair::recipient_tag_hex;
use axcrypt::keystore::{key_file_name, KeyStore};
use axcrypt::streaming::Progress;
use axcrypt::suite::CryptoId;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::{ExposeSecret, SecretString};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use x25519_dalek::PublicKey;

/// axcrypt - encrypted containers with passphrases and shared key pairs
#[derive(Parser)]
#[command(name = "axcrypt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file
    Encrypt {
        /// Input file to encrypt
        input: PathBuf,

        /// Container path (defaults to the input path plus .axx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Passphrase (prompted for when absent)
        #[arg(short, long, env = "AXCRYPT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,

        /// Base64 X25519 public key to share with (repeatable)
        #[arg(short, long)]
        recipient: Vec<String>,

        /// Encrypt for the recipients only, without a passphrase wrap
        #[arg(long, requires = "recipient")]
        no_passphrase: bool,

        /// Crypto suite name (defaults to the configured suite)
        #[arg(short, long)]
        suite: Option<String>,

        /// Compress before encryption
        #[arg(long)]
        compress: bool,
    },

    /// Decrypt a file
    Decrypt {
        /// Container to decrypt
        input: PathBuf,

        /// Output path (defaults to the name stored in the container)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Passphrase (prompted for when absent)
        #[arg(short, long, env = "AXCRYPT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,

        /// Also try the key pairs of this identity from the key store
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Show the clear header blocks of a container
    Inspect {
        /// Container to inspect
        input: PathBuf,
    },

    /// Manage key pairs
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
}

#[derive(Subcommand, Debug)]
enum KeyCommands {
    /// Generate a key pair unless one already exists
    Create {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "AXCRYPT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },

    /// List the key pairs of an identity
    List {
        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "AXCRYPT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },

    /// Copy a key file into the key store
    Import {
        /// Key file to import
        file: PathBuf,

        #[arg(short, long)]
        email: String,

        #[arg(short, long, env = "AXCRYPT_PASSPHRASE", hide_env_values = true)]
        passphrase: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use RUST_LOG to control log level (e.g., RUST_LOG=info,axcrypt=debug)
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let cfg = Config::load_with_env(Some(cli.config.as_str()))?;
    info!(config = %cli.config, suite = %cfg.default_suite, "axcrypt starting");

    match cli.command {
        Commands::Encrypt {
            input,
            output,
            passphrase,
            recipient,
            no_passphrase,
            suite,
            compress,
        } => {
            let passphrase = if no_passphrase {
                None
            } else {
                Some(resolve_passphrase(passphrase)?)
            };
            cmd_encrypt(
                &cfg,
                &input,
                output,
                passphrase,
                &recipient,
                suite.as_deref(),
                compress,
            )
            .await
        }

        Commands::Decrypt {
            input,
            output,
            passphrase,
            email,
        } => {
            let passphrase = resolve_passphrase(passphrase)?;
            cmd_decrypt(&cfg, &input, output.as_deref(), passphrase, email.as_deref()).await
        }

        Commands::Inspect { input } => cmd_inspect(&cfg, &input).await,

        Commands::Keys { command } => match command {
            KeyCommands::Create { email, passphrase } => {
                cmd_keys_create(&cfg, &email, resolve_passphrase(passphrase)?).await
            }
            KeyCommands::List { email, passphrase } => {
                cmd_keys_list(&cfg, &email, resolve_passphrase(passphrase)?).await
            }
            KeyCommands::Import {
                file,
                email,
                passphrase,
            } => cmd_keys_import(&cfg, &file, &email, resolve_passphrase(passphrase)?).await,
        },
    }
}

/// Progress bar fed by the container codec
struct BarProgress(ProgressBar);

impl Progress for BarProgress {
    fn advance(&self, bytes: u64) {
        self.0.inc(bytes);
    }
}

/// Create a styled progress bar for file operations
fn create_progress_bar(total: u64, message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}

/// Create a spinner for operations of unknown output size
fn create_spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg} {bytes}")?);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(pb)
}

/// Use the given passphrase or prompt for one on stderr.
fn resolve_passphrase(given: Option<String>) -> Result<SecretString> {
    if let Some(p) = given {
        return Ok(SecretString::from(p));
    }
    eprint!("Passphrase: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
    if trimmed.is_empty() {
        bail!("a passphrase is required");
    }
    Ok(SecretString::from(trimmed))
}

fn parse_public_key(encoded: &str) -> Result<PublicKey> {
    let bytes = BASE64
        .decode(encoded.trim())
        .with_context(|| format!("recipient key {:?} is not base64", encoded))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("recipient key {:?} must decode to 32 bytes", encoded))?;
    Ok(PublicKey::from(bytes))
}

/// Encrypt a file
async fn cmd_encrypt(
    cfg: &Config,
    input: &Path,
    output: Option<PathBuf>,
    passphrase: Option<SecretString>,
    recipients: &[String],
    suite: Option<&str>,
    compress: bool,
) -> Result<()> {
    let ops = FileOps::from_config(cfg)?;
    let output = output.unwrap_or_else(|| encrypted_path(input));

    let name = input
        .file_name()
        .context("input file has no filename")?
        .to_string_lossy()
        .to_string();
    let mut options = EncryptOptions::new(name).with_compression(compress);
    if let Some(p) = passphrase {
        options = options.with_passphrase(p);
    }
    for encoded in recipients {
        options = options.with_recipient(parse_public_key(encoded)?);
    }
    if let Some(suite) = suite {
        let id = ops
            .registry()
            .by_name(suite)
            .map(|f| f.id())
            .with_context(|| format!("no crypto suite named {:?}", suite))?;
        options = options.with_suite(id);
    }

    let input_size = fs::metadata(input)
        .await
        .with_context(|| format!("reading metadata for {}", input.display()))?
        .len();
    let compress_str = if options.compress || cfg.compress { " (compressed)" } else { "" };
    let pb = create_progress_bar(input_size, &format!("Encrypting{}", compress_str))?;

    let bytes = ops
        .encrypt_file(input, &output, options, BarProgress(pb.clone()))
        .await?;
    pb.finish_with_message(format!("Encrypted {} bytes", bytes));

    println!("  {} -> {}", input.display(), output.display());
    Ok(())
}

/// Decrypt a file
async fn cmd_decrypt(
    cfg: &Config,
    input: &Path,
    output: Option<&Path>,
    passphrase: SecretString,
    email: Option<&str>,
) -> Result<()> {
    let ops = FileOps::from_config(cfg)?;

    let mut credentials = Vec::new();
    if let Some(email) = email {
        let store = KeyStore::open(
            &cfg.key_store_dir,
            email,
            SecretString::from(passphrase.expose_secret().to_owned()),
            ops.registry().clone(),
            Vec::new(),
        )
        .await?;
        credentials.extend(store.pairs().iter().cloned().map(Credential::KeyPair));
    }
    credentials.push(Credential::Passphrase {
        secret: passphrase,
        suite: None,
    });

    let spinner = create_spinner(&format!("Decrypting {}...", input.display()))?;
    let result = ops
        .decrypt_file(input, output, credentials, BarProgress(spinner.clone()))
        .await;
    let (path, doc) = match result {
        Ok(done) => done,
        Err(e) => {
            spinner.abandon_with_message("Decryption failed");
            return Err(e);
        }
    };

    let compress_note = if doc.compressed { " (was compressed)" } else { "" };
    spinner.finish_with_message(format!(
        "Decrypted {} bytes{} -> {}",
        doc.plaintext_length,
        compress_note,
        path.display()
    ));
    Ok(())
}

/// Show the clear header structure
async fn cmd_inspect(cfg: &Config, input: &Path) -> Result<()> {
    let ops = FileOps::from_config(cfg)?;
    let blocks = ops.inspect_file(input).await?;
    let suite_name = |id: CryptoId| {
        ops.registry()
            .get(id)
            .map(|f| f.name().to_string())
            .unwrap_or_else(|_| format!("unknown ({})", id))
    };

    println!("{} ({} header blocks)", input.display(), blocks.len());
    println!();
    println!("{:<22} {:>8}  {}", "BLOCK", "BYTES", "DETAILS");
    println!("{}", "-".repeat(64));
    for block in &blocks {
        let details = match block {
            HeaderBlock::Version(v) => format!("{}.{}.{}", v.major, v.minor, v.minuscule),
            HeaderBlock::KeyWrap(w) => format!("passphrase, {} iterations", w.iterations),
            HeaderBlock::AsymmetricKeyWrap(w) => format!(
                "recipient {}, {}",
                w.recipient_tag.iter().map(|b| format!("{:02x}", b)).collect::<String>(),
                suite_name(w.suite)
            ),
            HeaderBlock::Data(len) => format!("{} payload bytes", len),
            HeaderBlock::Unrecognized { tag, .. } => format!("tag {}", tag),
            b if b.block_type().is_encrypted() => "encrypted".to_string(),
            _ => String::new(),
        };
        println!(
            "{:<22} {:>8}  {}",
            format!("{:?}", block.block_type()),
            block.payload().len(),
            details
        );
    }
    Ok(())
}

async fn open_store(cfg: &Config, email: &str, passphrase: SecretString) -> Result<KeyStore> {
    KeyStore::open(&cfg.key_store_dir, email, passphrase, cfg.registry()?, Vec::new()).await
}

/// Generate a key pair for an identity
async fn cmd_keys_create(cfg: &Config, email: &str, passphrase: SecretString) -> Result<()> {
    let store =
        KeyStore::open_or_create(&cfg.key_store_dir, email, passphrase, cfg.registry()?, Vec::new())
            .await?;
    let pair = store.current().context("key store is empty after creation")?;
    println!("Key pair for {}", store.email());
    println!("  File:       {}", store.dir().join(key_file_name(pair)).display());
    println!("  Public key: {}", BASE64.encode(pair.public_key().as_bytes()));
    Ok(())
}

/// List key pairs, newest first
async fn cmd_keys_list(cfg: &Config, email: &str, passphrase: SecretString) -> Result<()> {
    let store = open_store(cfg, email, passphrase).await?;
    if store.pairs().is_empty() {
        println!("No key pairs found for {}", email);
        return Ok(());
    }

    println!("Key pairs for {} ({} total):", email, store.pairs().len());
    println!();
    println!("{:<18} {:<26} {}", "TAG", "CREATED", "PUBLIC KEY");
    println!("{}", "-".repeat(90));
    for pair in store.pairs() {
        println!(
            "{:<18} {:<26} {}",
            recipient_tag_hex(pair.public_key()),
            pair.timestamp().to_rfc3339(),
            BASE64.encode(pair.public_key().as_bytes())
        );
    }
    Ok(())
}

/// Import a key file
async fn cmd_keys_import(
    cfg: &Config,
    file: &Path,
    email: &str,
    passphrase: SecretString,
) -> Result<()> {
    let mut store = open_store(cfg, email, passphrase).await?;
    let pair = store.import(file).await?;
    println!(
        "Imported {} -> {}",
        file.display(),
        store.dir().join(key_file_name(&pair)).display()
    );
    Ok(())
}
