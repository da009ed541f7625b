//! ALFA Vault Engine - CLI
//!
//! Development front end over a file-backed key store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use tracing_subscriber::EnvFilter;

use alfa_vault_engine::{
    CipherSuite, EncryptedBlob, EngineConfig, EnrollmentPins, FileKeyStore, KeyManager,
    VaultEngine,
};

const CONFIG_FILE: &str = "engine.json";
const KEYS_DIR: &str = "keys";

#[derive(Parser)]
#[command(name = "alfa-vault")]
#[command(author = "Karen Tonoyan")]
#[command(version = alfa_vault_engine::VERSION)]
#[command(about = "ALFA Vault Engine - multi-profile encrypted vault")]
struct Cli {
    /// Vault path
    #[arg(short, long, default_value = "./vault")]
    vault: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Suite {
    Chacha20,
    Aes256,
}

impl From<Suite> for CipherSuite {
    fn from(suite: Suite) -> Self {
        match suite {
            Suite::Chacha20 => CipherSuite::ChaCha20Poly1305,
            Suite::Aes256 => CipherSuite::Aes256Gcm,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new vault with primary, decoy and optional duress PINs
    Enroll {
        /// Primary PIN (prompted if omitted)
        #[arg(short, long)]
        pin: Option<String>,

        /// Decoy PIN (prompted if omitted)
        #[arg(long)]
        decoy_pin: Option<String>,

        /// Duress PIN
        #[arg(long)]
        duress_pin: Option<String>,

        /// AEAD cipher suite
        #[arg(long, value_enum, default_value = "chacha20")]
        suite: Suite,

        /// PBKDF2 rounds (minimum 100000)
        #[arg(long, default_value_t = 100_000)]
        rounds: u32,
    },

    /// Check a PIN
    Unlock {
        /// PIN code
        #[arg(short, long)]
        pin: Option<String>,
    },

    /// Encrypt a file
    Seal {
        input: PathBuf,
        output: PathBuf,

        /// PIN code
        #[arg(short, long)]
        pin: Option<String>,
    },

    /// Decrypt a file
    Open {
        input: PathBuf,
        output: PathBuf,

        /// PIN code
        #[arg(short, long)]
        pin: Option<String>,
    },

    /// Rotate the unlocked profile's key, re-encrypting the given files in place
    Rotate {
        files: Vec<PathBuf>,

        /// PIN code
        #[arg(short, long)]
        pin: Option<String>,
    },

    /// Report entropy of a hex key, or of a freshly generated one
    AnalyzeKey {
        /// Key bytes as hex
        key: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn read_pin(arg: Option<String>, prompt: &str) -> anyhow::Result<SecretString> {
    let pin = match arg {
        Some(pin) => pin,
        None => rpassword::prompt_password(prompt).context("reading PIN")?,
    };
    Ok(SecretString::new(pin))
}

fn open_engine(vault: &Path) -> anyhow::Result<VaultEngine> {
    let config = EngineConfig::load_or_default(&vault.join(CONFIG_FILE))?;
    let store = FileKeyStore::new(&vault.join(KEYS_DIR))?;
    Ok(VaultEngine::builder(Arc::new(store)).config(config).load()?)
}

/// Open the vault and unlock it, failing on a denied PIN
fn unlocked(vault: &Path, pin: Option<String>) -> anyhow::Result<VaultEngine> {
    let engine = open_engine(vault)?;
    let pin = read_pin(pin, "PIN: ")?;
    if engine.unlock(&pin)?.is_none() {
        bail!("access denied");
    }
    Ok(engine)
}

fn read_blob(path: &Path) -> anyhow::Result<EncryptedBlob> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(EncryptedBlob::from_bytes(bytes)?)
}

/// Sibling that holds a re-encrypted file until the new key is in place
fn rotating_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".rotating");
    PathBuf::from(name)
}

fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Enroll {
            pin,
            decoy_pin,
            duress_pin,
            suite,
            rounds,
        } => {
            println!("🔐 Creating new ALFA vault...");
            let config = EngineConfig::default()
                .with_cipher_suite(suite.into())
                .with_kdf_rounds(rounds)?;

            let pins = EnrollmentPins {
                primary: read_pin(pin, "Primary PIN: ")?,
                decoy: read_pin(decoy_pin, "Decoy PIN: ")?,
                duress: duress_pin.map(SecretString::new),
            };

            let store = FileKeyStore::new(&cli.vault.join(KEYS_DIR))?;
            VaultEngine::builder(Arc::new(store))
                .config(config.clone())
                .enroll(&pins)?;
            config.save(&cli.vault.join(CONFIG_FILE))?;

            println!("✅ Vault created at: {}", cli.vault.display());
            println!("   Cipher: {}", config.cipher_suite.name());
            println!("   PBKDF2 rounds: {}", config.kdf_rounds);
        }

        Commands::Unlock { pin } => {
            unlocked(&cli.vault, pin)?;
            println!("✅ Vault unlocked!");
        }

        Commands::Seal { input, output, pin } => {
            let engine = unlocked(&cli.vault, pin)?;
            let data = fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
            let blob = engine.seal(&data)?;
            fs::write(&output, blob.as_bytes())?;
            println!("✅ Sealed {} bytes to {}", data.len(), output.display());
        }

        Commands::Open { input, output, pin } => {
            let engine = unlocked(&cli.vault, pin)?;
            let plaintext = engine.open(&read_blob(&input)?)?;
            fs::write(&output, plaintext.as_slice())?;
            println!("✅ Opened to {}", output.display());
        }

        Commands::Rotate { files, pin } => {
            let engine = unlocked(&cli.vault, pin)?;
            let blobs = files
                .iter()
                .map(|f| read_blob(f))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let staged: Vec<PathBuf> = files.iter().map(|f| rotating_path(f)).collect();

            // every new ciphertext is on disk before the stored key changes
            let rotated = engine.rotate_active_key_with(&blobs, |moved| {
                for (path, blob) in staged.iter().zip(moved) {
                    write_synced(path, blob.as_bytes())?;
                }
                Ok(())
            });
            let moved = match rotated {
                Ok(moved) => moved,
                Err(e) => {
                    for path in &staged {
                        let _ = fs::remove_file(path);
                    }
                    return Err(e.into());
                }
            };

            for (from, to) in staged.iter().zip(&files) {
                fs::rename(from, to).with_context(|| {
                    format!("new ciphertext for {} left at {}", to.display(), from.display())
                })?;
            }
            println!("🔄 Key rotated, {} file(s) re-encrypted", moved.len());
        }

        Commands::AnalyzeKey { key } => {
            let keys = KeyManager::default();
            let bytes = match key {
                Some(hex_key) => hex::decode(hex_key.trim()).context("key must be hex")?,
                None => keys.generate()?.expose().to_vec(),
            };
            let strength = keys.analyze_key_strength(&bytes);

            println!("📊 Key strength");
            println!("{:-<40}", "");
            println!("Length:          {} bytes", strength.length);
            println!("Distinct bytes:  {}", strength.distinct_bytes);
            println!("Entropy:         {:.2} / 8.00", strength.entropy);
            println!("Rating:          {:?}", strength.rating);
            println!(
                "Acceptable:      {}",
                if strength.is_acceptable() { "yes" } else { "no" }
            );
        }
    }

    Ok(())
}
