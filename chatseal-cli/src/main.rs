use anyhow::{bail, Context, Result};
use chatseal_core::config::Config;
use chatseal_core::core_envelope::{codec, ParsedContent};
use chatseal_core::core_keys::{FileKeyStore, KeyStore, PublicKey, PublicKeyDirectory};
use chatseal_core::logging::{init_logging_with_config, LogConfig};
use chatseal_core::{metrics, DecryptedContent, Decryptor, Encryptor, MissingKeyPolicy, UserId};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatseal")]
#[command(author, version, about = "End-to-end encrypted message envelopes", long_about = None)]
struct Args {
    /// Configuration file (TOML); CHATSEAL_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the local key pair if there is none and print the public key
    Keygen,

    /// Replace the local key pair, keeping the old private key for decryption
    Rotate,

    /// Print the local public key
    Pubkey,

    /// Encrypt a message and print the wire content
    Encrypt {
        /// Local user id (the sender)
        #[arg(short, long)]
        user: String,

        /// Recipient as `id=<base64 public key>`, or a bare `id` with no known key
        #[arg(short, long = "recipient", value_parser = parse_recipient)]
        recipients: Vec<(UserId, Option<PublicKey>)>,

        /// Send as plaintext if a recipient key is missing
        #[arg(long)]
        degrade: bool,

        plaintext: String,
    },

    /// Decrypt wire content for the local user
    Decrypt {
        /// Local user id
        #[arg(short, long)]
        user: String,

        content: String,
    },

    /// Show what kind of content a wire value is, without decrypting it
    Inspect { content: String },
}

fn parse_recipient(arg: &str) -> Result<(UserId, Option<PublicKey>), String> {
    match arg.split_once('=') {
        Some((id, key)) if !id.is_empty() => {
            let key = PublicKey::from_base64(key).map_err(|e| e.to_string())?;
            Ok((UserId::from(id), Some(key)))
        }
        Some(_) => Err(format!("missing user id in '{}'", arg)),
        None if !arg.is_empty() => Ok((UserId::from(arg), None)),
        None => Err("empty recipient".to_string()),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::from_env()?);
    };

    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let mut config = Config::from_file(&expanded)
        .with_context(|| format!("loading configuration from {}", expanded))?;
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

fn open_keystore(config: &Config) -> Result<FileKeyStore> {
    let path = shellexpand::tilde(&config.keystore.path.to_string_lossy()).into_owned();
    let password = config.keystore.password();
    if password.is_none() {
        warn!(path = %path, "No keystore password configured; key ring is stored unencrypted");
    }
    FileKeyStore::open(&path, password.as_deref())
        .with_context(|| format!("opening key ring at {}", path))
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Keygen => {
            let keystore = open_keystore(config)?;
            let public = keystore.ensure_keys()?;
            info!(fingerprint = %public.fingerprint(), "Local key pair ready");
            println!("{}", public.to_base64());
        }
        Command::Rotate => {
            let keystore = open_keystore(config)?;
            let public = keystore.rotate()?;
            println!("{}", public.to_base64());
        }
        Command::Pubkey => {
            let keystore = open_keystore(config)?;
            let public = keystore
                .public_key()
                .context("no local key pair; run `chatseal keygen`")?;
            info!(fingerprint = %public.fingerprint(), "Local public key");
            println!("{}", public.to_base64());
        }
        Command::Encrypt {
            user,
            recipients,
            degrade,
            plaintext,
        } => {
            let keystore = Arc::new(open_keystore(config)?);

            let directory = PublicKeyDirectory::new();
            let mut participants = Vec::with_capacity(recipients.len());
            for (user_id, key) in recipients {
                if let Some(key) = key {
                    directory.insert(user_id.clone(), key)?;
                }
                participants.push(user_id);
            }

            let mut crypto = config.crypto.clone();
            if degrade {
                crypto.missing_key_policy = MissingKeyPolicy::Degrade;
            }

            let encryptor = Encryptor::new(keystore, UserId::from(user.as_str()), &crypto);
            let outgoing = encryptor
                .prepare_outgoing(&plaintext, &participants, &directory)
                .await?;
            println!("{}", outgoing.as_wire());
        }
        Command::Decrypt { user, content } => {
            let keystore = Arc::new(open_keystore(config)?);
            let decryptor = Decryptor::new(keystore, UserId::from(user.as_str()));

            // bare content carries no deletion flag, so only these three kinds occur
            match decryptor.open_content(&Value::String(content)) {
                DecryptedContent::Text(text) => println!("{}", text),
                DecryptedContent::System(event) => {
                    println!("{}", event.describe(event.actor_id.as_str()))
                }
                DecryptedContent::Deleted | DecryptedContent::Undecryptable => {
                    bail!("{}", config.display.undecryptable_placeholder)
                }
            }
        }
        Command::Inspect { content } => {
            let parsed = codec::parse_str(&content);
            println!("{:?}", parsed.kind());
            if let ParsedContent::V2(envelope) = &parsed {
                for recipient in envelope.recipients() {
                    println!("  {}", recipient);
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_ref())?;

    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse()?;
    }
    if args.json_logs {
        log_config.json_format = true;
    }
    init_logging_with_config(log_config)?;
    metrics::init_metrics();

    run(args.command, &config).await
}
