use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use strata_crypto::{capability, KeyExchange, PostQuantumEngine, StrataConfig};
use tracing::info;
use zeroize::Zeroizing;

mod sealed;

use crate::sealed::PasswordSealed;

const PASSWORD_ENV: &str = "STRATA_PASSWORD";
const PASSWORD_CONFIRM_ENV: &str = "STRATA_PASSWORD_CONFIRM";

#[derive(Parser, Debug)]
#[command(author, version, about = "Strata layered encryption", long_about = None)]
struct Cli {
    /// JSON configuration file (cipher padding, password KDF cost)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print algorithms and capabilities as JSON
    Info,
    /// Generate an ephemeral X25519 public key
    Keygen,
    /// Encrypt under a password; prints a sealed JSON document
    Encrypt {
        /// Plaintext; read from stdin when omitted
        #[arg(long)]
        text: Option<String>,
    },
    /// Decrypt a sealed JSON document
    Decrypt {
        /// Sealed document; read from stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Serialize)]
struct KeygenOutput {
    public_key: String,
    fingerprint: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_crypto=info,strata=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    // This binary ships without a post-quantum engine.
    capability::initialize(|| Ok::<Option<Arc<dyn PostQuantumEngine>>, String>(None));

    match cli.command {
        Commands::Info => print_json(&capability::info()),
        Commands::Keygen => keygen_command(),
        Commands::Encrypt { text } => encrypt_command(text, &config),
        Commands::Decrypt { input } => decrypt_command(input),
        Commands::Config => {
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<StrataConfig> {
    match path {
        Some(p) => {
            let config = StrataConfig::load(p)
                .with_context(|| format!("loading config {}", p.display()))?;
            info!(path = %p.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(StrataConfig::default()),
    }
}

fn keygen_command() -> Result<()> {
    let exchange = KeyExchange::new();
    print_json(&KeygenOutput {
        public_key: exchange.public_key_b64(),
        fingerprint: exchange.fingerprint(),
    })
}

fn encrypt_command(text: Option<String>, config: &StrataConfig) -> Result<()> {
    let plaintext = match text {
        Some(t) => Zeroizing::new(t.into_bytes()),
        None => read_stdin()?,
    };
    let password = prompt_password_twice("Encryption password: ")?;
    let sealed = sealed::seal(&password, &plaintext, config)?;
    info!(kdf = sealed.kdf.name(), bytes = plaintext.len(), "payload sealed");
    print_json(&sealed)
}

fn decrypt_command(input: Option<PathBuf>) -> Result<()> {
    let raw = match input {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let bytes = read_stdin()?;
            String::from_utf8(bytes.to_vec()).context("sealed document is not UTF-8")?
        }
    };
    let sealed: PasswordSealed =
        serde_json::from_str(&raw).context("sealed document is not valid JSON")?;
    let password = prompt_password_once("Decryption password: ")?;
    let plaintext = sealed::open(&password, &sealed)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&plaintext)?;
    stdout.flush()?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_stdin() -> Result<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(Vec::new());
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("reading stdin")?;
    Ok(buf)
}

fn prompt_password_once(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }
    let pw = rpassword::prompt_password(prompt).map_err(|e| anyhow!("password prompt: {e}"))?;
    if pw.is_empty() {
        return Err(anyhow!("password must not be empty"));
    }
    Ok(Zeroizing::new(pw))
}

fn prompt_password_twice(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            if let Ok(confirm) = std::env::var(PASSWORD_CONFIRM_ENV) {
                if confirm != pw {
                    return Err(anyhow!("password confirmation mismatch"));
                }
            }
            return Ok(Zeroizing::new(pw));
        }
    }
    let first = prompt_password_once(prompt)?;
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm password: ")
            .map_err(|e| anyhow!("password prompt: {e}"))?,
    );
    if *first != *second {
        return Err(anyhow!("passwords do not match"));
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_encrypt_with_config() {
        let cli = Cli::parse_from(["strata", "--config", "c.json", "encrypt", "--text", "hi"]);
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        assert!(matches!(cli.command, Commands::Encrypt { text: Some(ref t) } if t == "hi"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/strata.json");
        assert!(load_config(Some(&path)).is_err());
        assert_eq!(load_config(None).unwrap(), StrataConfig::default());
    }
}
