//! GitHub App Installation Token Generator
//!
//! Prints a short-lived installation access token for the App, either for a
//! known installation or for the installation covering a repository.
//!
//! ## Usage
//! ```bash
//! # With command line arguments
//! get-token \
//!   --app-id 123456 \
//!   --private-key-path ./key.pem \
//!   --installation-id 78901234
//!
//! # Resolve the installation from a repository
//! GITHUB_APP_ID=123456 \
//! GITHUB_APP_PRIVATE_KEY_PATH=./key.pem \
//! get-token --repo ohdsi/factory --format json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use factory_github_app::client::DEFAULT_API_URL;
use factory_github_app::{
    AppIdentity, ClientConfig, CredentialClient, InstallationToken, PrivateKey, TokenCache,
};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// GitHub App Installation Token Generator
#[derive(Parser, Debug)]
#[command(name = "get-token")]
#[command(about = "Generate GitHub App installation access tokens")]
#[command(version)]
struct Args {
    /// GitHub App ID
    #[arg(long, env = "GITHUB_APP_ID")]
    app_id: String,

    /// Path to the private key PEM file
    #[arg(long, env = "GITHUB_APP_PRIVATE_KEY_PATH")]
    private_key_path: PathBuf,

    /// GitHub App Installation ID
    #[arg(long, env = "GITHUB_INSTALLATION_ID", conflicts_with = "repo")]
    installation_id: Option<String>,

    /// Repository (owner/repo) whose installation should be used
    #[arg(long)]
    repo: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Write the token to this file (mode 0600) instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Token)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// The bare token
    Token,
    /// Token, installation and expiry as a JSON document
    Json,
}

#[derive(Serialize)]
struct TokenDocument<'a> {
    token: &'a str,
    installation_id: &'a str,
    expires_at: String,
}

fn render(token: &InstallationToken, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Token => Ok(token.token.clone()),
        OutputFormat::Json => {
            let document = TokenDocument {
                token: &token.token,
                installation_id: &token.installation_id,
                expires_at: token.expires_at.to_rfc3339(),
            };
            Ok(serde_json::to_string_pretty(&document)?)
        }
    }
}

/// Create or truncate `path` readable by the owner only
fn write_token_file(path: &Path, contents: &str) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);

    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    // An existing file keeps its old mode on open
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write token to {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let identity = AppIdentity::new(&args.app_id, Some(PrivateKey::Path(args.private_key_path)));
    let client = CredentialClient::new(
        identity,
        Arc::new(TokenCache::default()),
        ClientConfig::default().with_api_url(&args.api_url),
    )?;

    let installation_id = match (args.installation_id, args.repo) {
        (Some(id), _) => id,
        (None, Some(repo)) => {
            eprintln!("🔎 Resolving installation for {}...", repo);
            client
                .resolve_installation(&repo)
                .await?
                .with_context(|| format!("GitHub App {} is not installed on {}", args.app_id, repo))?
        }
        (None, None) => anyhow::bail!("Either --installation-id or --repo must be specified"),
    };

    let token = client.installation_token(&installation_id).await?;
    let rendered = render(&token, args.format)?;

    match args.output {
        Some(path) => {
            write_token_file(&path, &rendered)?;
            eprintln!("🔑 Installation {} token written to {}", installation_id, path.display());
        }
        None => {
            println!("{}", rendered);
            eprintln!("🔑 Installation {} token valid until {}", installation_id, token.expires_at);
        }
    }

    Ok(())
}
