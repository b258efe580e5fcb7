//! apictl
//!
//! Command-line client for the authenticated API:
//! 1. Loads configuration and the persisted session
//! 2. Sends one request through the auth pipeline
//! 3. Prints the response body to stdout; logs go to stderr as JSON
//!
//! Expired access tokens are renewed transparently. When the session can't
//! be renewed the stored tokens are removed and the user must log in again.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use auth_pipeline::{ApiClient, ApiError, FileUpload};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use session_auth::{CredentialStore, FileStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{ApiResponse, ReqwestTransport};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "apictl")]
#[command(version, about = "Command-line client for the authenticated API")]
struct Cli {
    /// Config file; falls back to CONFIG_PATH, then ./apictl.toml
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Sign in and store the issued tokens
    Login {
        email: String,
        #[arg(env = "APICTL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and remove the stored tokens
    Logout,
    /// Show whether a session is stored
    Status,
    Get {
        path: String,
    },
    Post {
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_json_body)]
        body: Option<Value>,
    },
    Put {
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_json_body)]
        body: Option<Value>,
    },
    Delete {
        path: String,
    },
    /// Upload a file as multipart field `file`
    Upload {
        path: String,
        file: PathBuf,
        /// Defaults to a guess from the file extension
        content_type: Option<String>,
    },
}

fn parse_json_body(raw: &str) -> std::result::Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("request body is not valid JSON: {e}"))
}

/// MIME type from a file extension.
fn guess_content_type(file: &Path) -> &'static str {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Turn a pipeline error into a user-facing one.
fn explain(err: ApiError) -> anyhow::Error {
    if err.session_ended() {
        return anyhow!("{} (run `apictl login` to sign in again)", err.message());
    }
    match err.status() {
        Some(status) => anyhow!("{} [{}, {status}]", err.message(), err.kind().label()),
        None => anyhow!("{} [{}]", err.message(), err.kind().label()),
    }
}

fn print_response(response: &ApiResponse) {
    match response.decode::<Value>() {
        Ok(body) => match serde_json::to_string_pretty(&body) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{body}"),
        },
        Err(_) if response.body.is_empty() => {}
        Err(_) => println!("{}", response.text()),
    }
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
    let response = match command {
        Command::Login { email, password } => {
            client.login(&email, &password).await.map_err(explain)?;
            println!("{}", json!({ "logged_in": true }));
            return Ok(());
        }
        Command::Logout => {
            client.logout().await.map_err(explain)?;
            println!("{}", json!({ "logged_in": false }));
            return Ok(());
        }
        Command::Status => {
            let credentials = client.credentials().get().await;
            println!(
                "{}",
                json!({
                    "logged_in": credentials.access_token.is_some(),
                    "renewable": credentials.refresh_token.is_some(),
                    "base_url": client.config().base_url,
                })
            );
            return Ok(());
        }
        Command::Get { path } => client.get(&path).await,
        Command::Post { path, body } => client.post(&path, body.unwrap_or(Value::Null)).await,
        Command::Put { path, body } => client.put(&path, body.unwrap_or(Value::Null)).await,
        Command::Delete { path } => client.delete(&path).await,
        Command::Upload {
            path,
            file,
            content_type,
        } => {
            let file_path = file.as_path();
            let data = tokio::fs::read(file_path)
                .await
                .with_context(|| format!("failed to read {}", file_path.display()))?;
            let file_name = file_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload")
                .to_string();
            let content_type =
                content_type.unwrap_or_else(|| guess_content_type(file_path).to_string());
            client
                .upload(&path, FileUpload::new(file_name, content_type, data))
                .await
        }
    };

    print_response(&response.map_err(explain)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout carries only response bodies
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let config_path = Config::resolve_path(cli.config.as_deref());
    // An explicitly requested file must exist; the default location is optional
    let loaded = match cli.config {
        Some(_) => Config::load(&config_path),
        None => Config::load_or_default(&config_path),
    };
    let config =
        loaded.with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        path = %config_path.display(),
        base_url = %config.api.base_url,
        credentials = %config.credentials.path.display(),
        "configuration loaded"
    );

    let backend = FileStore::load(config.credentials.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open credentials at {}",
                config.credentials.path.display()
            )
        })?;
    let credentials = CredentialStore::load(Arc::new(backend))
        .await
        .context("failed to read stored session")?;

    let client_config = config.client_config();
    let transport = ReqwestTransport::new(reqwest::Client::new(), client_config.timeout);
    let client = ApiClient::new(client_config, Arc::new(transport), Arc::new(credentials));

    run(&client, cli.command).await
}
