use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharelink_client::{
    batch::{BatchFile, ExpiryHours, UploadOptions},
    client::{ApiClient, ApiError},
    config::Config,
    download::{DownloadGate, GatePhase},
    resolve::LinkResolver,
    session::{FileTokenStore, SessionState},
    upload::UploadOrchestrator,
};

#[derive(Parser)]
#[command(name = "sharelink")]
#[command(about = "Share files through short-lived links")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload files and print the share link
    Upload {
        #[arg(required = true, help = "Files to include in the batch (max 5, 30 MiB total)")]
        files: Vec<PathBuf>,
        #[arg(long, help = "Protect the link with a password")]
        password: Option<String>,
        #[arg(long, default_value_t = 24, help = "Link lifetime: 1, 3, 6, 12, 24, 48, 72 or 168")]
        expiry_hours: u32,
    },
    /// Show public metadata for a short code
    Info { short_code: String },
    /// Exchange a short code for a one-time download URL
    Download {
        short_code: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Store a bearer token issued by the identity provider
    Login { token: String },
    /// Forget the stored token
    Logout,
    /// Show who the stored token says you are
    Whoami,
    /// List your past uploads
    Uploads,
    /// Delete one of your links
    Delete { short_code: String },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = Cli::parse();
    let config = Config::load()?;
    let api = ApiClient::new(config.api_base.clone())?;
    let store = FileTokenStore::new(&config.token_path)?;
    let session = Arc::new(SessionState::new(Arc::new(store)));

    match cli.command {
        Commands::Upload {
            files,
            password,
            expiry_hours,
        } => {
            let Some(expiry) = ExpiryHours::from_hours(expiry_hours) else {
                anyhow::bail!("expiry must be one of 1, 3, 6, 12, 24, 48, 72 or 168 hours");
            };

            let mut incoming = Vec::with_capacity(files.len());
            for path in &files {
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    anyhow::bail!("{} has no usable file name", path.display());
                };
                let content = tokio::fs::read(path).await?;
                incoming.push(BatchFile::new(name, Bytes::from(content)));
            }

            let orchestrator = UploadOrchestrator::new(api.clone(), Arc::clone(&session));
            orchestrator.add_files(incoming).await?;
            orchestrator
                .set_options(UploadOptions::new(expiry, password))
                .await?;

            let mut progress = orchestrator.progress_updates();
            let printer = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    if let Some(percent) = *progress.borrow() {
                        eprint!("\rUploading: {percent}%");
                    }
                }
            });

            let result = orchestrator.upload().await;
            printer.abort();
            eprintln!();

            let result = result?;
            println!("{}", result.short_link);
            println!("Scan to download: {}", api.qr_url(&result.short_code));
        }

        Commands::Info { short_code } => {
            let resolver = LinkResolver::new(api.clone());
            let metadata = resolver.resolve(&short_code).await?;

            for (name, size) in metadata.file_names.iter().zip(&metadata.file_sizes) {
                println!("{name}  {}", format_bytes(*size));
            }
            println!("Downloads: {}", metadata.download_count);
            if metadata.password_protected {
                println!("Password protected.");
            }
            if metadata.expired {
                println!("This link has expired.");
            } else {
                println!("Expires in: {} hours", metadata.expires_in_hours);
                println!("Scan to download: {}", resolver.qr_url(&short_code));
            }
        }

        Commands::Download {
            short_code,
            password,
        } => {
            let resolver = LinkResolver::new(api.clone());
            let metadata = resolver.resolve(&short_code).await?;
            let gate = DownloadGate::new(api.clone(), &short_code, &metadata);

            if gate.phase().await == GatePhase::Blocked {
                anyhow::bail!("This link has expired.");
            }
            if gate.password_protected() && password.is_none() {
                anyhow::bail!("This link is password protected; pass --password.");
            }

            let grant = gate.exchange(password.as_deref()).await?;
            println!("{}", grant.download_url);
        }

        Commands::Login { token } => {
            let Some(claims) = SessionState::decode(&token) else {
                anyhow::bail!("that token does not decode as a bearer token");
            };
            session.log_in(&token).await?;
            println!("Logged in as {}", claims.email.unwrap_or(claims.sub));
        }

        Commands::Logout => {
            session.log_out().await?;
            println!("Logged out.");
        }

        Commands::Whoami => match session.current_claims().await? {
            Some(claims) => {
                println!("{}", claims.email.as_deref().unwrap_or(&claims.sub));
                if let Some(expires) = claims.exp.and_then(|s| chrono::DateTime::from_timestamp(s, 0))
                {
                    println!("Session expires: {}", expires.to_rfc3339());
                }
            }
            None => println!("Not logged in."),
        },

        Commands::Uploads => {
            let token = require_token(&session).await?;
            match api.my_uploads(&token).await {
                Ok(uploads) if uploads.is_empty() => println!("No uploads yet."),
                Ok(uploads) => {
                    for upload in uploads {
                        let name = upload.file_names.first().map(String::as_str).unwrap_or("-");
                        let expired = if upload.expired { "  (expired)" } else { "" };
                        println!(
                            "{}  {}  {}  {} downloads{}",
                            upload.short_code,
                            name,
                            format_bytes(upload.total_size),
                            upload.download_count,
                            expired,
                        );
                    }
                }
                Err(e) => return Err(implicit_logout(&session, e).await),
            }
        }

        Commands::Delete { short_code } => {
            let token = require_token(&session).await?;
            match api.delete_link(&short_code, &token).await {
                Ok(()) => println!("Deleted {short_code}."),
                Err(e) => return Err(implicit_logout(&session, e).await),
            }
        }
    }

    Ok(())
}

async fn require_token(session: &SessionState) -> anyhow::Result<String> {
    match session.current_token().await? {
        Some(token) => Ok(token),
        None => anyhow::bail!("Not logged in."),
    }
}

/// The client trusts its local expiry check only so far: a token the server
/// refuses is treated as an implicit logout.
async fn implicit_logout(session: &SessionState, error: ApiError) -> anyhow::Error {
    if matches!(error, ApiError::Auth(_)) {
        if let Err(e) = session.log_out().await {
            tracing::warn!(error = %e, "failed to clear rejected token");
        }
        return anyhow::anyhow!("The server rejected your session; you have been logged out.");
    }
    error.into()
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let exponent = ((bytes as f64).log(1024.0).floor() as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    format!("{value:.1} {}", UNITS[exponent])
}
