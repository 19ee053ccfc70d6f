//! Mailgate Daemon - Main entry point
//!
//! Loads configuration and the allow-list, wires the verification policy to
//! Discord and Resend, and serves the health and ingress endpoints.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailgate_core::{AllowList, SessionStore, VerificationPolicy};
use mailgate_daemon::{
    load_dotenv, AppState, CommandRouter, DaemonConfig, DiscordDirectory, ResendMailer,
};

#[derive(Parser, Debug)]
#[command(name = "mailgate-daemon")]
#[command(about = "Email verification bot for Discord communities")]
struct Args {
    /// JSON config file; environment variables override its values
    #[arg(short, long, env = "MAILGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before parsing so `.env` can supply MAILGATE_CONFIG too
    let dotenv = load_dotenv(None);
    let args = Args::parse();

    // Initialize logging
    let default_filter = if args.verbose {
        "mailgate_daemon=debug,mailgate_core=debug,tower_http=debug"
    } else {
        "mailgate_daemon=info,mailgate_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mailgate daemon v{}", env!("CARGO_PKG_VERSION"));

    match dotenv {
        Ok(Some(path)) => info!("Loaded environment from {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    }

    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    config.apply_env()?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("{}", e);
        return Err(e.into());
    }

    let allowlist = Arc::new(AllowList::load(&config.emails_filepath)?);

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!("mailgate/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let directory = Arc::new(DiscordDirectory::new(
        http_client.clone(),
        config.discord_api_base.clone(),
        config.discord_token.clone(),
        config.verified_role.clone(),
    ));

    let mailer = Arc::new(ResendMailer::new(
        http_client,
        config.resend_api_base.clone(),
        config.resend_api_key.clone(),
        config.mail_from.clone(),
        config.mail_subject.clone(),
    ));

    let policy = Arc::new(VerificationPolicy::new(
        allowlist,
        SessionStore::new(config.session_config()),
        directory,
        mailer,
    ));

    let router = Arc::new(CommandRouter::new(
        policy,
        config.command_prefix.clone(),
        config.verified_role.clone(),
    ));

    let state = AppState::new(router, config.ingress_token.clone());
    let addr = config.bind_addr()?;

    info!("Email verification bot ready");

    mailgate_daemon::serve(addr, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Received shutdown signal");
    })
    .await?;

    info!("Daemon shutting down");

    Ok(())
}
