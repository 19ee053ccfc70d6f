//! Mailgate Daemon - Email verification bot service
//!
//! This crate provides:
//! - Configuration from JSON, `.env` files and environment variables
//! - Discord REST membership directory
//! - Resend email delivery of verification codes
//! - Chat command routing and reply rendering
//! - HTTP health endpoint and command ingress for the gateway relay

pub mod commands;
pub mod config;
pub mod discord;
pub mod error;
pub mod http;
pub mod mailer;
pub mod reply;

pub use commands::{Command, CommandRequest, CommandRouter};
pub use config::{load_dotenv, DaemonConfig};
pub use discord::DiscordDirectory;
pub use error::{DaemonError, Result};
pub use http::{app, serve, AppState, CommandResponse};
pub use mailer::ResendMailer;
pub use reply::{Embed, Reply, ReplyBody, ReplyRoute};
