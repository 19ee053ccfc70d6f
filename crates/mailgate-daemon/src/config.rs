//! Daemon configuration
//!
//! Defaults can be overridden by a JSON file and then by environment
//! variables. The platform and email credentials are required; startup aborts
//! without them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mailgate_core::{
    SessionConfig, DEFAULT_SESSION_TTL_SECS, DEFAULT_VERIFIED_ROLE, MAX_SESSION_TTL_SECS,
};

use crate::error::{DaemonError, Result};

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Discord bot token
    #[serde(skip_serializing)]
    pub discord_token: String,

    /// Resend API key
    #[serde(skip_serializing)]
    pub resend_api_key: String,

    /// Line-delimited allow-list file
    pub emails_filepath: PathBuf,

    /// HTTP bind host
    pub host: String,

    /// HTTP bind port
    pub port: u16,

    /// Name of the role granted on success
    pub verified_role: String,

    /// Command prefix on the chat platform
    pub command_prefix: String,

    /// Sender address for verification emails
    pub mail_from: String,

    /// Subject line for verification emails
    pub mail_subject: String,

    /// Lifetime of a verification code (seconds)
    pub session_ttl_secs: u64,

    /// Wrong codes allowed per session; unlimited when absent
    pub max_code_attempts: Option<u32>,

    /// Bearer token required on the command ingress; open when absent
    #[serde(skip_serializing)]
    pub ingress_token: Option<String>,

    /// Discord REST base URL
    pub discord_api_base: String,

    /// Resend REST base URL
    pub resend_api_base: String,

    /// Timeout for outbound HTTP calls (seconds)
    pub http_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            resend_api_key: String::new(),
            emails_filepath: PathBuf::from("allowed_emails.txt"),
            host: "0.0.0.0".to_string(),
            port: 10000,
            verified_role: DEFAULT_VERIFIED_ROLE.to_string(),
            command_prefix: "!".to_string(),
            mail_from: "donotreply@quantchallenge.org".to_string(),
            mail_subject: "QuantChallenge 2025 Discord Verification Code".to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            max_code_attempts: None,
            ingress_token: None,
            discord_api_base: "https://discord.com/api/v10".to_string(),
            resend_api_base: "https://api.resend.com".to_string(),
            http_timeout_secs: 15,
        }
    }
}

impl DaemonConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable source
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("DISCORD_TOKEN") {
            self.discord_token = v;
        }
        if let Some(v) = var("RESEND_API_KEY") {
            self.resend_api_key = v;
        }
        if let Some(v) = var("EMAILS_FILEPATH") {
            self.emails_filepath = PathBuf::from(v);
        }
        if let Some(v) = var("HOST") {
            self.host = v;
        }
        if let Some(v) = var("PORT") {
            self.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = var("MAILGATE_VERIFIED_ROLE") {
            self.verified_role = v;
        }
        if let Some(v) = var("MAILGATE_COMMAND_PREFIX") {
            self.command_prefix = v;
        }
        if let Some(v) = var("MAILGATE_MAIL_FROM") {
            self.mail_from = v;
        }
        if let Some(v) = var("MAILGATE_MAIL_SUBJECT") {
            self.mail_subject = v;
        }
        if let Some(v) = var("MAILGATE_SESSION_TTL_SECS") {
            self.session_ttl_secs = parse_var("MAILGATE_SESSION_TTL_SECS", &v)?;
        }
        if let Some(v) = var("MAILGATE_MAX_CODE_ATTEMPTS") {
            self.max_code_attempts = Some(parse_var("MAILGATE_MAX_CODE_ATTEMPTS", &v)?);
        }
        if let Some(v) = var("MAILGATE_INGRESS_TOKEN") {
            self.ingress_token = Some(v);
        }
        if let Some(v) = var("MAILGATE_DISCORD_API_BASE") {
            self.discord_api_base = v;
        }
        if let Some(v) = var("MAILGATE_RESEND_API_BASE") {
            self.resend_api_base = v;
        }
        if let Some(v) = var("MAILGATE_HTTP_TIMEOUT_SECS") {
            self.http_timeout_secs = parse_var("MAILGATE_HTTP_TIMEOUT_SECS", &v)?;
        }

        Ok(())
    }

    /// Check that everything needed to run is present
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            return Err(DaemonError::Config(
                "DISCORD_TOKEN not found in environment variables".to_string(),
            ));
        }
        if self.resend_api_key.trim().is_empty() {
            return Err(DaemonError::Config(
                "RESEND_API_KEY not found in environment variables".to_string(),
            ));
        }
        if self.command_prefix.is_empty() {
            return Err(DaemonError::Config("command prefix must not be empty".to_string()));
        }
        if self.session_ttl_secs == 0 {
            return Err(DaemonError::Config("session TTL must be positive".to_string()));
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(DaemonError::Config(format!(
                "session TTL must be at most {} seconds",
                MAX_SESSION_TTL_SECS
            )));
        }
        if self.http_timeout_secs == 0 {
            return Err(DaemonError::Config("HTTP timeout must be positive".to_string()));
        }
        if self.max_code_attempts == Some(0) {
            return Err(DaemonError::Config("max code attempts must be positive".to_string()));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Address for the HTTP listener
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid bind address: {}", e)))
    }

    /// Session store settings derived from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ttl: Duration::from_secs(self.session_ttl_secs),
            max_attempts: self.max_code_attempts,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| DaemonError::Config(format!("{}: {}", key, e)))
}

/// Load a `.env` file into the process environment.
///
/// With no path the file is searched for from the working directory upwards.
/// Variables already set are left alone. A missing file is not an error.
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|()| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(DaemonError::Config(format!("failed to read .env file: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::default();
        assert_eq!(config.emails_filepath, PathBuf::from("allowed_emails.txt"));
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:10000");
        assert_eq!(config.verified_role, "verified");
        assert_eq!(config.session_config().ttl, Duration::from_secs(600));
        assert_eq!(config.session_config().max_attempts, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DaemonConfig::default();
        config
            .apply_env_from(env(&[
                ("DISCORD_TOKEN", "token"),
                ("RESEND_API_KEY", "re_key"),
                ("PORT", "8080"),
                ("HOST", "127.0.0.1"),
                ("EMAILS_FILEPATH", "/etc/mailgate/emails.txt"),
                ("MAILGATE_MAX_CODE_ATTEMPTS", "5"),
            ]))
            .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.emails_filepath, PathBuf::from("/etc/mailgate/emails.txt"));
        assert_eq!(config.max_code_attempts, Some(5));
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut config = DaemonConfig::default();
        let err = config.apply_env_from(env(&[("PORT", "not-a-port")])).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let mut config = DaemonConfig::default();
        config
            .apply_env_from(env(&[("RESEND_API_KEY", "re_key"), ("DISCORD_TOKEN", "  ")]))
            .unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
    }

    fn valid() -> DaemonConfig {
        DaemonConfig {
            discord_token: "token".to_string(),
            resend_api_key: "re_key".to_string(),
            ..DaemonConfig::default()
        }
    }

    #[test]
    fn test_session_ttl_bounds() {
        let mut config = valid();
        config.session_ttl_secs = MAX_SESSION_TTL_SECS;
        assert!(config.validate().is_ok());

        config.session_ttl_secs = MAX_SESSION_TTL_SECS + 1;
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));

        config
            .apply_env_from(env(&[("MAILGATE_SESSION_TTL_SECS", "18446744073709551615")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_http_timeout_must_be_positive() {
        let mut config = valid();
        config
            .apply_env_from(env(&[("MAILGATE_HTTP_TIMEOUT_SECS", "30")]))
            .unwrap();
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());

        config
            .apply_env_from(env(&[("MAILGATE_HTTP_TIMEOUT_SECS", "0")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_dotenv_file_populates_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "MAILGATE_DOTENV_TEST_ROLE=from-dotenv\n").unwrap();

        let loaded = load_dotenv(Some(&path)).unwrap();
        assert_eq!(loaded.as_deref(), Some(path.as_path()));

        assert_eq!(
            std::env::var("MAILGATE_DOTENV_TEST_ROLE").as_deref(),
            Ok("from-dotenv")
        );
    }

    #[test]
    fn test_missing_dotenv_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_dotenv(Some(&dir.path().join("absent.env"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailgate.json");
        std::fs::write(&path, r#"{ "port": 9000, "verified_role": "member" }"#).unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.verified_role, "member");
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = DaemonConfig {
            discord_token: "secret-token".to_string(),
            ..DaemonConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret-token"));
    }
}
