//! Verification code delivery through the Resend email API

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info};

use mailgate_core::{BoundaryError, CodeNotifier, VerificationCode};

/// Request body for `POST /emails`
#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: String,
}

/// Sends codes as transactional emails via Resend
pub struct ResendMailer {
    client: Client,
    api_base: String,
    api_key: String,
    from: String,
    subject: String,
}

impl ResendMailer {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            from: from.into(),
            subject: subject.into(),
        }
    }

    fn body<'a>(&'a self, email: &'a str, code: &VerificationCode) -> SendEmailBody<'a> {
        SendEmailBody {
            from: &self.from,
            to: vec![email],
            subject: &self.subject,
            html: render_code_html(code),
        }
    }
}

/// HTML body carrying the code
pub fn render_code_html(code: &VerificationCode) -> String {
    format!(
        "<p>Your QuantChallenge 2025 Discord verification code is: <strong>{}</strong></p>",
        code
    )
}

#[async_trait]
impl CodeNotifier for ResendMailer {
    async fn send_code(&self, email: &str, code: &VerificationCode) -> Result<(), BoundaryError> {
        let url = format!("{}/emails", self.api_base);
        debug!("Sending verification email via {}", url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(email, code))
            .send()
            .await
            .map_err(|e| BoundaryError::new(format!("Resend request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let reason = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable response body: {e}"));
            return Err(BoundaryError::new(format!("Resend returned {status}: {reason}")));
        }

        info!("Verification email accepted by Resend");
        Ok(())
    }
}
