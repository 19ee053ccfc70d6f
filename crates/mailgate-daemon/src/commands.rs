//! Chat command handling
//!
//! Turns a raw chat message into calls on the verification policy and the
//! replies the user should see. Verification itself only happens in private
//! messages; invoking a command in a shared channel redirects to DMs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use mailgate_core::{ContextId, UserId, VerificationPolicy, VerificationStatus, VerifyError};

use crate::reply::{Embed, Reply, ReplyRoute};

const GREEN: u32 = 0x00ff00;
const BLUE: u32 = 0x0099ff;

/// Entries shown in full by the list command before truncating
const LIST_FULL_LIMIT: usize = 10;
/// Entries kept at each end when truncating
const LIST_EDGE: usize = 5;

/// Posted in the channel by the relay when a DM could not be delivered
pub const DM_UNAVAILABLE: &str =
    "❌ I couldn't send you a DM. Please enable DMs from server members and try again.";

/// A chat message addressed to the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub user_id: UserId,
    /// Community the message was posted in; `None` for a private message
    #[serde(default)]
    pub context_id: Option<ContextId>,
    /// Whether the author has administrator permission in that community
    #[serde(default)]
    pub is_admin: bool,
    pub content: String,
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Verify(Option<String>),
    Code(Option<String>),
    Status,
    Help,
    AddEmail(Option<String>),
    ListEmails,
}

impl Command {
    /// Parse a message. Returns `None` for anything that is not a known
    /// command with the given prefix.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.trim_start().strip_prefix(prefix)?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?;
        let arg = parts.next().map(str::to_string);

        match name {
            "verify" => Some(Command::Verify(arg)),
            "code" => Some(Command::Code(arg)),
            "status" => Some(Command::Status),
            "help_verify" => Some(Command::Help),
            "add_email" => Some(Command::AddEmail(arg)),
            "list_emails" => Some(Command::ListEmails),
            _ => None,
        }
    }
}

/// Routes chat commands to the verification policy
pub struct CommandRouter {
    policy: Arc<VerificationPolicy>,
    prefix: String,
    role_name: String,
}

impl CommandRouter {
    pub fn new(
        policy: Arc<VerificationPolicy>,
        prefix: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            prefix: prefix.into(),
            role_name: role_name.into(),
        }
    }

    /// Handle one message. Unknown commands produce no replies.
    pub async fn handle(&self, request: &CommandRequest) -> Vec<Reply> {
        let Some(command) = Command::parse(&self.prefix, &request.content) else {
            return Vec::new();
        };
        debug!("User {} invoked {:?}", request.user_id, command);

        match command {
            Command::Verify(email) => self.verify(request, email).await,
            Command::Code(code) => self.code(request, code).await,
            Command::Status => self.status(request).await,
            Command::Help => self.help(request),
            Command::AddEmail(email) => self.add_email(request, email),
            Command::ListEmails => self.list_emails(request),
        }
    }

    /// Welcome message for a user who just joined a community
    pub fn welcome(&self) -> Vec<Reply> {
        let p = &self.prefix;
        let embed = Embed::new("Welcome to QuantChallenge 2025! 🎉", GREEN)
            .description(
                "To gain full access to the server, you'll need to verify your email address.",
            )
            .field(
                "📧 How to Verify:",
                format!(
                    "Use the command `{p}verify your@email.com` (replace with your actual email)\n\
                     Make sure to use the same email address you received the QuantChallenge 2025 invitation with!"
                ),
            )
            .field(
                "🔐 Verification Process:",
                format!(
                    "1. Send `{p}verify your@email.com` in DMs with QuantChallengeBot (me!)\n\
                     2. Check your email for a 6-digit verification code\n\
                     3. Send `{p}code 123456` (replace with your actual code) in our DM\n\
                     4. You'll automatically get the {} role!",
                    self.role_name
                ),
            )
            .field(
                "❓ Need Help?",
                format!(
                    "Use `{p}help_verify` for more information or contact an administrator if you're having trouble."
                ),
            )
            .footer("All verification happens privately in DMs for your security!");

        vec![Reply::embed(ReplyRoute::Direct, embed)]
    }

    async fn verify(&self, request: &CommandRequest, email: Option<String>) -> Vec<Reply> {
        let p = &self.prefix;
        if request.context_id.is_some() {
            return vec![
                Reply::direct(format!(
                    "📨 Let's continue the verification process in DMs! Please use `{p}verify your@email.com` here."
                )),
                Reply::current("📨 I've sent you a DM to continue the verification process!"),
            ];
        }

        let Some(email) = email else {
            return vec![Reply::current(format!("Usage: `{p}verify your@email.com`"))];
        };

        match self
            .policy
            .request_verification(request.user_id, &email, None)
            .await
        {
            Ok(_) => vec![Reply::current(format!(
                "📧 Verification code sent to {email}. Use `{p}code <your_code>` to verify."
            ))],
            Err(e) => vec![Reply::current(self.error_message(&e))],
        }
    }

    async fn code(&self, request: &CommandRequest, code: Option<String>) -> Vec<Reply> {
        let p = &self.prefix;
        if request.context_id.is_some() {
            return vec![
                Reply::direct(format!("📨 Please use the `{p}code` command in our DM conversation!")),
                Reply::current("📨 Please check your DMs to enter your verification code!"),
            ];
        }

        let Some(code) = code else {
            return vec![Reply::current(format!("Usage: `{p}code 123456`"))];
        };

        match self.policy.submit_code(request.user_id, &code).await {
            Ok(verified) => {
                let text = match verified.context_name {
                    Some(name) => format!(
                        "✅ Email verified! You now have the {} role in {}.",
                        self.role_name, name
                    ),
                    None => format!("✅ Email verified! You now have the {} role.", self.role_name),
                };
                vec![Reply::current(text)]
            }
            Err(e) => vec![Reply::current(self.error_message(&e))],
        }
    }

    async fn status(&self, request: &CommandRequest) -> Vec<Reply> {
        match request.context_id {
            Some(context_id) => {
                let status = self.policy.status(request.user_id, Some(context_id)).await;
                vec![
                    Reply::direct("📨 Let me check your verification status in DMs!"),
                    Reply::current("📨 I've sent your verification status to your DMs!"),
                    Reply::direct(self.status_message(&status)),
                ]
            }
            None => {
                let status = self.policy.status(request.user_id, None).await;
                vec![Reply::current(self.status_message(&status))]
            }
        }
    }

    fn help(&self, request: &CommandRequest) -> Vec<Reply> {
        let p = &self.prefix;
        let embed = Embed::new("Email Verification Help", GREEN)
            .description(
                "Only specific emails are allowed to verify. All verification happens in DMs for privacy!",
            )
            .field(
                format!("{p}verify <email>"),
                "Start verification with your email (redirects to DMs)",
            )
            .field(
                format!("{p}code <code>"),
                "Enter the 6-digit code from email (DMs only)",
            )
            .field(
                format!("{p}status"),
                "Check your verification status (redirects to DMs)",
            )
            .field(format!("{p}help_verify"), "Show this help message");

        if request.context_id.is_some() {
            vec![
                Reply::embed(ReplyRoute::Direct, embed),
                Reply::current("📨 I've sent the help information to your DMs!"),
            ]
        } else {
            vec![Reply::embed(ReplyRoute::Current, embed)]
        }
    }

    fn add_email(&self, request: &CommandRequest, email: Option<String>) -> Vec<Reply> {
        if !request.is_admin {
            return vec![permission_denied()];
        }
        let Some(email) = email else {
            return vec![Reply::current(format!("Usage: `{}add_email <email>`", self.prefix))];
        };

        if self.policy.add_allowed_email(&email) {
            vec![Reply::current(format!("✅ Added {email} to allowed emails list."))]
        } else {
            vec![Reply::current(format!("❌ {email} is already in the allowed list."))]
        }
    }

    fn list_emails(&self, request: &CommandRequest) -> Vec<Reply> {
        if !request.is_admin {
            return vec![permission_denied()];
        }
        let emails = self.policy.list_allowed_emails();
        let embed = Embed::new(format!("Allowed Emails ({})", emails.len()), BLUE)
            .description(summarize_list(&emails));
        vec![Reply::embed(ReplyRoute::Current, embed)]
    }

    fn status_message(&self, status: &VerificationStatus) -> String {
        match status {
            VerificationStatus::Verified { email: Some(email) } => format!("✅ Verified with: {email}"),
            VerificationStatus::Verified { email: None } => "✅ Verified!".to_string(),
            VerificationStatus::NotVerified => format!(
                "❌ Not verified. Use `{}verify <email>` to start.",
                self.prefix
            ),
        }
    }

    /// User-facing text for a failed verification step
    fn error_message(&self, error: &VerifyError) -> String {
        let p = &self.prefix;
        match error {
            VerifyError::NotInvited => "❌ Please check to see this is the same email address with which you received the QuantChallenge 2025 accepted invite.".to_string(),
            VerifyError::NoSharedContext => "❌ You don't seem to be in any servers with this bot.".to_string(),
            VerifyError::AlreadyVerified => "✅ You are already verified!".to_string(),
            VerifyError::DeliveryFailed => "❌ Failed to send verification email. Please try again.".to_string(),
            VerifyError::NoPendingSession => format!("❌ No pending verification. Use `{p}verify <email>` first."),
            VerifyError::CodeMismatch => "❌ Invalid verification code.".to_string(),
            VerifyError::Expired => format!("❌ Your verification code has expired. Use `{p}verify <email>` to get a new one."),
            VerifyError::RoleGrantFailed => format!(
                "✅ Email verified! (Note: Could not assign the {} role - please contact an administrator)",
                self.role_name
            ),
            VerifyError::AttemptsExhausted => format!("❌ Too many invalid codes. Use `{p}verify <email>` to get a new one."),
        }
    }
}

fn permission_denied() -> Reply {
    Reply::current("❌ You need administrator permissions to use this command.")
}

/// Full list up to the limit, otherwise both ends around an ellipsis
fn summarize_list(emails: &[String]) -> String {
    if emails.len() > LIST_FULL_LIMIT {
        let head = &emails[..LIST_EDGE];
        let tail = &emails[emails.len() - LIST_EDGE..];
        head.iter()
            .map(String::as_str)
            .chain(std::iter::once("..."))
            .chain(tail.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        emails.join("\n")
    }
}
