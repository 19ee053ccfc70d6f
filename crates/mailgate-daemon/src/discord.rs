//! Guild membership and role state via the Discord REST API
//!
//! Only the handful of endpoints the verification flow needs. The verified
//! role is looked up by name on each call so renames and re-creations on the
//! server side are picked up without a restart.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use mailgate_core::{BoundaryError, ContextId, MembershipDirectory, UserId};

/// Largest page `GET /users/@me/guilds` returns
const GUILD_PAGE_LIMIT: usize = 200;

/// Partial guild object from `GET /users/@me/guilds`
#[derive(Debug, Deserialize)]
struct PartialGuild {
    id: String,
}

/// Guild object from `GET /guilds/{id}`; only the name is needed
#[derive(Debug, Deserialize)]
struct Guild {
    name: String,
}

/// Guild member object; only role ids are needed
#[derive(Debug, Deserialize)]
struct GuildMember {
    #[serde(default)]
    roles: Vec<String>,
}

/// Role object from `GET /guilds/{id}/roles`
#[derive(Debug, Deserialize)]
struct Role {
    id: String,
    name: String,
}

/// Discord-backed membership directory
pub struct DiscordDirectory {
    client: Client,
    api_base: String,
    token: String,
    role_name: String,
}

impl DiscordDirectory {
    pub fn new(
        client: Client,
        api_base: impl Into<String>,
        token: impl Into<String>,
        role_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            role_name: role_name.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// GET a JSON resource; `Ok(None)` on 404
    async fn get<T>(&self, path: &str) -> Result<Option<T>, BoundaryError>
    where
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .get(self.url(path))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(|e| BoundaryError::new(format!("Discord request failed: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => resp
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| BoundaryError::new(format!("Discord response decode failed: {e}"))),
            status => Err(BoundaryError::new(format!("Discord GET {path} returned {status}"))),
        }
    }

    async fn member(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<Option<GuildMember>, BoundaryError> {
        self.get(&format!("/guilds/{}/members/{}", context_id, user_id))
            .await
    }

    /// Every guild the bot is in, following the `after` cursor page by page
    async fn bot_guilds(&self) -> Result<Vec<PartialGuild>, BoundaryError> {
        let mut guilds = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let page: Vec<PartialGuild> = self
                .get(&guilds_page_path(after.as_deref()))
                .await?
                .unwrap_or_default();
            let full = page.len() >= GUILD_PAGE_LIMIT;
            after = page.last().map(|guild| guild.id.clone());
            guilds.extend(page);

            if !full || after.is_none() {
                return Ok(guilds);
            }
        }
    }

    /// Id of the verified role in a guild, if the guild has one
    async fn verified_role_id(&self, context_id: ContextId) -> Result<Option<String>, BoundaryError> {
        let roles: Vec<Role> = self
            .get(&format!("/guilds/{}/roles", context_id))
            .await?
            .unwrap_or_default();

        Ok(find_role(&roles, &self.role_name).map(|role| role.id.clone()))
    }
}

fn guilds_page_path(after: Option<&str>) -> String {
    match after {
        Some(after) => format!("/users/@me/guilds?limit={}&after={}", GUILD_PAGE_LIMIT, after),
        None => format!("/users/@me/guilds?limit={}", GUILD_PAGE_LIMIT),
    }
}

fn find_role<'a>(roles: &'a [Role], name: &str) -> Option<&'a Role> {
    roles.iter().find(|role| role.name == name)
}

#[async_trait]
impl MembershipDirectory for DiscordDirectory {
    async fn is_member(&self, user_id: UserId, context_id: ContextId) -> Result<bool, BoundaryError> {
        Ok(self.member(user_id, context_id).await?.is_some())
    }

    async fn has_verified_role(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<bool, BoundaryError> {
        let Some(role_id) = self.verified_role_id(context_id).await? else {
            return Ok(false);
        };
        let Some(member) = self.member(user_id, context_id).await? else {
            return Ok(false);
        };
        Ok(member.roles.contains(&role_id))
    }

    async fn grant_verified_role(
        &self,
        user_id: UserId,
        context_id: ContextId,
    ) -> Result<(), BoundaryError> {
        let role_id = self.verified_role_id(context_id).await?.ok_or_else(|| {
            BoundaryError::new(format!(
                "role '{}' not found in guild {}",
                self.role_name, context_id
            ))
        })?;

        let path = format!("/guilds/{}/members/{}/roles/{}", context_id, user_id, role_id);
        let resp = self
            .client
            .put(self.url(&path))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .header("X-Audit-Log-Reason", "Email verification")
            .send()
            .await
            .map_err(|e| BoundaryError::new(format!("Discord request failed: {e}")))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BoundaryError::new(format!(
                "member {} not found in guild {}",
                user_id, context_id
            )));
        }
        if !status.is_success() {
            return Err(BoundaryError::new(format!("Discord PUT {path} returned {status}")));
        }

        debug!("Granted role {} to user {} in guild {}", role_id, user_id, context_id);
        Ok(())
    }

    async fn list_shared_contexts(&self, user_id: UserId) -> Result<Vec<ContextId>, BoundaryError> {
        let guilds = self.bot_guilds().await?;

        let mut shared = Vec::new();
        for guild in guilds {
            let context_id: ContextId = match guild.id.parse() {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping guild with malformed id {:?}: {}", guild.id, e);
                    continue;
                }
            };
            if self.is_member(user_id, context_id).await? {
                shared.push(context_id);
            }
        }

        Ok(shared)
    }

    async fn context_name(&self, context_id: ContextId) -> Result<Option<String>, BoundaryError> {
        let guild: Option<Guild> = self.get(&format!("/guilds/{}", context_id)).await?;
        Ok(guild.map(|g| g.name))
    }
}
