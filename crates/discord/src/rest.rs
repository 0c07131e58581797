//! Discord REST (API v10) implementation of [`Platform`].
//!
//! Lookups map a 404 to `Ok(None)` so workflows can tell "not configured"
//! apart from "Discord is unhappy". Everything else is classified into a
//! [`PlatformError`] by status code.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use switchdesk_core::config::DiscordConfig;
use switchdesk_core::domain::ids::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};
use tracing::{debug, instrument, warn};

use crate::embeds::MessagePayload;
use crate::platform::{
    MessageRef, Platform, PlatformError, ResolvedChannel, ResolvedEmoji, ResolvedRole,
};

const USER_AGENT: &str = concat!("switchdesk (", env!("CARGO_PKG_VERSION"), ")");

#[derive(Clone)]
pub struct RestPlatform {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl std::fmt::Debug for RestPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestPlatform")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RawChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawRole {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct RawEmoji {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    animated: bool,
}

#[derive(Deserialize)]
struct RawGuildCounts {
    approximate_member_count: Option<u64>,
}

#[derive(Deserialize)]
struct RawMessage {
    id: String,
    channel_id: String,
}

#[derive(Deserialize)]
struct RawRateLimit {
    retry_after: f64,
}

impl RestPlatform {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed (TLS backend init).
    pub fn new(config: &DiscordConfig) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| PlatformError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("Authorization", format!("Bot {}", self.token.expose_secret()))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, PlatformError> {
        let response = request
            .send()
            .await
            .map_err(|error| PlatformError::Transport(error.to_string()))?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = classify(status, &body);
        if matches!(error, PlatformError::RateLimited { .. }) {
            warn!(event_name = "discord.rest.rate_limited", %status, "discord rate limit hit");
        }
        Err(error)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, PlatformError> {
        response.json::<T>().await.map_err(|error| PlatformError::Unexpected {
            status: StatusCode::OK.as_u16(),
            body: error.to_string(),
        })
    }

    async fn lookup<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PlatformError> {
        match self.execute(self.request(Method::GET, path)).await {
            Ok(response) => Self::decode(response).await.map(Some),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn post_message(
        &self,
        channel_id: ChannelId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError> {
        let response = self
            .execute(
                self.request(Method::POST, &format!("channels/{channel_id}/messages"))
                    .json(message),
            )
            .await?;
        let raw: RawMessage = Self::decode(response).await?;
        message_ref(&raw)
    }

    /// Answers an interaction that arrived over the gateway rather than the
    /// signed HTTP endpoint.
    #[instrument(skip_all, fields(interaction_id = %interaction_id))]
    pub async fn interaction_callback(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        body: &Value,
    ) -> Result<(), PlatformError> {
        let path = format!("interactions/{interaction_id}/{interaction_token}/callback");
        self.execute(self.request(Method::POST, &path).json(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl Platform for RestPlatform {
    #[instrument(skip_all, fields(channel_id = %channel_id))]
    async fn resolve_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<ResolvedChannel>, PlatformError> {
        let Some(raw) = self.lookup::<RawChannel>(&format!("channels/{channel_id}")).await? else {
            return Ok(None);
        };
        Ok(Some(ResolvedChannel {
            id: snowflake("channel.id", &raw.id)?,
            name: raw.name.unwrap_or_else(|| channel_id.to_string()),
        }))
    }

    #[instrument(skip_all, fields(guild_id = %guild_id, role_id = %role_id))]
    async fn resolve_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<Option<ResolvedRole>, PlatformError> {
        let Some(roles) = self.lookup::<Vec<RawRole>>(&format!("guilds/{guild_id}/roles")).await?
        else {
            return Ok(None);
        };
        find_role(roles, role_id)
    }

    #[instrument(skip_all, fields(guild_id = %guild_id, emoji_id = %emoji_id))]
    async fn resolve_emoji(
        &self,
        guild_id: GuildId,
        emoji_id: EmojiId,
    ) -> Result<Option<ResolvedEmoji>, PlatformError> {
        let raw = self.lookup::<RawEmoji>(&format!("guilds/{guild_id}/emojis/{emoji_id}")).await?;
        raw.map(|raw| emoji(raw, emoji_id)).transpose()
    }

    async fn member_count(&self, guild_id: GuildId) -> Result<u64, PlatformError> {
        let response = self
            .execute(self.request(Method::GET, &format!("guilds/{guild_id}?with_counts=true")))
            .await?;
        let counts: RawGuildCounts = Self::decode(response).await?;
        counts.approximate_member_count.ok_or_else(|| PlatformError::Unexpected {
            status: StatusCode::OK.as_u16(),
            body: "guild response carried no approximate_member_count".to_string(),
        })
    }

    #[instrument(skip_all, fields(channel_id = %channel_id))]
    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError> {
        let posted = self.post_message(channel_id, message).await?;
        debug!(message_id = %posted.message_id, "message posted");
        Ok(posted)
    }

    #[instrument(
        skip_all,
        fields(channel_id = %target.channel_id, message_id = %target.message_id)
    )]
    async fn edit_message(
        &self,
        target: &MessageRef,
        message: &MessagePayload,
    ) -> Result<(), PlatformError> {
        let path = format!("channels/{}/messages/{}", target.channel_id, target.message_id);
        self.execute(self.request(Method::PATCH, &path).json(message)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %user_id))]
    async fn send_direct_message(
        &self,
        user_id: UserId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError> {
        let response = self
            .execute(
                self.request(Method::POST, "users/@me/channels")
                    .json(&json!({ "recipient_id": user_id.to_string() })),
            )
            .await?;
        let channel: RawChannel = Self::decode(response).await?;
        let channel_id = snowflake("channel.id", &channel.id)?;
        self.post_message(channel_id, message).await
    }

    #[instrument(skip_all, fields(guild_id = %guild_id, user_id = %user_id, role_id = %role_id))]
    async fn add_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError> {
        let path = format!("guilds/{guild_id}/members/{user_id}/roles/{role_id}");
        self.execute(self.request(Method::PUT, &path)).await?;
        Ok(())
    }

    async fn latency(&self) -> Result<Duration, PlatformError> {
        let started = Instant::now();
        self.execute(self.request(Method::GET, "gateway")).await?;
        Ok(started.elapsed())
    }
}

fn classify(status: StatusCode, body: &str) -> PlatformError {
    match status {
        StatusCode::NOT_FOUND => PlatformError::NotFound(truncate(body)),
        StatusCode::FORBIDDEN => PlatformError::Forbidden(truncate(body)),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after_ms = serde_json::from_str::<RawRateLimit>(body)
                .map(|limit| (limit.retry_after.max(0.0) * 1000.0).ceil() as u64)
                .unwrap_or(1000);
            PlatformError::RateLimited { retry_after_ms }
        }
        other => PlatformError::Unexpected { status: other.as_u16(), body: truncate(body) },
    }
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 256;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}…", &body[..index]),
        None => body.to_string(),
    }
}

fn snowflake<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, PlatformError> {
    value.parse::<T>().map_err(|_| PlatformError::Unexpected {
        status: StatusCode::OK.as_u16(),
        body: format!("`{field}` is not a snowflake: {value}"),
    })
}

fn message_ref(raw: &RawMessage) -> Result<MessageRef, PlatformError> {
    Ok(MessageRef {
        channel_id: snowflake::<ChannelId>("message.channel_id", &raw.channel_id)?,
        message_id: snowflake::<MessageId>("message.id", &raw.id)?,
    })
}

fn find_role(roles: Vec<RawRole>, role_id: RoleId) -> Result<Option<ResolvedRole>, PlatformError> {
    for raw in roles {
        let id: RoleId = snowflake("role.id", &raw.id)?;
        if id == role_id {
            return Ok(Some(ResolvedRole { id, name: raw.name }));
        }
    }
    Ok(None)
}

fn emoji(raw: RawEmoji, requested: EmojiId) -> Result<ResolvedEmoji, PlatformError> {
    let id = match raw.id.as_deref() {
        Some(id) => snowflake("emoji.id", id)?,
        None => requested,
    };
    Ok(ResolvedEmoji { id, name: raw.name.unwrap_or_default(), animated: raw.animated })
}
