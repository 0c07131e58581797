use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use switchdesk_core::config::GuildConfig;
use switchdesk_core::domain::ids::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};
use switchdesk_core::errors::WorkflowError;
use thiserror::Error;

use crate::embeds::MessagePayload;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("missing permission: {0}")]
    Forbidden(String),
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected response {status}: {body}")]
    Unexpected { status: u16, body: String },
}

impl From<PlatformError> for WorkflowError {
    fn from(error: PlatformError) -> Self {
        WorkflowError::Platform(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub id: ChannelId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedRole {
    pub id: RoleId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEmoji {
    pub id: EmojiId,
    pub name: String,
    pub animated: bool,
}

impl ResolvedEmoji {
    /// Inline markup for a custom guild emoji.
    pub fn markup(&self) -> String {
        let prefix = if self.animated { "a" } else { "" };
        format!("<{prefix}:{}:{}>", self.name, self.id)
    }
}

/// Location of a posted message, kept so the message can be edited later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}

/// Every chat-platform capability the workflows consume. Lookups return
/// `Ok(None)` when the identifier does not resolve.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn resolve_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<ResolvedChannel>, PlatformError>;

    async fn resolve_role(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<Option<ResolvedRole>, PlatformError>;

    async fn resolve_emoji(
        &self,
        guild_id: GuildId,
        emoji_id: EmojiId,
    ) -> Result<Option<ResolvedEmoji>, PlatformError>;

    async fn member_count(&self, guild_id: GuildId) -> Result<u64, PlatformError>;

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError>;

    async fn edit_message(
        &self,
        target: &MessageRef,
        message: &MessagePayload,
    ) -> Result<(), PlatformError>;

    async fn send_direct_message(
        &self,
        user_id: UserId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError>;

    async fn add_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError>;

    async fn latency(&self) -> Result<Duration, PlatformError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ResolveChannel,
    ResolveRole,
    ResolveEmoji,
    MemberCount,
    SendMessage,
    EditMessage,
    DirectMessage,
    AddRole,
    Latency,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformCall {
    SendMessage { target: MessageRef, message: MessagePayload },
    EditMessage { target: MessageRef, message: MessagePayload },
    DirectMessage { user_id: UserId, message: MessagePayload },
    AddRole { guild_id: GuildId, user_id: UserId, role_id: RoleId },
}

#[derive(Default)]
struct InMemoryState {
    channels: HashMap<ChannelId, String>,
    roles: HashMap<RoleId, String>,
    emojis: HashMap<EmojiId, String>,
    member_count: Option<u64>,
    latency: Duration,
    failures: HashMap<Operation, PlatformError>,
    failing_channels: HashMap<ChannelId, PlatformError>,
    closed_direct_messages: HashSet<UserId>,
    messages: HashMap<MessageRef, MessagePayload>,
    calls: Vec<PlatformCall>,
    next_message_id: u64,
}

/// Recording fake for tests. Every mutating call is appended to an in-order
/// log.
#[derive(Default)]
pub struct InMemoryPlatform {
    state: Mutex<InMemoryState>,
}

impl InMemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every channel, role and emoji the guild configuration names.
    pub fn for_guild(guild: &GuildConfig) -> Self {
        let channels = &guild.channels;
        let roles = &guild.roles;
        let mut platform = Self::new()
            .with_channel(channels.quality_control, "quality-control")
            .with_channel(channels.quality_control_results, "qc-results")
            .with_channel(channels.loa_approval, "loa-approval")
            .with_channel(channels.reviews, "reviews")
            .with_channel(channels.order_log, "order-log")
            .with_channel(channels.welcome, "welcome")
            .with_role(roles.designer, "Designer")
            .with_role(roles.qc_reviewer, "QC Reviewer")
            .with_role(roles.loa_approver, "LOA Approver")
            .with_role(roles.loa, "LOA")
            .with_role(roles.member, "Member")
            .with_member_count(1);
        if let Some(emoji_id) = guild.welcome_emoji_id {
            platform = platform.with_emoji(emoji_id, "wave");
        }
        platform
    }

    pub fn with_channel(self, channel_id: ChannelId, name: &str) -> Self {
        self.add_channel(channel_id, name);
        self
    }

    pub fn add_channel(&self, channel_id: ChannelId, name: &str) {
        self.lock().channels.insert(channel_id, name.to_owned());
    }

    pub fn with_role(self, role_id: RoleId, name: &str) -> Self {
        self.lock().roles.insert(role_id, name.to_owned());
        self
    }

    pub fn with_emoji(self, emoji_id: EmojiId, name: &str) -> Self {
        self.lock().emojis.insert(emoji_id, name.to_owned());
        self
    }

    pub fn with_member_count(self, count: u64) -> Self {
        self.lock().member_count = Some(count);
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    pub fn remove_channel(&self, channel_id: ChannelId) {
        self.lock().channels.remove(&channel_id);
    }

    pub fn remove_emoji(&self, emoji_id: EmojiId) {
        self.lock().emojis.remove(&emoji_id);
    }

    /// Makes every later call of `operation` fail with `error`.
    pub fn fail(&self, operation: Operation, error: PlatformError) {
        self.lock().failures.insert(operation, error);
    }

    /// Makes sends to one channel fail while other channels keep working.
    pub fn fail_channel(&self, channel_id: ChannelId, error: PlatformError) {
        self.lock().failing_channels.insert(channel_id, error);
    }

    pub fn close_direct_messages(&self, user_id: UserId) {
        self.lock().closed_direct_messages.insert(user_id);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<MessagePayload> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::SendMessage { target, message } if target.channel_id == channel_id => {
                    Some(message.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn direct_messages(&self, user_id: UserId) -> Vec<MessagePayload> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::DirectMessage { user_id: recipient, message }
                    if *recipient == user_id =>
                {
                    Some(message.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn edit_count(&self, target: &MessageRef) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, PlatformCall::EditMessage { target: edited, .. } if edited == target))
            .count()
    }

    pub fn role_grants(&self) -> Vec<(UserId, RoleId)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PlatformCall::AddRole { user_id, role_id, .. } => Some((*user_id, *role_id)),
                _ => None,
            })
            .collect()
    }

    /// Current content of a posted message, edits applied.
    pub fn message(&self, target: &MessageRef) -> Option<MessagePayload> {
        self.lock().messages.get(target).cloned()
    }

    /// Reference of the most recent message posted to `channel_id`.
    pub fn last_message_in(&self, channel_id: ChannelId) -> Option<MessageRef> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            PlatformCall::SendMessage { target, .. } if target.channel_id == channel_id => {
                Some(*target)
            }
            _ => None,
        })
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check(&self, operation: Operation) -> Result<(), PlatformError> {
        match self.lock().failures.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Platform for InMemoryPlatform {
    async fn resolve_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<ResolvedChannel>, PlatformError> {
        self.check(Operation::ResolveChannel)?;
        Ok(self
            .lock()
            .channels
            .get(&channel_id)
            .map(|name| ResolvedChannel { id: channel_id, name: name.clone() }))
    }

    async fn resolve_role(
        &self,
        _guild_id: GuildId,
        role_id: RoleId,
    ) -> Result<Option<ResolvedRole>, PlatformError> {
        self.check(Operation::ResolveRole)?;
        Ok(self
            .lock()
            .roles
            .get(&role_id)
            .map(|name| ResolvedRole { id: role_id, name: name.clone() }))
    }

    async fn resolve_emoji(
        &self,
        _guild_id: GuildId,
        emoji_id: EmojiId,
    ) -> Result<Option<ResolvedEmoji>, PlatformError> {
        self.check(Operation::ResolveEmoji)?;
        Ok(self.lock().emojis.get(&emoji_id).map(|name| ResolvedEmoji {
            id: emoji_id,
            name: name.clone(),
            animated: false,
        }))
    }

    async fn member_count(&self, guild_id: GuildId) -> Result<u64, PlatformError> {
        self.check(Operation::MemberCount)?;
        self.lock()
            .member_count
            .ok_or_else(|| PlatformError::NotFound(format!("member count for guild {guild_id}")))
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError> {
        self.check(Operation::SendMessage)?;
        let mut state = self.lock();
        if let Some(error) = state.failing_channels.get(&channel_id) {
            return Err(error.clone());
        }
        if !state.channels.contains_key(&channel_id) {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }

        state.next_message_id += 1;
        let target = MessageRef { channel_id, message_id: MessageId(state.next_message_id) };
        state.messages.insert(target, message.clone());
        state.calls.push(PlatformCall::SendMessage { target, message: message.clone() });
        Ok(target)
    }

    async fn edit_message(
        &self,
        target: &MessageRef,
        message: &MessagePayload,
    ) -> Result<(), PlatformError> {
        self.check(Operation::EditMessage)?;
        let mut state = self.lock();
        let Some(stored) = state.messages.get_mut(target) else {
            return Err(PlatformError::NotFound(format!("message {}", target.message_id)));
        };
        *stored = message.clone();
        state.calls.push(PlatformCall::EditMessage { target: *target, message: message.clone() });
        Ok(())
    }

    async fn send_direct_message(
        &self,
        user_id: UserId,
        message: &MessagePayload,
    ) -> Result<MessageRef, PlatformError> {
        self.check(Operation::DirectMessage)?;
        let mut state = self.lock();
        if state.closed_direct_messages.contains(&user_id) {
            return Err(PlatformError::Forbidden(format!("direct messages closed for {user_id}")));
        }

        state.next_message_id += 1;
        let target = MessageRef {
            channel_id: ChannelId(user_id.get()),
            message_id: MessageId(state.next_message_id),
        };
        state.messages.insert(target, message.clone());
        state.calls.push(PlatformCall::DirectMessage { user_id, message: message.clone() });
        Ok(target)
    }

    async fn add_role(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        role_id: RoleId,
    ) -> Result<(), PlatformError> {
        self.check(Operation::AddRole)?;
        let mut state = self.lock();
        if !state.roles.contains_key(&role_id) {
            return Err(PlatformError::NotFound(format!("role {role_id}")));
        }
        state.calls.push(PlatformCall::AddRole { guild_id, user_id, role_id });
        Ok(())
    }

    async fn latency(&self) -> Result<Duration, PlatformError> {
        self.check(Operation::Latency)?;
        Ok(self.lock().latency)
    }
}
