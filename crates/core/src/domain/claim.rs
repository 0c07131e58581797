use serde::{Deserialize, Serialize};

use crate::domain::ids::{ChannelId, GuildId, UserId};
use crate::errors::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub order_id: String,
    pub claimant: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub channel_name: String,
}

impl ClaimRecord {
    pub fn new(
        order_id: &str,
        claimant: UserId,
        guild_id: GuildId,
        channel_id: ChannelId,
        channel_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ValidationError::EmptyField("order_id"));
        }
        Ok(Self {
            order_id: order_id.to_owned(),
            claimant,
            guild_id,
            channel_id,
            channel_name: channel_name.into(),
        })
    }

    pub fn channel_link(&self) -> String {
        format!("https://discord.com/channels/{}/{}", self.guild_id, self.channel_id)
    }
}
