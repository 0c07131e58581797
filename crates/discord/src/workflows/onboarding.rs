//! New-member auto role and welcome message. Both steps are best-effort.

use switchdesk_core::domain::decision::{SideEffectReport, SideEffectStatus};
use switchdesk_core::domain::ids::UserId;

use super::{status_of, Workflows};
use crate::embeds::MessageBuilder;

pub const ROLE_GRANT: &str = "auto_role";
pub const WELCOME: &str = "welcome_message";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnboardingReport {
    pub member: UserId,
    pub side_effects: Vec<SideEffectReport>,
}

impl OnboardingReport {
    pub fn welcomed(&self) -> bool {
        self.status_of(WELCOME).is_some_and(SideEffectStatus::is_delivered)
    }

    pub fn status_of(&self, effect: &str) -> Option<&SideEffectStatus> {
        self.side_effects.iter().find(|report| report.effect == effect).map(|report| &report.status)
    }
}

impl Workflows {
    pub async fn welcome_member(&self, member: UserId) -> OnboardingReport {
        let role = self.grant_member_role(member).await;
        let welcome = self.send_welcome(member).await;
        OnboardingReport {
            member,
            side_effects: vec![
                SideEffectReport { effect: ROLE_GRANT, status: role },
                SideEffectReport { effect: WELCOME, status: welcome },
            ],
        }
    }

    async fn grant_member_role(&self, member: UserId) -> SideEffectStatus {
        let guild_id = self.ctx.guild.guild_id;
        let role_id = self.ctx.guild.roles.member;
        match self.ctx.platform.resolve_role(guild_id, role_id).await {
            Ok(Some(role)) => status_of(self.ctx.platform.add_role(guild_id, member, role.id).await),
            Ok(None) => SideEffectStatus::Skipped(format!("auto role {role_id} not found")),
            Err(error) => SideEffectStatus::Failed(error.to_string()),
        }
    }

    async fn send_welcome(&self, member: UserId) -> SideEffectStatus {
        let guild = &self.ctx.guild;
        let channel = match self.ctx.platform.resolve_channel(guild.channels.welcome).await {
            Ok(Some(channel)) => channel,
            Ok(None) => {
                return SideEffectStatus::Skipped(format!(
                    "welcome channel {} not found",
                    guild.channels.welcome
                ))
            }
            Err(error) => return SideEffectStatus::Failed(error.to_string()),
        };
        let count = match self.ctx.platform.member_count(guild.guild_id).await {
            Ok(count) => count,
            Err(error) => {
                return SideEffectStatus::Skipped(format!("member count unavailable: {error}"))
            }
        };

        let emoji = match guild.welcome_emoji_id {
            Some(emoji_id) => match self.ctx.platform.resolve_emoji(guild.guild_id, emoji_id).await {
                Ok(Some(emoji)) => emoji.markup(),
                _ => String::new(),
            },
            None => String::new(),
        };
        let text = format!(
            "{emoji} Welcome {} to {}. You are member {count}",
            member.mention(),
            guild.name
        );
        let message = MessageBuilder::new().content(text.trim_start()).build();
        status_of(self.ctx.platform.send_message(channel.id, &message).await)
    }
}

#[cfg(test)]
mod tests {
    use switchdesk_core::domain::decision::SideEffectStatus;

    use switchdesk_core::domain::ids::GuildId;

    use super::super::testing::{fixture, guild, ALICE};
    use super::{ROLE_GRANT, WELCOME};
    use crate::events::{EventContext, MemberJoinEvent, MembershipService};
    use crate::platform::{Operation, PlatformError};

    #[tokio::test]
    async fn joins_in_other_guilds_are_not_onboarded() {
        let (platform, workflows) = fixture();
        let ctx = EventContext { correlation_id: "GUILD_MEMBER_ADD#1".to_owned() };

        let foreign = MemberJoinEvent { guild_id: GuildId(42), user_id: ALICE };
        workflows.member_joined(&foreign, &ctx).await;
        assert!(platform.calls().is_empty());

        let home = MemberJoinEvent { guild_id: guild().guild_id, user_id: ALICE };
        workflows.member_joined(&home, &ctx).await;
        assert_eq!(platform.sent_to(guild().channels.welcome).len(), 1);
    }

    #[tokio::test]
    async fn new_members_get_the_auto_role_and_a_welcome() {
        let (platform, workflows) = fixture();
        let report = workflows.welcome_member(ALICE).await;

        assert!(report.welcomed());
        assert_eq!(platform.role_grants(), vec![(ALICE, guild().roles.member)]);
        let welcome = platform.sent_to(guild().channels.welcome);
        assert_eq!(
            welcome[0].content.as_deref(),
            Some("<:wave:1342248128270569522> Welcome <@1001> to Switch Customs. You are member 1")
        );
    }

    #[tokio::test]
    async fn missing_emoji_leaves_no_leading_space() {
        let (platform, workflows) = fixture();
        if let Some(emoji_id) = guild().welcome_emoji_id {
            platform.remove_emoji(emoji_id);
        }

        workflows.welcome_member(ALICE).await;
        let welcome = platform.sent_to(guild().channels.welcome);
        assert_eq!(
            welcome[0].content.as_deref(),
            Some("Welcome <@1001> to Switch Customs. You are member 1")
        );
    }

    #[tokio::test]
    async fn role_failure_does_not_block_the_welcome() {
        let (platform, workflows) = fixture();
        platform.fail(Operation::AddRole, PlatformError::Forbidden("manage roles".to_owned()));

        let report = workflows.welcome_member(ALICE).await;
        assert!(matches!(report.status_of(ROLE_GRANT), Some(SideEffectStatus::Failed(_))));
        assert!(report.welcomed());
    }

    #[tokio::test]
    async fn welcome_is_skipped_without_channel_or_member_count() {
        let (platform, workflows) = fixture();
        platform.fail(Operation::MemberCount, PlatformError::Transport("timeout".to_owned()));
        let report = workflows.welcome_member(ALICE).await;
        assert!(matches!(report.status_of(WELCOME), Some(SideEffectStatus::Skipped(_))));

        platform.remove_channel(guild().channels.welcome);
        let report = workflows.welcome_member(ALICE).await;
        assert!(matches!(report.status_of(WELCOME), Some(SideEffectStatus::Skipped(_))));
        assert!(platform.sent_to(guild().channels.welcome).is_empty());
    }
}
