use switchdesk_core::domain::claim::ClaimRecord;
use switchdesk_core::domain::decision::SideEffectReport;
use switchdesk_core::errors::{GatedAction, Resource, WorkflowError};
use switchdesk_core::gate::require_role;
use tracing::info;

use super::{log_side_effects, status_of, Workflows};
use crate::commands::CommandInvocation;
use crate::embeds::{colors, MessageBuilder, MessagePayload};

impl Workflows {
    /// Answers publicly in the invoking channel and mirrors the claim into the
    /// order log. The log line is best-effort.
    pub async fn claim_order(
        &self,
        invocation: &CommandInvocation,
        order_id: &str,
    ) -> Result<MessagePayload, WorkflowError> {
        let member = &invocation.member;
        require_role(member, self.ctx.guild.roles.designer, GatedAction::ClaimOrder)?;
        let log_channel = self
            .ctx
            .require_channel(self.ctx.guild.channels.order_log, Resource::OrderLogChannel)
            .await?;

        let channel_name = match self.ctx.platform.resolve_channel(invocation.channel_id).await {
            Ok(Some(channel)) => channel.name,
            _ => invocation.channel_id.to_string(),
        };
        let claim = ClaimRecord::new(
            order_id,
            member.user_id,
            invocation.guild_id.unwrap_or(self.ctx.guild.guild_id),
            invocation.channel_id,
            channel_name,
        )?;

        let log_line = MessageBuilder::new()
            .content(format!(
                "📢 **Order Claimed**: {} claimed **Order {}** in [#{}]({}).",
                claim.claimant.mention(),
                claim.order_id,
                claim.channel_name,
                claim.channel_link()
            ))
            .build();
        let logged = SideEffectReport {
            effect: "order_log",
            status: status_of(self.ctx.platform.send_message(log_channel.id, &log_line).await),
        };
        log_side_effects(&invocation.interaction_id, std::slice::from_ref(&logged));
        info!(
            event_name = "workflow.claim.recorded",
            correlation_id = %invocation.interaction_id,
            user_id = %member.user_id,
            order_id = %claim.order_id,
            "order claimed"
        );

        Ok(MessageBuilder::new()
            .embed("✅ Order Claimed", colors::GREEN, |embed| {
                embed
                    .field("Order ID", claim.order_id.as_str())
                    .field("Claimed By", claim.claimant.mention())
                    .field("Channel", format!("#{}", claim.channel_name))
                    .footer("Order has been claimed successfully.");
            })
            .build())
    }
}

#[cfg(test)]
mod tests {
    use switchdesk_core::domain::ids::{ChannelId, Member};
    use switchdesk_core::errors::{Resource, WorkflowError};

    use super::super::testing::{designer, fixture, guild, invocation, plain_member, BOB};
    use crate::commands::{CommandInvocation, OptionValue};
    use crate::platform::PlatformError;

    fn claim_invocation(member: Member) -> CommandInvocation {
        invocation("claim", member, &[("order_id", OptionValue::Text("ORD-7".to_owned()))])
    }

    #[tokio::test]
    async fn claim_responds_publicly_and_logs_a_deep_link() {
        let (platform, workflows) = fixture();
        platform.add_channel(ChannelId(5555), "order-7");

        let message = workflows
            .claim_order(&claim_invocation(designer(BOB)), "ORD-7")
            .await
            .expect("designer may claim");

        assert!(!message.is_ephemeral());
        let card = &message.embeds[0];
        assert_eq!(card.title, "✅ Order Claimed");
        assert_eq!(card.field_value("Order ID"), Some("ORD-7"));
        assert_eq!(card.field_value("Claimed By"), Some("<@1002>"));
        assert_eq!(card.field_value("Channel"), Some("#order-7"));
        assert_eq!(card.footer_text(), Some("Order has been claimed successfully."));

        let log = platform.sent_to(guild().channels.order_log);
        assert_eq!(
            log[0].content.as_deref(),
            Some(
                "📢 **Order Claimed**: <@1002> claimed **Order ORD-7** in \
                 [#order-7](https://discord.com/channels/1342198087933755555/5555)."
            )
        );
    }

    #[tokio::test]
    async fn claim_requires_the_designer_role() {
        let (platform, workflows) = fixture();
        let error = workflows
            .claim_order(&claim_invocation(plain_member(BOB)), "ORD-7")
            .await
            .expect_err("role required");

        assert_eq!(error.user_message(), "❌ You must be a **Designer** to claim an order.");
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_order_log_aborts_the_claim() {
        let (platform, workflows) = fixture();
        platform.remove_channel(guild().channels.order_log);

        let error = workflows
            .claim_order(&claim_invocation(designer(BOB)), "ORD-7")
            .await
            .expect_err("log channel missing");
        assert_eq!(error, WorkflowError::ResourceUnresolvable(Resource::OrderLogChannel));
        assert_eq!(error.user_message(), "⚠️ Order log channel not found.");
    }

    #[tokio::test]
    async fn failed_log_post_still_answers_the_claimant() {
        let (platform, workflows) = fixture();
        platform.fail_channel(
            guild().channels.order_log,
            PlatformError::Forbidden("send messages".to_owned()),
        );

        let message = workflows
            .claim_order(&claim_invocation(designer(BOB)), "ORD-7")
            .await
            .expect("claim still answered");
        assert_eq!(message.embeds[0].field_value("Channel"), Some("#5555"));
    }
}
