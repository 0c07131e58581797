//! Leave of absence requests and their approval.

use switchdesk_core::domain::decision::{
    check_reason_length, DecisionOutcome, SideEffectStatus, TransitionReport,
};
use switchdesk_core::domain::ids::Member;
use switchdesk_core::domain::leave::LeaveRequest;
use switchdesk_core::errors::{GatedAction, Resource, ValidationError, WorkflowError};
use switchdesk_core::gate::require_role;
use tracing::info;

use super::custom_id;
use super::quality_control::denial_form;
use super::{log_side_effects, status_of, DecisionRecord, Registry, Workflows};
use crate::embeds::{
    colors, embed, timestamp, Button, ButtonStyle, EmbedBuilder, MessageBuilder, MessagePayload,
    Modal,
};

pub const SUBMITTED_NOTICE: &str = "✅ Your LOA request has been submitted for approval.";
pub const APPROVED_NOTICE: &str = "✅ LOA request approved.";
pub const DENIED_NOTICE: &str = "✅ LOA request denied.";

impl Workflows {
    pub async fn request_leave(
        &self,
        member: &Member,
        duration: &str,
        reason: &str,
        correlation_id: &str,
    ) -> Result<(), WorkflowError> {
        let request = LeaveRequest::new(member.user_id, duration, reason, self.ctx.now())?;
        let channel = self
            .ctx
            .require_channel(self.ctx.guild.channels.loa_approval, Resource::LeaveApprovalChannel)
            .await?;

        let token = Registry::<()>::new_token();
        let card = embed("📝 LOA Request", colors::ORANGE, |embed| {
            embed
                .inline_field("Requester", request.requester.mention())
                .inline_field(
                    "Duration",
                    format!("{} (Until {})", request.duration, timestamp(request.ends_at)),
                )
                .field("Reason", request.reason.as_str())
                .inline_field("Requested On", timestamp(request.requested_at));
        });
        let message = MessageBuilder::new()
            .push_embed(card.clone())
            .action_row(|row| {
                row.button(Button::new(
                    custom_id::encode(custom_id::LOA_APPROVE, &token),
                    "Approve",
                    ButtonStyle::Success,
                ))
                .button(Button::new(
                    custom_id::encode(custom_id::LOA_DENY, &token),
                    "Deny",
                    ButtonStyle::Danger,
                ));
            })
            .build();

        let posted = self.ctx.platform.send_message(channel.id, &message).await?;
        info!(
            event_name = "workflow.leave.requested",
            correlation_id,
            user_id = %member.user_id,
            duration = %request.duration,
            "leave request posted for approval"
        );
        self.leave_requests.insert(token, DecisionRecord::new(request, card, posted));
        Ok(())
    }

    /// Marks the request approved, then grants the leave role and DMs the
    /// requester. The role grant and the DM are independent of each other.
    pub async fn approve_leave(
        &self,
        member: &Member,
        token: &str,
        correlation_id: &str,
    ) -> Result<TransitionReport, WorkflowError> {
        require_role(member, self.ctx.guild.roles.loa_approver, GatedAction::ApproveLeave)?;
        let record = self.open_record(&self.leave_requests, token)?;

        let mut report = self
            .finalize(&self.leave_requests, token, &record, DecisionOutcome::Approved)
            .await?;
        let request = &record.subject;

        let status = self.grant_leave_role(request).await;
        report.record("role_grant", status);

        let notice = self.leave_notice("✅ LOA Approved", colors::GREEN, |embed| {
            embed
                .field(
                    "Your LOA has been approved!",
                    format!(
                        "Your leave of absence until {} has been approved.",
                        timestamp(request.ends_at)
                    ),
                )
                .footer("Enjoy your time off!");
        });
        let status =
            status_of(self.ctx.platform.send_direct_message(request.requester, &notice).await);
        report.record("direct_message", status);

        self.finish_leave(correlation_id, member, &report);
        Ok(report)
    }

    pub fn request_leave_denial(&self, member: &Member, token: &str) -> Result<Modal, WorkflowError> {
        require_role(member, self.ctx.guild.roles.loa_approver, GatedAction::DenyLeave)?;
        let record = self.open_record(&self.leave_requests, token)?;
        record.cell.ensure_pending().map_err(WorkflowError::AlreadyDecided)?;

        Ok(denial_form(custom_id::LOA_DENY_REASON, token, "Deny LOA Request"))
    }

    pub async fn deny_leave(
        &self,
        member: &Member,
        token: &str,
        reason: &str,
        correlation_id: &str,
    ) -> Result<TransitionReport, WorkflowError> {
        require_role(member, self.ctx.guild.roles.loa_approver, GatedAction::DenyLeave)?;
        if reason.trim().is_empty() {
            return Err(ValidationError::EmptyField("reason").into());
        }
        check_reason_length(reason)?;
        let record = self.open_record(&self.leave_requests, token)?;

        let outcome = DecisionOutcome::Denied { reason: reason.to_owned() };
        let mut report = self.finalize(&self.leave_requests, token, &record, outcome).await?;

        let notice = self.leave_notice("❌ LOA Denied", colors::RED, |embed| {
            embed
                .field("Your LOA request has been denied.", format!("**Reason:** {reason}"))
                .footer("Contact management for further details.");
        });
        let status = status_of(
            self.ctx.platform.send_direct_message(record.subject.requester, &notice).await,
        );
        report.record("direct_message", status);

        self.finish_leave(correlation_id, member, &report);
        Ok(report)
    }

    async fn grant_leave_role(&self, request: &LeaveRequest) -> SideEffectStatus {
        let guild_id = self.ctx.guild.guild_id;
        let role_id = self.ctx.guild.roles.loa;
        match self.ctx.platform.resolve_role(guild_id, role_id).await {
            Ok(Some(role)) => status_of(
                self.ctx.platform.add_role(guild_id, request.requester, role.id).await,
            ),
            Ok(None) => SideEffectStatus::Skipped(format!("leave role {role_id} not found")),
            Err(error) => SideEffectStatus::Failed(error.to_string()),
        }
    }

    fn leave_notice<F>(&self, title: &str, color: u32, build: F) -> MessagePayload
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        let icon = self.ctx.guild.server_icon_url.as_deref();
        MessageBuilder::new()
            .embed(title, color, |embed| {
                if let Some(icon) = icon {
                    embed.thumbnail(icon);
                }
                build(embed);
            })
            .build()
    }

    fn finish_leave(&self, correlation_id: &str, member: &Member, report: &TransitionReport) {
        log_side_effects(correlation_id, &report.side_effects);
        info!(
            event_name = "workflow.leave.decided",
            correlation_id,
            user_id = %member.user_id,
            decision = ?report.outcome.kind(),
            "leave decision recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use switchdesk_core::domain::decision::{DecisionKind, SideEffectStatus, REASON_MAX_CHARS};
    use switchdesk_core::errors::{Resource, ValidationError, WorkflowError};

    use super::super::testing::{designer, fixture, guild, now, plain_member, ALICE, REVIEWER};
    use super::super::Workflows;
    use crate::embeds::{timestamp, Component};
    use crate::platform::{InMemoryPlatform, MessageRef, Operation, PlatformError};

    async fn requested(workflows: &Workflows, platform: &InMemoryPlatform) -> (String, MessageRef) {
        workflows
            .request_leave(&plain_member(ALICE), "5d", "Vacation", "t")
            .await
            .expect("leave request posts");
        let posted = platform.last_message_in(guild().channels.loa_approval).expect("posted");
        let message = platform.message(&posted).expect("stored message");
        let (_, token) = super::custom_id::parse_component(message.custom_ids()[0])
            .expect("approve id should parse");
        (token.to_owned(), posted)
    }

    #[tokio::test]
    async fn request_posts_embed_with_computed_end_date() {
        let (platform, workflows) = fixture();
        let (_, posted) = requested(&workflows, &platform).await;

        let message = platform.message(&posted).expect("stored message");
        let card = &message.embeds[0];
        assert_eq!(card.title, "📝 LOA Request");
        assert_eq!(card.field_value("Requester"), Some("<@1001>"));
        assert_eq!(card.field_value("Reason"), Some("Vacation"));
        let until = timestamp(now() + Duration::days(5));
        assert_eq!(card.field_value("Duration"), Some(format!("5d (Until {until})").as_str()));
        assert_eq!(card.field_value("Requested On"), Some(timestamp(now()).as_str()));
    }

    #[tokio::test]
    async fn malformed_duration_is_rejected_before_posting() {
        let (platform, workflows) = fixture();
        let error = workflows
            .request_leave(&plain_member(ALICE), "5w", "Vacation", "t")
            .await
            .expect_err("weeks are not a unit");

        assert!(matches!(
            error,
            WorkflowError::ValidationFailed(ValidationError::MalformedDuration(_))
        ));
        assert!(error.user_message().starts_with("❌ Invalid format!"));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_approval_channel_is_reported() {
        let (platform, workflows) = fixture();
        platform.remove_channel(guild().channels.loa_approval);
        let error = workflows
            .request_leave(&plain_member(ALICE), "5d", "Vacation", "t")
            .await
            .expect_err("channel missing");
        assert_eq!(error, WorkflowError::ResourceUnresolvable(Resource::LeaveApprovalChannel));
        assert_eq!(error.user_message(), "❌ Failed to find the approval channel.");
    }

    #[tokio::test]
    async fn approval_grants_role_and_direct_messages_requester() {
        let (platform, workflows) = fixture();
        let (token, posted) = requested(&workflows, &platform).await;

        let report = workflows
            .approve_leave(&designer(REVIEWER), &token, "t")
            .await
            .expect("approval succeeds");
        assert!(report.side_effects.iter().all(|effect| effect.status.is_delivered()));

        assert_eq!(platform.role_grants(), vec![(ALICE, guild().roles.loa)]);
        let direct = platform.direct_messages(ALICE);
        let dm = &direct[0].embeds[0];
        assert_eq!(dm.title, "✅ LOA Approved");
        assert_eq!(dm.footer_text(), Some("Enjoy your time off!"));
        assert_eq!(
            dm.thumbnail.as_ref().map(|thumbnail| thumbnail.url.as_str()),
            Some("https://cdn.example/icon.png")
        );
        let until = timestamp(now() + Duration::days(5));
        assert_eq!(
            dm.field_value("Your LOA has been approved!"),
            Some(format!("Your leave of absence until {until} has been approved.").as_str())
        );

        let edited = platform.message(&posted).expect("edited");
        assert_eq!(edited.embeds[0].footer_text(), Some("✅ Approved"));
        assert!(edited.components.is_empty());
    }

    #[tokio::test]
    async fn failed_role_grant_still_edits_and_direct_messages() {
        let (platform, workflows) = fixture();
        let (token, posted) = requested(&workflows, &platform).await;
        platform.fail(Operation::AddRole, PlatformError::Forbidden("manage roles".to_owned()));

        let report = workflows
            .approve_leave(&designer(REVIEWER), &token, "t")
            .await
            .expect("approval still recorded");

        assert!(matches!(report.status_of("role_grant"), Some(SideEffectStatus::Failed(_))));
        assert_eq!(report.status_of("direct_message"), Some(&SideEffectStatus::Delivered));
        assert_eq!(platform.edit_count(&posted), 1);
        assert_eq!(platform.direct_messages(ALICE).len(), 1);
    }

    #[tokio::test]
    async fn closed_direct_messages_are_reported_as_failed() {
        let (platform, workflows) = fixture();
        let (token, _) = requested(&workflows, &platform).await;
        platform.close_direct_messages(ALICE);

        let report = workflows
            .approve_leave(&designer(REVIEWER), &token, "t")
            .await
            .expect("approval still recorded");
        assert!(matches!(report.status_of("direct_message"), Some(SideEffectStatus::Failed(_))));
        assert_eq!(report.status_of("role_grant"), Some(&SideEffectStatus::Delivered));
    }

    #[tokio::test]
    async fn denial_edits_footer_and_direct_messages_reason() {
        let (platform, workflows) = fixture();
        let (token, posted) = requested(&workflows, &platform).await;

        let form = workflows
            .request_leave_denial(&designer(REVIEWER), &token)
            .expect("pending request opens the denial form");
        assert_eq!(form.title, "Deny LOA Request");

        workflows
            .deny_leave(&designer(REVIEWER), &token, "Busy season", "t")
            .await
            .expect("denial succeeds");

        let edited = platform.message(&posted).expect("edited");
        assert_eq!(edited.embeds[0].footer_text(), Some("❌ Denied - Reason: Busy season"));
        let direct = platform.direct_messages(ALICE);
        let dm = &direct[0].embeds[0];
        assert_eq!(dm.title, "❌ LOA Denied");
        assert_eq!(dm.field_value("Your LOA request has been denied."), Some("**Reason:** Busy season"));
        assert_eq!(dm.footer_text(), Some("Contact management for further details."));
        assert!(platform.role_grants().is_empty());
    }

    #[tokio::test]
    async fn denial_reason_is_kept_verbatim_in_footer_and_direct_message() {
        let (platform, workflows) = fixture();
        let (token, posted) = requested(&workflows, &platform).await;
        let reason = "  Colors clash\n\n- fix palette  ";

        let form = workflows
            .request_leave_denial(&designer(REVIEWER), &token)
            .expect("pending request opens the denial form");
        let Component::TextInput(input) = &form.components[0].components[0] else {
            panic!("expected a text input");
        };
        assert_eq!(input.max_length, Some(REASON_MAX_CHARS));

        workflows
            .deny_leave(&designer(REVIEWER), &token, reason, "t")
            .await
            .expect("denial succeeds");

        let edited = platform.message(&posted).expect("edited");
        assert_eq!(
            edited.embeds[0].footer_text(),
            Some("❌ Denied - Reason:   Colors clash\n\n- fix palette  ")
        );
        let direct = platform.direct_messages(ALICE);
        assert_eq!(
            direct[0].embeds[0].field_value("Your LOA request has been denied."),
            Some("**Reason:**   Colors clash\n\n- fix palette  ")
        );
    }

    #[tokio::test]
    async fn overlong_leave_reason_is_rejected_before_posting() {
        let (platform, workflows) = fixture();
        let error = workflows
            .request_leave(&plain_member(ALICE), "5d", &"x".repeat(REASON_MAX_CHARS + 1), "t")
            .await
            .expect_err("reason longer than an embed field allows");

        assert!(matches!(
            error,
            WorkflowError::ValidationFailed(ValidationError::TooLong { field: "reason", .. })
        ));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn decided_leave_requests_are_dropped_from_the_registry() {
        let (platform, workflows) = fixture();
        let (approved, _) = requested(&workflows, &platform).await;
        let (denied, _) = requested(&workflows, &platform).await;
        assert_eq!(workflows.leave_requests.len(), 2);

        workflows
            .approve_leave(&designer(REVIEWER), &approved, "t")
            .await
            .expect("approval succeeds");
        assert_eq!(workflows.leave_requests.len(), 1);

        workflows
            .deny_leave(&designer(REVIEWER), &denied, "Busy season", "t")
            .await
            .expect("denial succeeds");
        assert!(workflows.leave_requests.is_empty());

        let late = workflows
            .deny_leave(&designer(REVIEWER), &approved, "Too late", "t")
            .await
            .expect_err("already approved");
        assert_eq!(late, WorkflowError::AlreadyDecided(DecisionKind::Approved));
        assert_eq!(late.user_message(), "⚠️ This request has already been decided.");
        assert_eq!(platform.role_grants().len(), 1);
    }

    #[tokio::test]
    async fn approvers_need_the_approver_role() {
        let (platform, workflows) = fixture();
        let (token, _) = requested(&workflows, &platform).await;

        let approve = workflows
            .approve_leave(&plain_member(REVIEWER), &token, "t")
            .await
            .expect_err("role required");
        assert_eq!(approve.user_message(), "❌ You do not have permission to approve LOAs.");

        let deny = workflows
            .request_leave_denial(&plain_member(REVIEWER), &token)
            .expect_err("role required");
        assert_eq!(deny.user_message(), "❌ You do not have permission to deny LOAs.");
    }
}
