//! Quality control: designers submit finished work, reviewers approve or deny
//! it with a written reason.

use switchdesk_core::domain::decision::{
    check_reason_length, DecisionOutcome, SideEffectStatus, TransitionReport, REASON_MAX_CHARS,
};
use switchdesk_core::domain::ids::{Member, UserId};
use switchdesk_core::domain::submission::Submission;
use switchdesk_core::errors::{GatedAction, Resource, ValidationError, WorkflowError};
use switchdesk_core::gate::require_role;
use tracing::info;

use super::custom_id::{self, IMAGES_INPUT, REASON_INPUT};
use super::{log_side_effects, status_of, DecisionRecord, Registry, Workflows};
use crate::embeds::{
    colors, embed, timestamp, Button, ButtonStyle, MessageBuilder, MessagePayload, Modal,
    TextInput, TextInputStyle,
};

pub const SUBMITTED_NOTICE: &str = "✅ Your submission has been sent for Quality Control.";
pub const APPROVED_NOTICE: &str = "✅ Design approved.";
pub const DENIED_NOTICE: &str = "✅ Denial reason sent.";

const SUBMISSION_TITLE: &str = "🛠️ Quality Control Submission";
const IMAGE_PLACEHOLDER: &str = "Paste image URLs (separate multiple links with a comma)";

/// Order and designer captured by `/control`, waiting for the image form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingSubmission {
    pub opened_by: UserId,
    pub designer: UserId,
    pub order_id: String,
}

impl Workflows {
    pub fn open_submission_form(
        &self,
        member: &Member,
        order_id: &str,
        designer: UserId,
    ) -> Result<Modal, WorkflowError> {
        require_role(member, self.ctx.guild.roles.designer, GatedAction::SubmitQualityControl)?;
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(ValidationError::EmptyField("order_id").into());
        }

        let token = Registry::<PendingSubmission>::new_token();
        self.pending_submissions.insert(
            token.clone(),
            PendingSubmission { opened_by: member.user_id, designer, order_id: order_id.to_owned() },
        );

        Ok(Modal::new(custom_id::encode(custom_id::QC_SUBMIT, &token), "Upload QC Images")
            .text_input(
                TextInput::new(IMAGES_INPUT, "Image Links", TextInputStyle::Short)
                    .placeholder(IMAGE_PLACEHOLDER),
            ))
    }

    /// Posts the submission with approve/deny controls. The pending form stays
    /// open if validation or the post fails so the designer can resubmit.
    pub async fn submit_quality_control(
        &self,
        member: &Member,
        token: &str,
        raw_media: &str,
        correlation_id: &str,
    ) -> Result<(), WorkflowError> {
        let pending = self
            .pending_submissions
            .get(token)
            .filter(|pending| pending.opened_by == member.user_id)
            .ok_or_else(|| WorkflowError::UnknownInteraction(token.to_owned()))?;

        let submission =
            Submission::new(pending.designer, &pending.order_id, raw_media, self.ctx.now())?;
        let channel = self
            .ctx
            .require_channel(self.ctx.guild.channels.quality_control, Resource::QualityControlChannel)
            .await?;

        let record_token = Registry::<()>::new_token();
        let card = embed(SUBMISSION_TITLE, colors::BLUE, |embed| {
            embed
                .inline_field("🆔 Order ID", submission.order_id.as_str())
                .inline_field("👤 Designer", submission.designer.mention())
                .field("📅 Submitted On", timestamp(submission.submitted_at))
                .image(submission.primary_media());
        });
        let message = MessageBuilder::new()
            .push_embed(card.clone())
            .action_row(|row| {
                row.button(Button::new(
                    custom_id::encode(custom_id::QC_APPROVE, &record_token),
                    "Approve",
                    ButtonStyle::Success,
                ))
                .button(Button::new(
                    custom_id::encode(custom_id::QC_DENY, &record_token),
                    "Deny",
                    ButtonStyle::Danger,
                ));
            })
            .build();

        let posted = self.ctx.platform.send_message(channel.id, &message).await?;
        self.pending_submissions.take(token);
        info!(
            event_name = "workflow.quality_control.submitted",
            correlation_id,
            user_id = %member.user_id,
            order_id = %submission.order_id,
            media = submission.media_urls.len(),
            "quality control submission posted"
        );
        self.quality_control.insert(record_token, DecisionRecord::new(submission, card, posted));
        Ok(())
    }

    pub async fn approve_quality_control(
        &self,
        member: &Member,
        token: &str,
        correlation_id: &str,
    ) -> Result<TransitionReport, WorkflowError> {
        require_role(member, self.ctx.guild.roles.qc_reviewer, GatedAction::ReviewQualityControl)?;
        let record = self.open_record(&self.quality_control, token)?;

        let mut report = self
            .finalize(&self.quality_control, token, &record, DecisionOutcome::Approved)
            .await?;
        let notice = MessageBuilder::new()
            .content(format!(
                "✅ {} **Your product has passed Quality Control!** 🎉",
                record.subject.designer.mention()
            ))
            .build();
        let status = self.post_result(&notice).await;
        report.record("results_notice", status);

        self.finish(correlation_id, member, &record.subject, &report);
        Ok(report)
    }

    /// Returns the denial form, or fails early if the record was already
    /// decided.
    pub fn request_quality_control_denial(
        &self,
        member: &Member,
        token: &str,
    ) -> Result<Modal, WorkflowError> {
        require_role(member, self.ctx.guild.roles.qc_reviewer, GatedAction::ReviewQualityControl)?;
        let record = self.open_record(&self.quality_control, token)?;
        record.cell.ensure_pending().map_err(WorkflowError::AlreadyDecided)?;

        Ok(denial_form(custom_id::QC_DENY_REASON, token, "Deny Quality Check Submission"))
    }

    pub async fn deny_quality_control(
        &self,
        member: &Member,
        token: &str,
        reason: &str,
        correlation_id: &str,
    ) -> Result<TransitionReport, WorkflowError> {
        require_role(member, self.ctx.guild.roles.qc_reviewer, GatedAction::ReviewQualityControl)?;
        if reason.trim().is_empty() {
            return Err(ValidationError::EmptyField("reason").into());
        }
        check_reason_length(reason)?;
        let record = self.open_record(&self.quality_control, token)?;

        let outcome = DecisionOutcome::Denied { reason: reason.to_owned() };
        let mut report = self.finalize(&self.quality_control, token, &record, outcome).await?;

        let mention = MessageBuilder::new()
            .content(format!(
                "{} ❌ Product was Denied, Quality does not meet standards Expected.",
                record.subject.designer.mention()
            ))
            .build();
        let status = self.post_result(&mention).await;
        report.record("results_notice", status);

        let details = MessageBuilder::new()
            .embed("❌ Quality Check Denied", colors::RED, |embed| {
                embed.field("Reason", reason);
            })
            .build();
        let status = self.post_result(&details).await;
        report.record("results_reason", status);

        self.finish(correlation_id, member, &record.subject, &report);
        Ok(report)
    }

    async fn post_result(&self, message: &MessagePayload) -> SideEffectStatus {
        let channel_id = self.ctx.guild.channels.quality_control_results;
        match self.ctx.platform.resolve_channel(channel_id).await {
            Ok(Some(channel)) => {
                status_of(self.ctx.platform.send_message(channel.id, message).await)
            }
            Ok(None) => SideEffectStatus::Skipped(
                Resource::QualityControlResultsChannel.label().to_owned() + " not found",
            ),
            Err(error) => SideEffectStatus::Failed(error.to_string()),
        }
    }

    fn finish(
        &self,
        correlation_id: &str,
        member: &Member,
        submission: &Submission,
        report: &TransitionReport,
    ) {
        log_side_effects(correlation_id, &report.side_effects);
        info!(
            event_name = "workflow.quality_control.decided",
            correlation_id,
            user_id = %member.user_id,
            order_id = %submission.order_id,
            decision = ?report.outcome.kind(),
            "quality control decision recorded"
        );
    }
}

pub(crate) fn denial_form(action: &str, token: &str, title: &str) -> Modal {
    Modal::new(custom_id::encode(action, token), title)
        .text_input(
            TextInput::new(REASON_INPUT, "Denial Reason", TextInputStyle::Paragraph)
                .max_length(REASON_MAX_CHARS),
        )
}
