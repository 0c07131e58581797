//! Customer reviews collected through two private selects.

use std::sync::Arc;

use switchdesk_core::domain::ids::{Member, UserId};
use switchdesk_core::domain::review::{ProductCategory, ReviewDraft, ReviewRecord, StarRating};
use switchdesk_core::errors::{Resource, WorkflowError};
use tracing::info;

use super::custom_id;
use super::{Registry, Workflows};
use crate::embeds::{colors, MessageBuilder, MessagePayload, SelectMenu, SelectOption};

pub const SUBMITTED_NOTICE: &str = "✅ Review submitted successfully!";

impl Workflows {
    pub fn start_review(
        &self,
        member: &Member,
        designer: UserId,
        reviewer: UserId,
        notes: Option<&str>,
    ) -> MessagePayload {
        let token = Registry::<ReviewDraft>::new_token();
        let draft = ReviewDraft::new(member.user_id, designer, reviewer, notes);
        self.review_drafts.insert(token.clone(), draft);

        let options = ProductCategory::ALL
            .into_iter()
            .map(|category| {
                SelectOption::new(category.label(), category.label()).emoji(category.emoji())
            })
            .collect();
        MessageBuilder::new()
            .content("📌 Select the product type:")
            .action_row(|row| {
                row.select(SelectMenu::single(
                    custom_id::encode(custom_id::REVIEW_CATEGORY, &token),
                    "Select Product Type",
                    options,
                ));
            })
            .ephemeral()
            .build()
    }

    pub fn choose_review_category(
        &self,
        member: &Member,
        token: &str,
        selected: &str,
    ) -> Result<MessagePayload, WorkflowError> {
        let draft = self.owned_draft(member, token)?;
        let category = selected.parse::<ProductCategory>()?;
        self.review_drafts.insert(token.to_owned(), (*draft).clone().with_category(category));

        let options = StarRating::all()
            .map(|rating| SelectOption::new(rating.glyphs(), rating.stars().to_string()))
            .collect();
        Ok(MessageBuilder::new()
            .content(format!("📌 You selected **{}**. Now choose a star rating:", category.label()))
            .action_row(|row| {
                row.select(SelectMenu::single(
                    custom_id::encode(custom_id::REVIEW_RATING, token),
                    "Select Star Rating",
                    options,
                ));
            })
            .ephemeral()
            .build())
    }

    /// Publishes the finished review. The draft is dropped only once the post
    /// lands, so a failed post can be retried from the same select.
    pub async fn submit_review_rating(
        &self,
        member: &Member,
        token: &str,
        selected: &str,
    ) -> Result<ReviewRecord, WorkflowError> {
        let draft = self.owned_draft(member, token)?;
        let rating = selected.parse::<StarRating>()?;
        let record = (*draft).clone().finalize(rating)?;

        let channel = self
            .ctx
            .require_channel(self.ctx.guild.channels.reviews, Resource::ReviewChannel)
            .await?;
        let message = MessageBuilder::new()
            .embed("🌟 New Review Submitted", colors::GOLD, |embed| {
                embed
                    .inline_field("👤 Designer", record.designer.mention())
                    .inline_field("📝 Reviewer", record.reviewer.mention())
                    .field("📌 Product Type", record.category.label())
                    .inline_field(
                        "⭐ Rating",
                        format!(
                            "{} ({}/{})",
                            record.rating.glyphs(),
                            record.rating.stars(),
                            StarRating::MAX
                        ),
                    )
                    .field("🗒️ Notes", record.notes.as_str());
            })
            .build();
        self.ctx.platform.send_message(channel.id, &message).await?;
        self.review_drafts.take(token);

        info!(
            event_name = "workflow.review.submitted",
            user_id = %member.user_id,
            designer = %record.designer,
            category = record.category.label(),
            stars = record.rating.stars(),
            "review posted"
        );
        Ok(record)
    }

    fn owned_draft(
        &self,
        member: &Member,
        token: &str,
    ) -> Result<Arc<ReviewDraft>, WorkflowError> {
        self.review_drafts
            .get(token)
            .filter(|draft| draft.author == member.user_id)
            .ok_or_else(|| WorkflowError::UnknownInteraction(token.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use switchdesk_core::domain::review::{ProductCategory, StarRating, DEFAULT_REVIEW_NOTES};
    use switchdesk_core::errors::{Resource, WorkflowError};

    use super::super::testing::{fixture, guild, plain_member, ALICE, BOB, OUTSIDER, REVIEWER};
    use super::super::Workflows;
    use crate::embeds::{Component, MessagePayload};

    fn select_options(message: &MessagePayload) -> Vec<(String, String, Option<String>)> {
        match &message.components[0].components[0] {
            Component::Select(select) => select
                .options
                .iter()
                .map(|option| {
                    (
                        option.label.clone(),
                        option.value.clone(),
                        option.emoji.as_ref().map(|emoji| emoji.name.clone()),
                    )
                })
                .collect(),
            other => panic!("expected a select, got {other:?}"),
        }
    }

    fn token_of(message: &MessagePayload) -> String {
        let (_, token) = super::custom_id::parse_component(message.custom_ids()[0])
            .expect("select id should parse");
        token.to_owned()
    }

    fn start(workflows: &Workflows, notes: Option<&str>) -> String {
        let message = workflows.start_review(&plain_member(BOB), ALICE, REVIEWER, notes);
        token_of(&message)
    }

    #[tokio::test]
    async fn start_offers_every_product_category_privately() {
        let (_, workflows) = fixture();
        let message = workflows.start_review(&plain_member(BOB), ALICE, REVIEWER, None);

        assert!(message.is_ephemeral());
        assert_eq!(message.content.as_deref(), Some("📌 Select the product type:"));
        let options = select_options(&message);
        assert_eq!(options.len(), 5);
        assert_eq!(options[1], ("ELS".to_owned(), "ELS".to_owned(), Some("🚔".to_owned())));
    }

    #[tokio::test]
    async fn category_choice_offers_five_star_ratings() {
        let (_, workflows) = fixture();
        let token = start(&workflows, None);

        let message = workflows
            .choose_review_category(&plain_member(BOB), &token, "Livery")
            .expect("author may advance");
        assert_eq!(
            message.content.as_deref(),
            Some("📌 You selected **Livery**. Now choose a star rating:")
        );
        let options = select_options(&message);
        assert_eq!(options[0], ("⭐".to_owned(), "1".to_owned(), None));
        assert_eq!(options[4], ("⭐⭐⭐⭐⭐".to_owned(), "5".to_owned(), None));
    }

    #[tokio::test]
    async fn every_category_and_rating_posts_a_review() {
        let (platform, workflows) = fixture();

        for category in ProductCategory::ALL {
            for rating in StarRating::all() {
                let token = start(&workflows, None);
                workflows
                    .choose_review_category(&plain_member(BOB), &token, category.label())
                    .expect("category accepted");
                workflows
                    .submit_review_rating(&plain_member(BOB), &token, &rating.stars().to_string())
                    .await
                    .expect("review posted");

                let posted = platform.sent_to(guild().channels.reviews);
                let card = &posted.last().expect("review message").embeds[0];
                assert_eq!(card.title, "🌟 New Review Submitted");
                assert_eq!(card.field_value("📌 Product Type"), Some(category.label()));
                let expected = format!("{} ({}/5)", rating.glyphs(), rating.stars());
                assert_eq!(card.field_value("⭐ Rating"), Some(expected.as_str()));
                assert_eq!(card.field_value("🗒️ Notes"), Some(DEFAULT_REVIEW_NOTES));
                assert_eq!(card.field_value("👤 Designer"), Some("<@1001>"));
                assert_eq!(card.field_value("📝 Reviewer"), Some("<@1003>"));
            }
        }
        assert_eq!(platform.sent_to(guild().channels.reviews).len(), 25);
    }

    #[tokio::test]
    async fn only_the_invoking_user_can_advance_a_draft() {
        let (platform, workflows) = fixture();
        let token = start(&workflows, Some("Fast turnaround"));

        let error = workflows
            .choose_review_category(&plain_member(OUTSIDER), &token, "ELS")
            .expect_err("outsider cannot advance");
        assert!(matches!(error, WorkflowError::UnknownInteraction(_)));

        workflows.choose_review_category(&plain_member(BOB), &token, "ELS").expect("author ok");
        let error = workflows
            .submit_review_rating(&plain_member(OUTSIDER), &token, "4")
            .await
            .expect_err("outsider cannot rate");
        assert!(matches!(error, WorkflowError::UnknownInteraction(_)));
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_review_channel_keeps_the_draft_for_retry() {
        let (platform, workflows) = fixture();
        let token = start(&workflows, Some("Fast turnaround"));
        workflows.choose_review_category(&plain_member(BOB), &token, "Graphics").expect("ok");
        platform.remove_channel(guild().channels.reviews);

        let error = workflows
            .submit_review_rating(&plain_member(BOB), &token, "4")
            .await
            .expect_err("channel missing");
        assert_eq!(error, WorkflowError::ResourceUnresolvable(Resource::ReviewChannel));
        assert_eq!(error.user_message(), "❌ Review channel not found.");

        platform.add_channel(guild().channels.reviews, "reviews");
        let record = workflows
            .submit_review_rating(&plain_member(BOB), &token, "4")
            .await
            .expect("retry after the channel returns");
        assert_eq!(record.notes, "Fast turnaround");
    }

    #[tokio::test]
    async fn rating_before_category_is_rejected() {
        let (_, workflows) = fixture();
        let token = start(&workflows, None);
        let error = workflows
            .submit_review_rating(&plain_member(BOB), &token, "3")
            .await
            .expect_err("category missing");
        assert!(matches!(error, WorkflowError::ValidationFailed(_)));
    }
}
