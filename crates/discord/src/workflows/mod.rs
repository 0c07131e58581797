//! Guild workflows: quality control, leave requests, reviews, order claims,
//! onboarding and the liveness check.
//!
//! Every workflow is a method on [`Workflows`]. Methods return
//! `Result<_, WorkflowError>`; the event-service impls at the bottom of this
//! module turn errors into private notices so a failed workflow never fails
//! the interaction.

pub mod claim;
pub mod custom_id;
pub mod leave;
pub mod onboarding;
pub mod ping;
pub mod quality_control;
pub mod review;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchdesk_core::config::GuildConfig;
use switchdesk_core::domain::decision::{
    DecisionCell, DecisionKind, DecisionOutcome, SideEffectStatus, TransitionReport,
};
use switchdesk_core::domain::ids::{ChannelId, UserId};
use switchdesk_core::domain::leave::LeaveRequest;
use switchdesk_core::domain::review::ReviewDraft;
use switchdesk_core::domain::submission::Submission;
use switchdesk_core::errors::{Resource, ValidationError, WorkflowError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::commands::{CommandInvocation, CommandService};
use crate::embeds::{Embed, InteractionResponse, MessageBuilder, MessagePayload};
use crate::events::{
    dispatcher_for, ComponentInteraction, ComponentService, EventContext, EventDispatcher,
    EventHandlerError, MemberJoinEvent, MembershipService, ModalService, ModalSubmission,
};
use crate::platform::{MessageRef, Platform, PlatformError, ResolvedChannel};

use self::custom_id::{ComponentAction, ModalAction};
use self::quality_control::PendingSubmission;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant, for deterministic timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything a workflow needs from the outside world.
#[derive(Clone)]
pub struct WorkflowContext {
    pub platform: Arc<dyn Platform>,
    pub guild: GuildConfig,
    pub clock: Arc<dyn Clock>,
}

impl WorkflowContext {
    pub fn new(platform: Arc<dyn Platform>, guild: GuildConfig) -> Self {
        Self { platform, guild, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn require_channel(
        &self,
        channel_id: ChannelId,
        resource: Resource,
    ) -> Result<ResolvedChannel, WorkflowError> {
        self.platform
            .resolve_channel(channel_id)
            .await?
            .ok_or(WorkflowError::ResourceUnresolvable(resource))
    }
}

/// In-memory map from control token to the state a later interaction needs.
pub struct Registry<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<T> Registry<T> {
    pub fn new_token() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn insert(&self, token: String, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.lock().insert(token, value.clone());
        value
    }

    pub fn get(&self, token: &str) -> Option<Arc<T>> {
        self.lock().get(token).cloned()
    }

    pub fn take(&self, token: &str) -> Option<Arc<T>> {
        self.lock().remove(token)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<T>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Outcomes of decided requests, kept after their records are dropped so a
/// late click still reads "already decided". Oldest tokens are evicted first.
pub struct DecidedTokens {
    capacity: usize,
    entries: Mutex<DecidedEntries>,
}

#[derive(Default)]
struct DecidedEntries {
    order: VecDeque<String>,
    kinds: HashMap<String, DecisionKind>,
}

pub const DECIDED_TOKEN_CAPACITY: usize = 4_096;

impl Default for DecidedTokens {
    fn default() -> Self {
        Self::with_capacity(DECIDED_TOKEN_CAPACITY)
    }
}

impl DecidedTokens {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: Mutex::new(DecidedEntries::default()) }
    }

    pub fn record(&self, token: &str, kind: DecisionKind) {
        let mut entries = self.lock();
        if entries.kinds.insert(token.to_owned(), kind).is_none() {
            entries.order.push_back(token.to_owned());
        }
        while entries.order.len() > self.capacity {
            if let Some(evicted) = entries.order.pop_front() {
                entries.kinds.remove(&evicted);
            }
        }
    }

    pub fn get(&self, token: &str) -> Option<DecisionKind> {
        self.lock().kinds.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, DecidedEntries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A posted request awaiting one approve/deny decision.
pub struct DecisionRecord<S> {
    pub subject: S,
    pub cell: DecisionCell,
    pub embed: Embed,
    pub message: MessageRef,
}

impl<S> DecisionRecord<S> {
    pub fn new(subject: S, embed: Embed, message: MessageRef) -> Self {
        Self { subject, cell: DecisionCell::new(), embed, message }
    }

    /// Posted embed with the outcome footer and no controls.
    pub fn decided_message(&self, outcome: &DecisionOutcome) -> MessagePayload {
        MessageBuilder::new().push_embed(self.embed.clone().with_footer(outcome.footer())).build()
    }
}

pub(crate) fn status_of<T>(result: Result<T, PlatformError>) -> SideEffectStatus {
    match result {
        Ok(_) => SideEffectStatus::Delivered,
        Err(error) => SideEffectStatus::Failed(error.to_string()),
    }
}

pub(crate) fn log_side_effects(
    correlation_id: &str,
    side_effects: &[switchdesk_core::domain::decision::SideEffectReport],
) {
    for report in side_effects {
        match &report.status {
            SideEffectStatus::Delivered => {}
            SideEffectStatus::Skipped(reason) => debug!(
                event_name = "workflow.side_effect.skipped",
                correlation_id,
                effect = report.effect,
                reason = %reason,
                "side effect skipped"
            ),
            SideEffectStatus::Failed(error) => warn!(
                event_name = "workflow.side_effect.failed",
                correlation_id,
                effect = report.effect,
                error = %error,
                "best-effort side effect failed"
            ),
        }
    }
}

pub struct Workflows {
    ctx: WorkflowContext,
    pending_submissions: Registry<PendingSubmission>,
    quality_control: Registry<DecisionRecord<Submission>>,
    leave_requests: Registry<DecisionRecord<LeaveRequest>>,
    decided: DecidedTokens,
    review_drafts: Registry<ReviewDraft>,
}

impl Workflows {
    pub fn new(ctx: WorkflowContext) -> Self {
        Self {
            ctx,
            pending_submissions: Registry::default(),
            quality_control: Registry::default(),
            leave_requests: Registry::default(),
            decided: DecidedTokens::default(),
            review_drafts: Registry::default(),
        }
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    pub fn dispatcher(self: &Arc<Self>) -> EventDispatcher {
        dispatcher_for(self.clone())
    }

    /// Live record for `token`; decided tokens fail with their outcome.
    fn open_record<S>(
        &self,
        records: &Registry<DecisionRecord<S>>,
        token: &str,
    ) -> Result<Arc<DecisionRecord<S>>, WorkflowError> {
        if let Some(record) = records.get(token) {
            return Ok(record);
        }
        Err(match self.decided.get(token) {
            Some(kind) => WorkflowError::AlreadyDecided(kind),
            None => WorkflowError::UnknownInteraction(token.to_owned()),
        })
    }

    /// Compare-and-set the record's decision, swap it for a decided token,
    /// then edit its message.
    async fn finalize<S: Sync>(
        &self,
        records: &Registry<DecisionRecord<S>>,
        token: &str,
        record: &DecisionRecord<S>,
        outcome: DecisionOutcome,
    ) -> Result<TransitionReport, WorkflowError> {
        record.cell.decide(&outcome).map_err(WorkflowError::AlreadyDecided)?;
        // The tombstone must exist before the record disappears.
        self.decided.record(token, outcome.kind());
        records.take(token);

        let mut report = TransitionReport::new(outcome);
        let edited = record.decided_message(&report.outcome);
        let status = status_of(self.ctx.platform.edit_message(&record.message, &edited).await);
        report.record("edit_message", status);
        Ok(report)
    }
}

fn respond<T>(
    correlation_id: &str,
    user_id: UserId,
    result: Result<T, WorkflowError>,
    into_response: impl FnOnce(T) -> InteractionResponse,
) -> InteractionResponse {
    match result {
        Ok(value) => into_response(value),
        Err(error) => {
            match &error {
                WorkflowError::Platform(_) => warn!(
                    event_name = "workflow.failed",
                    correlation_id,
                    user_id = %user_id,
                    error = %error,
                    "workflow aborted by platform failure"
                ),
                _ => info!(
                    event_name = "workflow.rejected",
                    correlation_id,
                    user_id = %user_id,
                    error = %error,
                    "workflow rejected"
                ),
            }
            InteractionResponse::notice(error.user_message())
        }
    }
}

#[async_trait]
impl CommandService for Workflows {
    async fn control(
        &self,
        invocation: &CommandInvocation,
        order_id: String,
        designer: UserId,
    ) -> InteractionResponse {
        let result = self.open_submission_form(&invocation.member, &order_id, designer);
        respond(&invocation.interaction_id, invocation.member.user_id, result, InteractionResponse::Modal)
    }

    async fn leave(
        &self,
        invocation: &CommandInvocation,
        duration: String,
        reason: String,
    ) -> InteractionResponse {
        let correlation_id = invocation.interaction_id.as_str();
        let result = self.request_leave(&invocation.member, &duration, &reason, correlation_id).await;
        respond(correlation_id, invocation.member.user_id, result, |_| {
            InteractionResponse::notice(leave::SUBMITTED_NOTICE)
        })
    }

    async fn review(
        &self,
        invocation: &CommandInvocation,
        designer: UserId,
        reviewer: UserId,
        notes: Option<String>,
    ) -> InteractionResponse {
        let message =
            self.start_review(&invocation.member, designer, reviewer, notes.as_deref());
        InteractionResponse::Message(message)
    }

    async fn claim(&self, invocation: &CommandInvocation, order_id: String) -> InteractionResponse {
        let correlation_id = invocation.interaction_id.as_str();
        let result = self.claim_order(invocation, &order_id).await;
        respond(correlation_id, invocation.member.user_id, result, InteractionResponse::Message)
    }

    async fn ping(&self, invocation: &CommandInvocation) -> InteractionResponse {
        let result = self.ping_latency().await;
        respond(&invocation.interaction_id, invocation.member.user_id, result, |latency| {
            InteractionResponse::notice(ping::pong_message(latency))
        })
    }
}

#[async_trait]
impl ComponentService for Workflows {
    async fn handle_component(
        &self,
        event: &ComponentInteraction,
        ctx: &EventContext,
    ) -> Result<InteractionResponse, EventHandlerError> {
        let Some((action, token)) = custom_id::parse_component(&event.custom_id) else {
            return Err(EventHandlerError::UnknownComponent(event.custom_id.clone()));
        };
        let correlation_id = ctx.correlation_id.as_str();
        let member = &event.member;
        let selected = event.values.first().map(String::as_str);

        let response = match action {
            ComponentAction::ApproveQualityControl => {
                let result = self.approve_quality_control(member, token, correlation_id).await;
                respond(correlation_id, member.user_id, result, |_| {
                    InteractionResponse::notice(quality_control::APPROVED_NOTICE)
                })
            }
            ComponentAction::DenyQualityControl => {
                let result = self.request_quality_control_denial(member, token);
                respond(correlation_id, member.user_id, result, InteractionResponse::Modal)
            }
            ComponentAction::ApproveLeave => {
                let result = self.approve_leave(member, token, correlation_id).await;
                respond(correlation_id, member.user_id, result, |_| {
                    InteractionResponse::notice(leave::APPROVED_NOTICE)
                })
            }
            ComponentAction::DenyLeave => {
                let result = self.request_leave_denial(member, token);
                respond(correlation_id, member.user_id, result, InteractionResponse::Modal)
            }
            ComponentAction::ChooseReviewCategory => {
                let result = selected
                    .ok_or(WorkflowError::from(ValidationError::EmptyField("category")))
                    .and_then(|value| self.choose_review_category(member, token, value));
                respond(correlation_id, member.user_id, result, InteractionResponse::Message)
            }
            ComponentAction::ChooseReviewRating => {
                let result = match selected {
                    Some(value) => self.submit_review_rating(member, token, value).await,
                    None => Err(ValidationError::EmptyField("rating").into()),
                };
                respond(correlation_id, member.user_id, result, |_| {
                    InteractionResponse::notice(review::SUBMITTED_NOTICE)
                })
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl ModalService for Workflows {
    async fn handle_modal(
        &self,
        event: &ModalSubmission,
        ctx: &EventContext,
    ) -> Result<InteractionResponse, EventHandlerError> {
        let Some((action, token)) = custom_id::parse_modal(&event.custom_id) else {
            return Err(EventHandlerError::UnknownModal(event.custom_id.clone()));
        };
        let correlation_id = ctx.correlation_id.as_str();
        let member = &event.member;
        let field = |name: &'static str| {
            event.field(name).ok_or_else(|| EventHandlerError::MissingField {
                form: event.custom_id.clone(),
                field: name,
            })
        };

        let response = match action {
            ModalAction::SubmitQualityControl => {
                let images = field(custom_id::IMAGES_INPUT)?;
                let result =
                    self.submit_quality_control(member, token, images, correlation_id).await;
                respond(correlation_id, member.user_id, result, |_| {
                    InteractionResponse::notice(quality_control::SUBMITTED_NOTICE)
                })
            }
            ModalAction::DenyQualityControl => {
                let reason = field(custom_id::REASON_INPUT)?;
                let result = self.deny_quality_control(member, token, reason, correlation_id).await;
                respond(correlation_id, member.user_id, result, |_| {
                    InteractionResponse::notice(quality_control::DENIED_NOTICE)
                })
            }
            ModalAction::DenyLeave => {
                let reason = field(custom_id::REASON_INPUT)?;
                let result = self.deny_leave(member, token, reason, correlation_id).await;
                respond(correlation_id, member.user_id, result, |_| {
                    InteractionResponse::notice(leave::DENIED_NOTICE)
                })
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl MembershipService for Workflows {
    async fn member_joined(&self, event: &MemberJoinEvent, ctx: &EventContext) {
        if event.guild_id != self.ctx.guild.guild_id {
            debug!(
                event_name = "workflow.onboarding.foreign_guild",
                correlation_id = %ctx.correlation_id,
                guild_id = %event.guild_id,
                "join in another guild ignored"
            );
            return;
        }
        let report = self.welcome_member(event.user_id).await;
        log_side_effects(&ctx.correlation_id, &report.side_effects);
        info!(
            event_name = "workflow.onboarding.completed",
            correlation_id = %ctx.correlation_id,
            user_id = %event.user_id,
            welcomed = report.welcomed(),
            "member onboarding finished"
        );
    }
}
