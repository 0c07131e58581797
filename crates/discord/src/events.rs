use std::{collections::BTreeMap, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use switchdesk_core::domain::ids::{ChannelId, GuildId, Member, MessageId, UserId};
use thiserror::Error;

use crate::{
    commands::{CommandInvocation, CommandParseError, CommandRouter, CommandService},
    embeds::InteractionResponse,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    SlashCommand(CommandInvocation),
    ComponentClick(ComponentInteraction),
    ModalSubmit(ModalSubmission),
    MemberJoined(MemberJoinEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::SlashCommand(_) => GatewayEventType::SlashCommand,
            Self::ComponentClick(_) => GatewayEventType::ComponentClick,
            Self::ModalSubmit(_) => GatewayEventType::ModalSubmit,
            Self::MemberJoined(_) => GatewayEventType::MemberJoined,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }

    /// Invoking user, when the event has one.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::SlashCommand(invocation) => Some(invocation.member.user_id),
            Self::ComponentClick(click) => Some(click.member.user_id),
            Self::ModalSubmit(submission) => Some(submission.member.user_id),
            Self::MemberJoined(joined) => Some(joined.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    SlashCommand,
    ComponentClick,
    ModalSubmit,
    MemberJoined,
    Unsupported,
}

/// Button press or select choice on a message the bot posted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInteraction {
    pub interaction_id: String,
    pub custom_id: String,
    pub values: Vec<String>,
    pub member: Member,
    pub channel_id: ChannelId,
    pub message_id: Option<MessageId>,
}

/// Completed form; text inputs keyed by their custom id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModalSubmission {
    pub interaction_id: String,
    pub custom_id: String,
    pub fields: BTreeMap<String, String>,
    pub member: Member,
    pub channel_id: ChannelId,
}

impl ModalSubmission {
    pub fn field(&self, custom_id: &str) -> Option<&str> {
        self.fields.get(custom_id).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberJoinEvent {
    pub guild_id: GuildId,
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(InteractionResponse),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("unknown component id `{0}`")]
    UnknownComponent(String),
    #[error("unknown form id `{0}`")]
    UnknownModal(String),
    #[error("form `{form}` is missing field `{field}`")]
    MissingField { form: String, field: &'static str },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Registers one handler per supported event type, all backed by `service`.
pub fn dispatcher_for<S>(service: Arc<S>) -> EventDispatcher
where
    S: CommandService + ComponentService + ModalService + MembershipService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler::new(service.clone()));
    dispatcher.register(ComponentHandler::new(service.clone()));
    dispatcher.register(ModalHandler::new(service.clone()));
    dispatcher.register(MemberJoinHandler::new(service));
    dispatcher
}

pub struct SlashCommandHandler<S> {
    router: CommandRouter<S>,
}

impl<S> SlashCommandHandler<S>
where
    S: CommandService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { router: CommandRouter::new(service) }
    }
}

#[async_trait]
impl<S> EventHandler for SlashCommandHandler<S>
where
    S: CommandService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::SlashCommand(invocation) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let response = self.router.route(invocation).await?;
        Ok(HandlerResult::Responded(response))
    }
}

#[async_trait]
pub trait ComponentService: Send + Sync {
    async fn handle_component(
        &self,
        event: &ComponentInteraction,
        ctx: &EventContext,
    ) -> Result<InteractionResponse, EventHandlerError>;
}

pub struct ComponentHandler<S> {
    service: Arc<S>,
}

impl<S> ComponentHandler<S>
where
    S: ComponentService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ComponentHandler<S>
where
    S: ComponentService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ComponentClick
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ComponentClick(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let response = self.service.handle_component(event, ctx).await?;
        Ok(HandlerResult::Responded(response))
    }
}

#[async_trait]
pub trait ModalService: Send + Sync {
    async fn handle_modal(
        &self,
        event: &ModalSubmission,
        ctx: &EventContext,
    ) -> Result<InteractionResponse, EventHandlerError>;
}

pub struct ModalHandler<S> {
    service: Arc<S>,
}

impl<S> ModalHandler<S>
where
    S: ModalService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for ModalHandler<S>
where
    S: ModalService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::ModalSubmit
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::ModalSubmit(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let response = self.service.handle_modal(event, ctx).await?;
        Ok(HandlerResult::Responded(response))
    }
}

#[async_trait]
pub trait MembershipService: Send + Sync {
    async fn member_joined(&self, event: &MemberJoinEvent, ctx: &EventContext);
}

pub struct MemberJoinHandler<S> {
    service: Arc<S>,
}

impl<S> MemberJoinHandler<S>
where
    S: MembershipService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MemberJoinHandler<S>
where
    S: MembershipService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MemberJoined
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MemberJoined(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.service.member_joined(event, ctx).await;
        Ok(HandlerResult::Processed)
    }
}
