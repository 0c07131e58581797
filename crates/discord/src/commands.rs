use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use switchdesk_core::domain::decision::REASON_MAX_CHARS;
use switchdesk_core::domain::ids::{ChannelId, GuildId, Member, UserId};
use thiserror::Error;

use crate::embeds::InteractionResponse;

pub const COMMAND_TYPE_CHAT_INPUT: u8 = 1;
pub const OPTION_TYPE_STRING: u8 = 3;
pub const OPTION_TYPE_USER: u8 = 6;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    Text(String),
    User(UserId),
}

/// A slash command as delivered by the platform, options keyed by name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub interaction_id: String,
    pub name: String,
    pub options: BTreeMap<String, OptionValue>,
    pub member: Member,
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
}

impl CommandInvocation {
    fn text(&self, option: &'static str) -> Result<String, CommandParseError> {
        self.optional_text(option)?.ok_or_else(|| self.missing(option))
    }

    fn optional_text(&self, option: &'static str) -> Result<Option<String>, CommandParseError> {
        match self.options.get(option) {
            None => Ok(None),
            Some(OptionValue::Text(value)) => Ok(Some(value.clone())),
            Some(OptionValue::User(_)) => Err(CommandParseError::WrongOptionType {
                command: self.name.clone(),
                option,
            }),
        }
    }

    fn user(&self, option: &'static str) -> Result<UserId, CommandParseError> {
        match self.options.get(option) {
            Some(OptionValue::User(user_id)) => Ok(*user_id),
            // Some clients deliver user options as bare snowflake strings.
            Some(OptionValue::Text(raw)) => raw.parse().map_err(|_| {
                CommandParseError::WrongOptionType { command: self.name.clone(), option }
            }),
            None => Err(self.missing(option)),
        }
    }

    fn missing(&self, option: &'static str) -> CommandParseError {
        CommandParseError::MissingOption { command: self.name.clone(), option }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BotCommand {
    Control { order_id: String, designer: UserId },
    Leave { duration: String, reason: String },
    Review { designer: UserId, reviewer: UserId, notes: Option<String> },
    Claim { order_id: String },
    Ping,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: /{0}")]
    UnsupportedCommand(String),
    #[error("/{command} is missing required option `{option}`")]
    MissingOption { command: String, option: &'static str },
    #[error("/{command} option `{option}` has the wrong type")]
    WrongOptionType { command: String, option: &'static str },
}

pub fn parse_command(invocation: &CommandInvocation) -> Result<BotCommand, CommandParseError> {
    match invocation.name.as_str() {
        "control" => Ok(BotCommand::Control {
            order_id: invocation.text("order_id")?,
            designer: invocation.user("designer")?,
        }),
        "loa" => Ok(BotCommand::Leave {
            duration: invocation.text("duration")?,
            reason: invocation.text("reason")?,
        }),
        "review" => Ok(BotCommand::Review {
            designer: invocation.user("designer")?,
            reviewer: invocation.user("reviewer")?,
            notes: invocation.optional_text("notes")?,
        }),
        "claim" => Ok(BotCommand::Claim { order_id: invocation.text("order_id")? }),
        "ping" => Ok(BotCommand::Ping),
        other => Err(CommandParseError::UnsupportedCommand(other.to_owned())),
    }
}

/// Per-command entry points. Workflow failures are answered with a notice,
/// so these never fail.
#[async_trait]
pub trait CommandService: Send + Sync {
    async fn control(
        &self,
        invocation: &CommandInvocation,
        order_id: String,
        designer: UserId,
    ) -> InteractionResponse;

    async fn leave(
        &self,
        invocation: &CommandInvocation,
        duration: String,
        reason: String,
    ) -> InteractionResponse;

    async fn review(
        &self,
        invocation: &CommandInvocation,
        designer: UserId,
        reviewer: UserId,
        notes: Option<String>,
    ) -> InteractionResponse;

    async fn claim(&self, invocation: &CommandInvocation, order_id: String) -> InteractionResponse;

    async fn ping(&self, invocation: &CommandInvocation) -> InteractionResponse;
}

pub struct CommandRouter<S> {
    service: Arc<S>,
}

impl<S> CommandRouter<S>
where
    S: CommandService,
{
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        invocation: &CommandInvocation,
    ) -> Result<InteractionResponse, CommandParseError> {
        let response = match parse_command(invocation)? {
            BotCommand::Control { order_id, designer } => {
                self.service.control(invocation, order_id, designer).await
            }
            BotCommand::Leave { duration, reason } => {
                self.service.leave(invocation, duration, reason).await
            }
            BotCommand::Review { designer, reviewer, notes } => {
                self.service.review(invocation, designer, reviewer, notes).await
            }
            BotCommand::Claim { order_id } => self.service.claim(invocation, order_id).await,
            BotCommand::Ping => self.service.ping(invocation).await,
        };
        Ok(response)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptionDefinition {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    #[serde(rename = "type")]
    pub kind: u8,
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<OptionDefinition>,
}

fn option(kind: u8, name: &'static str, description: &'static str) -> OptionDefinition {
    OptionDefinition { kind, name, description, required: true, max_length: None }
}

fn command(
    name: &'static str,
    description: &'static str,
    options: Vec<OptionDefinition>,
) -> CommandDefinition {
    CommandDefinition { kind: COMMAND_TYPE_CHAT_INPUT, name, description, options }
}

/// Registration body for every slash command the bot answers.
pub fn command_manifest() -> Vec<CommandDefinition> {
    vec![
        command(
            "control",
            "Submit a design for quality control (Designers only).",
            vec![
                option(OPTION_TYPE_STRING, "order_id", "The order the design belongs to."),
                option(OPTION_TYPE_USER, "designer", "The designer who made the product."),
            ],
        ),
        command(
            "loa",
            "Request a Leave of Absence (LOA).",
            vec![
                option(OPTION_TYPE_STRING, "duration", "Length of the leave, e.g. 5d, 2m or 1y."),
                OptionDefinition {
                    max_length: Some(REASON_MAX_CHARS),
                    ..option(OPTION_TYPE_STRING, "reason", "Why you are taking leave.")
                },
            ],
        ),
        command(
            "review",
            "Submit a review for a designer.",
            vec![
                option(OPTION_TYPE_USER, "designer", "Select the designer"),
                option(OPTION_TYPE_USER, "reviewer", "Select yourself (the reviewer)"),
                OptionDefinition {
                    required: false,
                    ..option(OPTION_TYPE_STRING, "notes", "Add any additional comments")
                },
            ],
        ),
        command(
            "claim",
            "Claim an order as a designer.",
            vec![option(OPTION_TYPE_STRING, "order_id", "The ID of the order you are claiming.")],
        ),
        command("ping", "Check the bot's latency.", Vec::new()),
    ]
}
