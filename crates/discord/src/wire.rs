//! Discord interaction and gateway JSON, converted to and from the event model.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Value};
use switchdesk_core::domain::ids::{ChannelId, GuildId, Member, MessageId, RoleId, UserId};
use thiserror::Error;

use crate::commands::{CommandInvocation, OptionValue, OPTION_TYPE_USER};
use crate::embeds::InteractionResponse;
use crate::events::{
    ComponentInteraction, GatewayEnvelope, GatewayEvent, MemberJoinEvent, ModalSubmission,
};

pub const INTERACTION_PING: u8 = 1;
pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;
pub const INTERACTION_MESSAGE_COMPONENT: u8 = 3;
pub const INTERACTION_MODAL_SUBMIT: u8 = 5;

const CALLBACK_PONG: u8 = 1;
const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
const CALLBACK_MODAL: u8 = 9;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("malformed interaction json: {0}")]
    Json(String),
    #[error("interaction is missing `{0}`")]
    MissingField(&'static str),
    #[error("`{field}` is not a snowflake: {value}")]
    InvalidSnowflake { field: &'static str, value: String },
}

impl From<serde_json::Error> for WireError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionRequest {
    Ping,
    Event(GatewayEnvelope),
}

#[derive(Debug, Deserialize)]
struct RawInteraction {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    guild_id: Option<String>,
    channel_id: Option<String>,
    member: Option<RawMember>,
    user: Option<RawUser>,
    data: Option<RawData>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    user: RawUser,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawData {
    name: Option<String>,
    #[serde(default)]
    options: Vec<RawOption>,
    custom_id: Option<String>,
    #[serde(default)]
    values: Vec<String>,
    #[serde(default)]
    components: Vec<RawRow>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    name: String,
    #[serde(rename = "type")]
    kind: u8,
    value: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(default)]
    components: Vec<RawInput>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    custom_id: String,
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawDispatch {
    t: Option<String>,
    s: Option<u64>,
    d: Value,
}

#[derive(Debug, Deserialize)]
struct RawMemberAdd {
    guild_id: String,
    user: RawUser,
}

fn snowflake<T: FromStr>(field: &'static str, raw: &str) -> Result<T, WireError> {
    raw.parse().map_err(|_| WireError::InvalidSnowflake { field, value: raw.to_owned() })
}

/// Parses an HTTP interaction body. Unknown interaction types become
/// `Unsupported` events rather than errors.
pub fn parse_interaction(body: &[u8]) -> Result<InteractionRequest, WireError> {
    let raw: RawInteraction = serde_json::from_slice(body)?;
    if raw.kind == INTERACTION_PING {
        return Ok(InteractionRequest::Ping);
    }

    let event = match raw.kind {
        INTERACTION_APPLICATION_COMMAND => GatewayEvent::SlashCommand(command(&raw)?),
        INTERACTION_MESSAGE_COMPONENT => GatewayEvent::ComponentClick(component(&raw)?),
        INTERACTION_MODAL_SUBMIT => GatewayEvent::ModalSubmit(modal(&raw)?),
        other => GatewayEvent::Unsupported { event_type: format!("INTERACTION_{other}") },
    };
    Ok(InteractionRequest::Event(GatewayEnvelope { envelope_id: raw.id, event }))
}

/// Parses a gateway dispatch frame (`{"t": .., "s": .., "d": ..}`).
pub fn parse_dispatch(frame: &[u8]) -> Result<GatewayEnvelope, WireError> {
    let raw: RawDispatch = serde_json::from_slice(frame)?;
    let event_type = raw.t.unwrap_or_default();
    let envelope_id = format!("{}#{}", event_type, raw.s.unwrap_or_default());

    let event = match event_type.as_str() {
        "GUILD_MEMBER_ADD" => {
            let added: RawMemberAdd = serde_json::from_value(raw.d)?;
            GatewayEvent::MemberJoined(MemberJoinEvent {
                guild_id: snowflake("guild_id", &added.guild_id)?,
                user_id: snowflake("user.id", &added.user.id)?,
            })
        }
        "INTERACTION_CREATE" => {
            let body = serde_json::to_vec(&raw.d)?;
            return match parse_interaction(&body)? {
                InteractionRequest::Event(envelope) => Ok(envelope),
                InteractionRequest::Ping => Ok(GatewayEnvelope {
                    envelope_id,
                    event: GatewayEvent::Unsupported { event_type: "PING".to_owned() },
                }),
            };
        }
        _ => GatewayEvent::Unsupported { event_type },
    };
    Ok(GatewayEnvelope { envelope_id, event })
}

fn member(raw: &RawInteraction) -> Result<Member, WireError> {
    if let Some(member) = &raw.member {
        let roles = member
            .roles
            .iter()
            .map(|role| snowflake::<RoleId>("member.roles", role))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Member::new(snowflake("member.user.id", &member.user.id)?, roles));
    }
    let user = raw.user.as_ref().ok_or(WireError::MissingField("member"))?;
    Ok(Member::new(snowflake("user.id", &user.id)?, []))
}

fn channel(raw: &RawInteraction) -> Result<ChannelId, WireError> {
    let channel_id = raw.channel_id.as_deref().ok_or(WireError::MissingField("channel_id"))?;
    snowflake("channel_id", channel_id)
}

fn data(raw: &RawInteraction) -> Result<&RawData, WireError> {
    raw.data.as_ref().ok_or(WireError::MissingField("data"))
}

fn command(raw: &RawInteraction) -> Result<CommandInvocation, WireError> {
    let data = data(raw)?;
    let name = data.name.clone().ok_or(WireError::MissingField("data.name"))?;
    let mut options = BTreeMap::new();
    for option in &data.options {
        let Some(value) = &option.value else { continue };
        let value = match (option.kind, value) {
            (OPTION_TYPE_USER, Value::String(id)) => {
                OptionValue::User(snowflake::<UserId>("data.options.value", id)?)
            }
            (_, Value::String(text)) => OptionValue::Text(text.clone()),
            (_, other) => OptionValue::Text(other.to_string()),
        };
        options.insert(option.name.clone(), value);
    }

    Ok(CommandInvocation {
        interaction_id: raw.id.clone(),
        name,
        options,
        member: member(raw)?,
        guild_id: raw
            .guild_id
            .as_deref()
            .map(|id| snowflake::<GuildId>("guild_id", id))
            .transpose()?,
        channel_id: channel(raw)?,
    })
}

fn component(raw: &RawInteraction) -> Result<ComponentInteraction, WireError> {
    let data = data(raw)?;
    Ok(ComponentInteraction {
        interaction_id: raw.id.clone(),
        custom_id: data.custom_id.clone().ok_or(WireError::MissingField("data.custom_id"))?,
        values: data.values.clone(),
        member: member(raw)?,
        channel_id: channel(raw)?,
        message_id: raw
            .message
            .as_ref()
            .map(|message| snowflake::<MessageId>("message.id", &message.id))
            .transpose()?,
    })
}

fn modal(raw: &RawInteraction) -> Result<ModalSubmission, WireError> {
    let data = data(raw)?;
    let fields = data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .map(|input| (input.custom_id.clone(), input.value.clone().unwrap_or_default()))
        .collect();
    Ok(ModalSubmission {
        interaction_id: raw.id.clone(),
        custom_id: data.custom_id.clone().ok_or(WireError::MissingField("data.custom_id"))?,
        fields,
        member: member(raw)?,
        channel_id: channel(raw)?,
    })
}

pub fn pong_body() -> Value {
    json!({ "type": CALLBACK_PONG })
}

/// Interaction callback body for a handler response.
pub fn callback_body(response: &InteractionResponse) -> Value {
    match response {
        InteractionResponse::Message(message) => {
            json!({ "type": CALLBACK_CHANNEL_MESSAGE, "data": message })
        }
        InteractionResponse::Modal(modal) => json!({ "type": CALLBACK_MODAL, "data": modal }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use switchdesk_core::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};

    use super::{
        callback_body, parse_dispatch, parse_interaction, pong_body, InteractionRequest, WireError,
    };
    use crate::commands::OptionValue;
    use crate::embeds::{InteractionResponse, Modal, TextInput, TextInputStyle};
    use crate::events::{GatewayEvent, MemberJoinEvent};

    fn event(body: serde_json::Value) -> GatewayEvent {
        match parse_interaction(body.to_string().as_bytes()).expect("valid interaction") {
            InteractionRequest::Event(envelope) => envelope.event,
            InteractionRequest::Ping => panic!("unexpected ping"),
        }
    }

    #[test]
    fn ping_interactions_are_recognised() {
        let request = parse_interaction(br#"{"id":"1","type":1}"#).expect("ping parses");
        assert_eq!(request, InteractionRequest::Ping);
        assert_eq!(pong_body(), json!({"type": 1}));
    }

    #[test]
    fn slash_commands_carry_member_roles_and_typed_options() {
        let parsed = event(json!({
            "id": "900",
            "type": 2,
            "guild_id": "10",
            "channel_id": "20",
            "member": {"user": {"id": "30"}, "roles": ["40", "41"]},
            "data": {
                "name": "control",
                "options": [
                    {"name": "order_id", "type": 3, "value": "ORD-42"},
                    {"name": "designer", "type": 6, "value": "1001"}
                ]
            }
        }));

        let GatewayEvent::SlashCommand(invocation) = parsed else {
            panic!("expected a slash command");
        };
        assert_eq!(invocation.interaction_id, "900");
        assert_eq!(invocation.guild_id, Some(GuildId(10)));
        assert_eq!(invocation.channel_id, ChannelId(20));
        assert_eq!(invocation.member.user_id, UserId(30));
        assert!(invocation.member.has_role(RoleId(41)));
        assert_eq!(invocation.options["order_id"], OptionValue::Text("ORD-42".to_owned()));
        assert_eq!(invocation.options["designer"], OptionValue::User(UserId(1001)));
    }

    #[test]
    fn components_and_modals_map_to_their_events() {
        let click = event(json!({
            "id": "901",
            "type": 3,
            "channel_id": "20",
            "member": {"user": {"id": "30"}, "roles": []},
            "message": {"id": "77"},
            "data": {"custom_id": "review.rating.v1:abc", "component_type": 3, "values": ["4"]}
        }));
        let GatewayEvent::ComponentClick(click) = click else {
            panic!("expected a component click");
        };
        assert_eq!(click.values, vec!["4".to_owned()]);
        assert_eq!(click.message_id, Some(MessageId(77)));

        let submitted = event(json!({
            "id": "902",
            "type": 5,
            "channel_id": "20",
            "user": {"id": "30"},
            "data": {
                "custom_id": "qc.deny_reason.v1:abc",
                "components": [{
                    "type": 1,
                    "components": [{"type": 4, "custom_id": "reason", "value": "Colors clash"}]
                }]
            }
        }));
        let GatewayEvent::ModalSubmit(submitted) = submitted else {
            panic!("expected a modal submission");
        };
        assert_eq!(submitted.field("reason"), Some("Colors clash"));
        assert!(submitted.member.role_ids.is_empty());
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(matches!(parse_interaction(b"not json"), Err(WireError::Json(_))));
        assert_eq!(
            parse_interaction(br#"{"id":"1","type":3,"channel_id":"2","user":{"id":"3"}}"#),
            Err(WireError::MissingField("data"))
        );
        assert!(matches!(
            parse_interaction(
                br#"{"id":"1","type":2,"channel_id":"x","user":{"id":"3"},"data":{"name":"ping"}}"#
            ),
            Err(WireError::InvalidSnowflake { field: "channel_id", .. })
        ));
    }

    #[test]
    fn member_add_dispatches_become_join_events() {
        let frame = json!({
            "op": 0,
            "t": "GUILD_MEMBER_ADD",
            "s": 12,
            "d": {"guild_id": "10", "user": {"id": "55"}}
        });
        let envelope = parse_dispatch(frame.to_string().as_bytes()).expect("dispatch parses");
        assert_eq!(envelope.envelope_id, "GUILD_MEMBER_ADD#12");
        assert_eq!(
            envelope.event,
            GatewayEvent::MemberJoined(MemberJoinEvent {
                guild_id: GuildId(10),
                user_id: UserId(55)
            })
        );

        let other = json!({"op": 0, "t": "TYPING_START", "s": 13, "d": {}});
        let envelope = parse_dispatch(other.to_string().as_bytes()).expect("dispatch parses");
        assert!(matches!(envelope.event, GatewayEvent::Unsupported { .. }));
    }

    #[test]
    fn callbacks_wrap_messages_and_modals() {
        let notice = callback_body(&InteractionResponse::notice("✅ Done"));
        assert_eq!(notice["type"], 4);
        assert_eq!(notice["data"]["content"], "✅ Done");
        assert_eq!(notice["data"]["flags"], 64);

        let modal = Modal::new("qc.deny_reason.v1:abc", "Deny Quality Check Submission")
            .text_input(TextInput::new("reason", "Denial Reason", TextInputStyle::Paragraph));
        let body = callback_body(&InteractionResponse::Modal(modal));
        assert_eq!(body["type"], 9);
        assert_eq!(body["data"]["custom_id"], "qc.deny_reason.v1:abc");
        assert_eq!(body["data"]["components"][0]["components"][0]["style"], 2);
    }
}
