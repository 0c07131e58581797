use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

pub mod colors {
    pub const BLUE: u32 = 0x3498db;
    pub const ORANGE: u32 = 0xe67e22;
    pub const GREEN: u32 = 0x2ecc71;
    pub const RED: u32 = 0xe74c3c;
    pub const GOLD: u32 = 0xf1c40f;
}

/// Message flag hiding a response from everyone but the invoking user.
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// Client-rendered full date/time marker.
pub fn timestamp(at: DateTime<Utc>) -> String {
    format!("<t:{}:F>", at.timestamp())
}

macro_rules! integer_enum {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn code(self) -> u8 {
                match self {
                    $(Self::$variant => $value),+
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_u8(self.code())
            }
        }
    };
}

integer_enum!(ComponentKind { ActionRow = 1, Button = 2, StringSelect = 3, TextInput = 4 });
integer_enum!(ButtonStyle { Primary = 1, Secondary = 2, Success = 3, Danger = 4 });
integer_enum!(TextInputStyle { Short = 1, Paragraph = 2 });

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedMedia {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedMedia>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|field| field.name == name).map(|field| field.value.as_str())
    }

    pub fn footer_text(&self) -> Option<&str> {
        self.footer.as_ref().map(|footer| footer.text.as_str())
    }

    pub fn with_footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }
}

pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            embed: Embed {
                title: title.into(),
                color,
                fields: Vec::new(),
                image: None,
                thumbnail: None,
                footer: None,
            },
        }
    }

    pub fn field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push_field(name.into(), value.into(), false)
    }

    pub fn inline_field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.push_field(name.into(), value.into(), true)
    }

    pub fn image(&mut self, url: impl Into<String>) -> &mut Self {
        self.embed.image = Some(EmbedMedia { url: url.into() });
        self
    }

    pub fn thumbnail(&mut self, url: impl Into<String>) -> &mut Self {
        self.embed.thumbnail = Some(EmbedMedia { url: url.into() });
        self
    }

    pub fn footer(&mut self, text: impl Into<String>) -> &mut Self {
        self.embed.footer = Some(EmbedFooter { text: text.into() });
        self
    }

    pub fn build(self) -> Embed {
        self.embed
    }

    fn push_field(&mut self, name: String, value: String, inline: bool) -> &mut Self {
        self.embed.fields.push(EmbedField { name, value, inline });
        self
    }
}

/// Shorthand for building an embed inside a single closure.
pub fn embed<F>(title: impl Into<String>, color: u32, build: F) -> Embed
where
    F: FnOnce(&mut EmbedBuilder),
{
    let mut builder = EmbedBuilder::new(title, color);
    build(&mut builder);
    builder.build()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub style: ButtonStyle,
    pub label: String,
    pub custom_id: String,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, style: ButtonStyle) -> Self {
        Self { kind: ComponentKind::Button, style, label: label.into(), custom_id: custom_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartialEmoji {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<PartialEmoji>,
}

impl SelectOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self { label: label.into(), value: value.into(), emoji: None }
    }

    pub fn emoji(mut self, name: impl Into<String>) -> Self {
        self.emoji = Some(PartialEmoji { name: name.into() });
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectMenu {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub custom_id: String,
    pub placeholder: String,
    pub min_values: u8,
    pub max_values: u8,
    pub options: Vec<SelectOption>,
}

impl SelectMenu {
    pub fn single(
        custom_id: impl Into<String>,
        placeholder: impl Into<String>,
        options: Vec<SelectOption>,
    ) -> Self {
        Self {
            kind: ComponentKind::StringSelect,
            custom_id: custom_id.into(),
            placeholder: placeholder.into(),
            min_values: 1,
            max_values: 1,
            options,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextInput {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub custom_id: String,
    pub style: TextInputStyle,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    pub required: bool,
}

impl TextInput {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>, style: TextInputStyle) -> Self {
        Self {
            kind: ComponentKind::TextInput,
            custom_id: custom_id.into(),
            style,
            label: label.into(),
            placeholder: None,
            max_length: None,
            required: true,
        }
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Component {
    Button(Button),
    Select(SelectMenu),
    TextInput(TextInput),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub components: Vec<Component>,
}

impl ActionRow {
    pub fn new(components: Vec<Component>) -> Self {
        Self { kind: ComponentKind::ActionRow, components }
    }
}

#[derive(Default)]
pub struct ActionRowBuilder {
    components: Vec<Component>,
}

impl ActionRowBuilder {
    pub fn button(&mut self, button: Button) -> &mut Self {
        self.components.push(Component::Button(button));
        self
    }

    pub fn select(&mut self, select: SelectMenu) -> &mut Self {
        self.components.push(Component::Select(select));
        self
    }

    fn build(self) -> ActionRow {
        ActionRow::new(self.components)
    }
}

/// Body of a posted, edited or interaction-response message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl MessagePayload {
    pub fn is_ephemeral(&self) -> bool {
        self.flags.is_some_and(|flags| flags & EPHEMERAL_FLAG != 0)
    }

    pub fn custom_ids(&self) -> Vec<&str> {
        self.components
            .iter()
            .flat_map(|row| row.components.iter())
            .map(|component| match component {
                Component::Button(button) => button.custom_id.as_str(),
                Component::Select(select) => select.custom_id.as_str(),
                Component::TextInput(input) => input.custom_id.as_str(),
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    payload: MessagePayload,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.payload.content = Some(content.into());
        self
    }

    pub fn embed<F>(self, title: impl Into<String>, color: u32, build: F) -> Self
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        self.push_embed(embed(title, color, build))
    }

    pub fn push_embed(mut self, embed: Embed) -> Self {
        self.payload.embeds.push(embed);
        self
    }

    pub fn action_row<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ActionRowBuilder),
    {
        let mut builder = ActionRowBuilder::default();
        build(&mut builder);
        self.payload.components.push(builder.build());
        self
    }

    pub fn ephemeral(mut self) -> Self {
        self.payload.flags = Some(EPHEMERAL_FLAG);
        self
    }

    pub fn build(self) -> MessagePayload {
        self.payload
    }
}

/// Private one-line notice to the invoking user.
pub fn ephemeral_notice(text: impl Into<String>) -> MessagePayload {
    MessageBuilder::new().content(text).ephemeral().build()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub components: Vec<ActionRow>,
}

impl Modal {
    pub fn new(custom_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self { custom_id: custom_id.into(), title: title.into(), components: Vec::new() }
    }

    /// Each text input sits alone in its own row.
    pub fn text_input(mut self, input: TextInput) -> Self {
        self.components.push(ActionRow::new(vec![Component::TextInput(input)]));
        self
    }
}

/// What an interaction is answered with: a message or a form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InteractionResponse {
    Message(MessagePayload),
    Modal(Modal),
}

impl InteractionResponse {
    pub fn notice(text: impl Into<String>) -> Self {
        Self::Message(ephemeral_notice(text))
    }

    pub fn as_message(&self) -> Option<&MessagePayload> {
        match self {
            Self::Message(message) => Some(message),
            Self::Modal(_) => None,
        }
    }

    pub fn as_modal(&self) -> Option<&Modal> {
        match self {
            Self::Modal(modal) => Some(modal),
            Self::Message(_) => None,
        }
    }

    /// Text content of a message response, empty for forms.
    pub fn content(&self) -> &str {
        self.as_message().and_then(|message| message.content.as_deref()).unwrap_or_default()
    }
}
