//! Domain types, configuration and the role gate shared by every Switchdesk
//! crate. Nothing in here talks to the network.

pub mod config;
pub mod domain;
pub mod errors;
pub mod gate;

pub use config::{AppConfig, ChannelConfig, ConfigError, GuildConfig, LoadOptions, RoleConfig};
pub use domain::decision::{
    DecisionCell, DecisionKind, DecisionOutcome, DecisionState, SideEffectStatus, TransitionReport,
};
pub use domain::ids::{ChannelId, EmojiId, GuildId, Member, MessageId, RoleId, UserId};
pub use errors::{GatedAction, Resource, ValidationError, WorkflowError};
