//! Discord interface for Switchdesk
//!
//! This crate turns Discord interactions into workflow calls and back:
//! - **Commands** (`commands`) - `/control`, `/loa`, `/review`, `/claim`, `/ping` plus the registration manifest
//! - **Events** (`events`) - slash commands, button/select clicks, modal submits, member joins
//! - **Embeds** (`embeds`) - message, embed, component and modal builders
//! - **Platform** (`platform`, `rest`) - the chat capabilities workflows need, in-memory and over HTTP
//! - **Gateway** (`gateway`) - websocket session delivering member joins, with reconnection logic
//! - **Wire** (`wire`) - interaction JSON in, callback JSON out
//!
//! # Architecture
//!
//! ```text
//! Interaction → EventDispatcher → Workflows → Platform (REST)
//!                    ↓
//!          InteractionResponse ← embeds / modals
//! ```
//!
//! # Key Types
//!
//! - `Workflows` - quality control, leave, review, claim and onboarding logic
//! - `EventDispatcher` - routes events to the command/component/modal/member services
//! - `GatewayRunner` - transport loop with exponential reconnect backoff
//! - `DiscordGateway` - identify, heartbeat and dispatch over tokio-tungstenite
//! - `RestPlatform` - Discord API v10 client

pub mod commands;
pub mod embeds;
pub mod events;
pub mod gateway;
pub mod platform;
pub mod rest;
pub mod wire;
pub mod workflows;

pub use events::EventDispatcher;
pub use gateway::{DiscordGateway, GatewayRunner};
pub use platform::{InMemoryPlatform, Platform, PlatformError};
pub use rest::RestPlatform;
pub use workflows::{WorkflowContext, Workflows};
