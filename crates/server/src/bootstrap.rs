use std::sync::Arc;

use switchdesk_core::config::{AppConfig, ConfigError};
use switchdesk_discord::gateway::{DiscordGateway, GatewayTransport};
use switchdesk_discord::platform::{Platform, PlatformError};
use switchdesk_discord::rest::RestPlatform;
use switchdesk_discord::workflows::{WorkflowContext, Workflows};
use switchdesk_discord::{EventDispatcher, GatewayRunner};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub platform: Arc<dyn Platform>,
    pub dispatcher: Arc<EventDispatcher>,
    pub gateway_runner: GatewayRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("discord client setup failed: {0}")]
    Platform(#[source] PlatformError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        guild_id = %config.guild.guild_id,
        "starting application bootstrap"
    );

    let rest = RestPlatform::new(&config.discord).map_err(BootstrapError::Platform)?;
    let transport: Arc<dyn GatewayTransport> =
        Arc::new(DiscordGateway::new(&config.discord, rest.clone()));
    let platform: Arc<dyn Platform> = Arc::new(rest);
    Ok(assemble(config, platform, transport))
}

/// Wires workflows, the dispatcher and the gateway session around an
/// already-built platform and transport.
pub fn assemble(
    config: AppConfig,
    platform: Arc<dyn Platform>,
    transport: Arc<dyn GatewayTransport>,
) -> Application {
    let workflows =
        Arc::new(Workflows::new(WorkflowContext::new(platform.clone(), config.guild.clone())));
    let dispatcher = Arc::new(workflows.dispatcher());
    let gateway_runner = GatewayRunner::new(transport, dispatcher.clone(), Default::default());
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        handlers = dispatcher.handler_count(),
        interactions_enabled = config.interactions_enabled(),
        gateway_url = %config.discord.gateway_url,
        "application assembled"
    );

    Application { config, platform, dispatcher, gateway_runner }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use switchdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use switchdesk_core::domain::ids::UserId;
    use switchdesk_discord::events::{GatewayEnvelope, GatewayEvent, MemberJoinEvent};
    use switchdesk_discord::gateway::{GatewayTransport, TransportError};
    use switchdesk_discord::platform::InMemoryPlatform;
    use switchdesk_discord::embeds::InteractionResponse;

    use crate::bootstrap::{assemble, bootstrap_with_config, Application, BootstrapError};

    /// Delivers one join, then closes.
    struct OneJoin(Mutex<Option<GatewayEnvelope>>);

    #[async_trait]
    impl GatewayTransport for OneJoin {
        async fn connect(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
            Ok(self.0.lock().expect("transport lock").take())
        }

        async fn respond(&self, _: &str, _: &InteractionResponse) -> Result<(), TransportError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?)
    }

    fn options(token: &str, public_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            config_path: Some("does-not-exist/switchdesk.toml".into()),
            overrides: ConfigOverrides {
                discord_token: Some(token.to_string()),
                discord_public_key: public_key.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn bootstrap_fails_fast_on_prefixed_token() {
        let message = match bootstrap(options("Bot abc", None)) {
            Ok(_) => panic!("prefixed token must be rejected"),
            Err(error) => error.to_string(),
        };
        assert!(message.contains("discord.token"));
    }

    #[test]
    fn bootstrap_fails_fast_on_malformed_public_key() {
        let message = match bootstrap(options("token", Some("not-hex"))) {
            Ok(_) => panic!("bad key must be rejected"),
            Err(error) => error.to_string(),
        };
        assert!(message.contains("discord.public_key"));
    }

    #[test]
    fn bootstrap_registers_every_handler() {
        let app = bootstrap(options("token", None)).expect("valid config");
        assert_eq!(app.dispatcher.handler_count(), 4);
        assert!(!app.config.interactions_enabled());
    }

    #[tokio::test]
    async fn assembled_gateway_runner_onboards_joining_members() {
        let config = AppConfig::default();
        let platform = Arc::new(InMemoryPlatform::for_guild(&config.guild));
        let join = GatewayEnvelope {
            envelope_id: "GUILD_MEMBER_ADD#1".to_owned(),
            event: GatewayEvent::MemberJoined(MemberJoinEvent {
                guild_id: config.guild.guild_id,
                user_id: UserId(4242),
            }),
        };
        let welcome = config.guild.channels.welcome;
        let member_role = config.guild.roles.member;

        let app = assemble(config, platform.clone(), Arc::new(OneJoin(Mutex::new(Some(join)))));
        app.gateway_runner.start().await.expect("runner never errors");

        assert_eq!(platform.role_grants(), vec![(UserId(4242), member_role)]);
        assert_eq!(platform.sent_to(welcome).len(), 1);
    }
}
