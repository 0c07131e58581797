//! Long-lived gateway session feeding events into the dispatcher.
//!
//! [`GatewayTransport`] is the seam between the pump and the socket:
//! [`DiscordGateway`] speaks the real websocket protocol, tests script their
//! own transport. [`GatewayRunner`] owns reconnection.

pub mod discord;
pub mod protocol;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::embeds::InteractionResponse;
use crate::events::{EventContext, EventDispatcher, GatewayEnvelope, HandlerResult};

pub use self::discord::DiscordGateway;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway connect failed: {0}")]
    Connect(String),
    #[error("gateway connection dropped: {0}")]
    Receive(String),
    #[error("interaction callback failed: {0}")]
    Respond(String),
    #[error("gateway close failed: {0}")]
    Disconnect(String),
    /// Discord refused the session in a way retrying cannot fix.
    #[error("gateway refused the session: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// Exponential backoff between reconnect attempts. `max_retries` bounds
/// consecutive failures; a session that connected resets the count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn delay_after(&self, failures: u32) -> Duration {
        let factor = 2_u64.saturating_pow(failures.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the transport closed on purpose and the pump stops.
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn respond(
        &self,
        envelope_id: &str,
        response: &InteractionResponse,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

enum SessionEnd {
    Closed,
    Dropped(TransportError),
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: Arc<EventDispatcher>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    /// Runs sessions until the transport closes, refuses the session, or
    /// fails to connect more than `max_retries` times in a row. Never returns
    /// an error so the HTTP side keeps serving.
    pub async fn start(&self) -> Result<()> {
        let mut failures = 0_u32;
        loop {
            let problem = match self.run_session().await {
                Ok(SessionEnd::Closed) => return Ok(()),
                Ok(SessionEnd::Dropped(problem)) => {
                    failures = 0;
                    problem
                }
                Err(problem) => {
                    failures += 1;
                    problem
                }
            };

            if problem.is_fatal() {
                error!(
                    event_name = "ingress.gateway.refused",
                    error = %problem,
                    "gateway session refused; member onboarding is offline"
                );
                return Ok(());
            }
            if failures > self.reconnect_policy.max_retries {
                warn!(
                    event_name = "ingress.gateway.gave_up",
                    failures,
                    error = %problem,
                    "gateway retries exhausted; continuing without a gateway session"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.delay_after(failures.max(1));
            warn!(
                event_name = "ingress.gateway.reconnecting",
                failures,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %problem,
                "gateway session lost; reconnecting"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn run_session(&self) -> Result<SessionEnd, TransportError> {
        self.transport.connect().await?;
        info!(event_name = "ingress.gateway.connected", "gateway session established");

        loop {
            match self.transport.next_envelope().await {
                Ok(Some(envelope)) => self.deliver(envelope).await,
                Ok(None) => {
                    info!(event_name = "ingress.gateway.closed", "gateway session closed");
                    self.transport.disconnect().await?;
                    return Ok(SessionEnd::Closed);
                }
                Err(problem) => return Ok(SessionEnd::Dropped(problem)),
            }
        }
    }

    async fn deliver(&self, envelope: GatewayEnvelope) {
        let correlation_id = envelope.envelope_id.as_str();
        debug!(
            event_name = "ingress.gateway.envelope_received",
            correlation_id,
            event_type = ?envelope.event.event_type(),
            user_id = envelope.event.user_id().map(|user| user.get()).unwrap_or_default(),
            "gateway event received"
        );

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        let response = match self.dispatcher.dispatch(&envelope, &context).await {
            Ok(HandlerResult::Responded(response)) => response,
            Ok(HandlerResult::Processed | HandlerResult::Ignored) => return,
            Err(problem) => {
                warn!(
                    event_name = "ingress.gateway.dispatch_failed",
                    correlation_id,
                    error = %problem,
                    "gateway event could not be handled"
                );
                return;
            }
        };

        match self.transport.respond(correlation_id, &response).await {
            Ok(()) => debug!(
                event_name = "ingress.gateway.response_sent",
                correlation_id,
                "interaction answered"
            ),
            Err(problem) => warn!(
                event_name = "ingress.gateway.response_failed",
                correlation_id,
                error = %problem,
                "interaction answer was not delivered"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::commands::OptionValue;
    use crate::embeds::InteractionResponse;
    use crate::events::{EventDispatcher, GatewayEnvelope, GatewayEvent};
    use crate::workflows::testing::{fixture, invocation, plain_member, ALICE};

    type Step = Result<Option<GatewayEnvelope>, TransportError>;

    #[derive(Default)]
    struct ScriptedTransport {
        connects: Mutex<VecDeque<Result<(), TransportError>>>,
        steps: Mutex<VecDeque<Step>>,
        log: Mutex<Vec<String>>,
        answered: Mutex<Vec<(String, InteractionResponse)>>,
    }

    impl ScriptedTransport {
        fn new(connects: Vec<Result<(), TransportError>>, steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                connects: Mutex::new(connects.into()),
                steps: Mutex::new(steps.into()),
                ..Self::default()
            })
        }

        async fn log(&self) -> Vec<String> {
            self.log.lock().await.clone()
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            self.log.lock().await.push("connect".to_owned());
            self.connects.lock().await.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Step {
            self.steps.lock().await.pop_front().unwrap_or(Ok(None))
        }

        async fn respond(
            &self,
            envelope_id: &str,
            response: &InteractionResponse,
        ) -> Result<(), TransportError> {
            self.answered.lock().await.push((envelope_id.to_owned(), response.clone()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            self.log.lock().await.push("disconnect".to_owned());
            Ok(())
        }
    }

    fn immediate(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn runner(transport: Arc<ScriptedTransport>, max_retries: u32) -> GatewayRunner {
        GatewayRunner::new(transport, Arc::new(EventDispatcher::default()), immediate(max_retries))
    }

    fn typing(id: &str) -> Step {
        Ok(Some(GatewayEnvelope {
            envelope_id: id.to_owned(),
            event: GatewayEvent::Unsupported { event_type: "TYPING_START".to_owned() },
        }))
    }

    #[tokio::test]
    async fn connect_failures_are_retried_until_a_session_opens() {
        let transport = ScriptedTransport::new(
            vec![Err(TransportError::Connect("dns".to_owned())), Ok(())],
            vec![typing("TYPING_START#1"), Ok(None)],
        );

        runner(transport.clone(), 2).start().await.expect("runner never errors");
        assert_eq!(transport.log().await, vec!["connect", "connect", "disconnect"]);
    }

    #[tokio::test]
    async fn consecutive_connect_failures_give_up_after_max_retries() {
        let refused = || Err(TransportError::Connect("refused".to_owned()));
        let transport = ScriptedTransport::new(vec![refused(), refused(), refused()], vec![]);

        runner(transport.clone(), 2).start().await.expect("runner never errors");
        assert_eq!(transport.log().await.len(), 3);
    }

    #[tokio::test]
    async fn a_dropped_session_resets_the_failure_budget() {
        let refused = || Err(TransportError::Connect("refused".to_owned()));
        let transport = ScriptedTransport::new(
            vec![Ok(()), refused(), Ok(())],
            vec![typing("TYPING_START#1"), Err(TransportError::Receive("reset".to_owned()))],
        );

        runner(transport.clone(), 1).start().await.expect("runner never errors");
        assert_eq!(transport.log().await, vec!["connect", "connect", "connect", "disconnect"]);
    }

    #[tokio::test]
    async fn refused_sessions_are_not_retried() {
        let transport = ScriptedTransport::new(
            vec![Ok(())],
            vec![Err(TransportError::Fatal("4014 disallowed intents".to_owned()))],
        );

        runner(transport.clone(), 5).start().await.expect("runner never errors");
        assert_eq!(transport.log().await, vec!["connect"]);
    }

    #[tokio::test]
    async fn interaction_answers_go_back_through_the_transport() {
        let (_, workflows) = fixture();
        let ping = invocation("ping", plain_member(ALICE), &[]);
        let unknown = invocation(
            "dance",
            plain_member(ALICE),
            &[("style", OptionValue::Text("x".to_owned()))],
        );
        let transport = ScriptedTransport::new(
            vec![],
            vec![
                Ok(Some(GatewayEnvelope {
                    envelope_id: "901".to_owned(),
                    event: GatewayEvent::SlashCommand(unknown),
                })),
                Ok(Some(GatewayEnvelope {
                    envelope_id: "902".to_owned(),
                    event: GatewayEvent::SlashCommand(ping),
                })),
                Ok(None),
            ],
        );

        GatewayRunner::new(transport.clone(), Arc::new(workflows.dispatcher()), immediate(0))
            .start()
            .await
            .expect("runner completes");

        let answered = transport.answered.lock().await.clone();
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].0, "902");
        assert!(answered[0].1.content().starts_with("🏓 Pong!"));
    }

    #[test]
    fn delays_double_from_the_base_up_to_the_cap() {
        let policy = ReconnectPolicy::default();
        let delays =
            [1, 2, 3, 6, 30].map(|failures| policy.delay_after(failures).as_millis() as u64);
        assert_eq!(delays, [250, 500, 1_000, 5_000, 5_000]);
    }
}
