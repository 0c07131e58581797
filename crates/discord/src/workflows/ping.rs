use std::time::Duration;

use switchdesk_core::errors::WorkflowError;

use super::Workflows;

pub fn pong_message(latency: Duration) -> String {
    let millis = (latency.as_micros() + 500) / 1000;
    format!("🏓 Pong! Latency: {millis}ms")
}

impl Workflows {
    /// Round trip to the platform API.
    pub async fn ping_latency(&self) -> Result<Duration, WorkflowError> {
        Ok(self.ctx.platform.latency().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::pong_message;
    use crate::commands::CommandService;
    use crate::platform::{InMemoryPlatform, Operation, PlatformError};
    use crate::workflows::testing::{guild, invocation, plain_member, ALICE};
    use crate::workflows::{WorkflowContext, Workflows};

    #[test]
    fn latency_is_rounded_to_whole_milliseconds() {
        assert_eq!(pong_message(Duration::from_micros(41_600)), "🏓 Pong! Latency: 42ms");
        assert_eq!(pong_message(Duration::ZERO), "🏓 Pong! Latency: 0ms");
    }

    #[tokio::test]
    async fn ping_replies_privately_with_measured_latency() {
        let platform = Arc::new(
            InMemoryPlatform::for_guild(&guild()).with_latency(Duration::from_millis(87)),
        );
        let workflows = Workflows::new(WorkflowContext::new(platform.clone(), guild()));

        let response = workflows.ping(&invocation("ping", plain_member(ALICE), &[])).await;
        assert_eq!(response.content(), "🏓 Pong! Latency: 87ms");
        assert!(response.as_message().is_some_and(|message| message.is_ephemeral()));

        platform.fail(Operation::Latency, PlatformError::Transport("down".to_owned()));
        let response = workflows.ping(&invocation("ping", plain_member(ALICE), &[])).await;
        assert_eq!(
            response.content(),
            "❌ Something went wrong talking to Discord. Please try again."
        );
    }
}
