//! Websocket session against Discord's gateway.
//!
//! `connect` waits for HELLO, identifies with [`DEFAULT_INTENTS`] and starts a
//! heartbeat task. `next_envelope` tracks the sequence number, answers
//! heartbeat requests and yields dispatches as envelopes. Interactions that
//! arrive here are answered through the REST callback endpoint.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::Value;
use switchdesk_core::config::DiscordConfig;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::protocol::{self, CallbackTarget, Frame, DEFAULT_INTENTS, READY};
use super::{GatewayTransport, TransportError};
use crate::embeds::InteractionResponse;
use crate::events::GatewayEnvelope;
use crate::rest::RestPlatform;
use crate::wire::{callback_body, parse_dispatch};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = Arc<Mutex<SplitSink<Socket, Message>>>;

const HELLO_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_HEARTBEAT: Duration = Duration::from_secs(1);

/// Gateway interactions must be answered within three seconds, so only the
/// newest tokens are worth keeping.
const PENDING_CALLBACKS: usize = 64;

struct Heartbeat {
    sequence: Option<u64>,
    acknowledged: bool,
}

struct Connection {
    reader: SplitStream<Socket>,
    writer: Writer,
    heartbeat: Arc<StdMutex<Heartbeat>>,
    pulse: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.pulse.abort();
    }
}

pub struct DiscordGateway {
    url: String,
    token: SecretString,
    intents: u64,
    callbacks: RestPlatform,
    connection: Mutex<Option<Connection>>,
    pending: StdMutex<VecDeque<CallbackTarget>>,
}

impl DiscordGateway {
    pub fn new(config: &DiscordConfig, callbacks: RestPlatform) -> Self {
        Self {
            url: config.gateway_url.clone(),
            token: config.token.clone(),
            intents: DEFAULT_INTENTS,
            callbacks,
            connection: Mutex::new(None),
            pending: StdMutex::new(VecDeque::new()),
        }
    }

    pub fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    fn remember(&self, target: CallbackTarget) {
        let mut pending = lock(&self.pending);
        if pending.len() >= PENDING_CALLBACKS {
            pending.pop_front();
        }
        pending.push_back(target);
    }

    fn take_callback(&self, interaction_id: &str) -> Option<CallbackTarget> {
        let mut pending = lock(&self.pending);
        let index = pending.iter().position(|target| target.interaction_id == interaction_id)?;
        pending.remove(index)
    }
}

#[async_trait]
impl GatewayTransport for DiscordGateway {
    async fn connect(&self) -> Result<(), TransportError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (sink, mut reader) = socket.split();
        let writer: Writer = Arc::new(Mutex::new(sink));

        let interval = tokio::time::timeout(HELLO_TIMEOUT, await_hello(&mut reader))
            .await
            .map_err(|_| TransportError::Connect("no HELLO from the gateway".to_owned()))??
            .max(MIN_HEARTBEAT);
        send(&writer, &protocol::identify(&self.token, self.intents))
            .await
            .map_err(TransportError::Connect)?;

        let heartbeat = Arc::new(StdMutex::new(Heartbeat { sequence: None, acknowledged: true }));
        let pulse = tokio::spawn(pulse(writer.clone(), heartbeat.clone(), interval));
        *self.connection.lock().await = Some(Connection { reader, writer, heartbeat, pulse });

        info!(
            event_name = "ingress.gateway.identified",
            intents = self.intents,
            heartbeat_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "identified with the gateway"
        );
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        let mut guard = self.connection.lock().await;
        let Some(connection) = guard.as_mut() else {
            return Ok(None);
        };

        loop {
            let text = match connection.reader.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Close(frame))) => return Err(closed(frame)),
                Some(Ok(_)) => continue,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Receive("gateway stream ended".to_owned())),
            };
            let frame = match protocol::decode_frame(&text) {
                Ok(frame) => frame,
                Err(error) => {
                    warn!(event_name = "ingress.gateway.bad_frame", error = %error, "frame skipped");
                    continue;
                }
            };

            match frame {
                Frame::Dispatch { sequence, event_type, callback } => {
                    if sequence.is_some() {
                        lock(&connection.heartbeat).sequence = sequence;
                    }
                    if event_type == READY {
                        info!(event_name = "ingress.gateway.ready", "gateway session ready");
                        continue;
                    }
                    if let Some(target) = callback {
                        self.remember(target);
                    }
                    match parse_dispatch(text.as_bytes()) {
                        Ok(envelope) => return Ok(Some(envelope)),
                        Err(error) => warn!(
                            event_name = "ingress.gateway.bad_dispatch",
                            event_type = %event_type,
                            error = %error,
                            "dispatch skipped"
                        ),
                    }
                }
                Frame::HeartbeatRequest => {
                    let sequence = lock(&connection.heartbeat).sequence;
                    send(&connection.writer, &protocol::heartbeat(sequence))
                        .await
                        .map_err(TransportError::Receive)?;
                }
                Frame::HeartbeatAck => {
                    lock(&connection.heartbeat).acknowledged = true;
                }
                Frame::Reconnect => {
                    return Err(TransportError::Receive("gateway asked for a reconnect".to_owned()))
                }
                Frame::InvalidSession => {
                    return Err(TransportError::Receive("gateway invalidated the session".to_owned()))
                }
                Frame::Hello { .. } | Frame::Other(_) => {}
            }
        }
    }

    async fn respond(
        &self,
        envelope_id: &str,
        response: &InteractionResponse,
    ) -> Result<(), TransportError> {
        let target = self.take_callback(envelope_id).ok_or_else(|| {
            TransportError::Respond(format!("no interaction token for {envelope_id}"))
        })?;
        self.callbacks
            .interaction_callback(&target.interaction_id, &target.token, &callback_body(response))
            .await
            .map_err(|error| TransportError::Respond(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(connection) = self.connection.lock().await.take() else {
            return Ok(());
        };
        let mut writer = connection.writer.lock().await;
        writer
            .send(Message::Close(None))
            .await
            .map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}

async fn await_hello(reader: &mut SplitStream<Socket>) -> Result<Duration, TransportError> {
    while let Some(message) = reader.next().await {
        let message = message.map_err(|error| TransportError::Connect(error.to_string()))?;
        match message {
            Message::Text(text) => {
                if let Ok(Frame::Hello { heartbeat_interval }) = protocol::decode_frame(&text) {
                    return Ok(heartbeat_interval);
                }
            }
            Message::Close(frame) => return Err(closed(frame)),
            _ => {}
        }
    }
    Err(TransportError::Connect("gateway closed before HELLO".to_owned()))
}

/// Sends a heartbeat every interval. A heartbeat still unacknowledged when
/// the next one is due means the connection is dead, so the socket is closed
/// and the reader sees the drop.
async fn pulse(writer: Writer, heartbeat: Arc<StdMutex<Heartbeat>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let due = {
            let mut state = lock(&heartbeat);
            let alive = state.acknowledged;
            state.acknowledged = false;
            alive.then_some(state.sequence)
        };
        let Some(sequence) = due else {
            warn!(event_name = "ingress.gateway.zombied", "heartbeat not acknowledged");
            let _ = writer.lock().await.send(Message::Close(None)).await;
            return;
        };
        if let Err(error) = send(&writer, &protocol::heartbeat(sequence)).await {
            debug!(event_name = "ingress.gateway.heartbeat_failed", error = %error, "pulse stopped");
            return;
        }
    }
}

async fn send(writer: &Writer, payload: &Value) -> Result<(), String> {
    writer
        .lock()
        .await
        .send(Message::Text(payload.to_string()))
        .await
        .map_err(|error| error.to_string())
}

fn closed(frame: Option<CloseFrame<'_>>) -> TransportError {
    let Some(frame) = frame else {
        return TransportError::Receive("gateway closed without a code".to_owned());
    };
    let code = u16::from(frame.code);
    let detail = format!("close {code}: {}", frame.reason);
    if protocol::is_fatal_close(code) {
        TransportError::Fatal(detail)
    } else {
        TransportError::Receive(detail)
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use switchdesk_core::config::{AppConfig, DiscordConfig};
    use switchdesk_core::domain::ids::{GuildId, UserId};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::Message;

    use super::DiscordGateway;
    use crate::embeds::InteractionResponse;
    use crate::events::{GatewayEvent, MemberJoinEvent};
    use crate::gateway::{GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::rest::RestPlatform;
    use crate::workflows::testing::{fixture, guild, ALICE};

    struct Session {
        identify: Value,
        replies: Vec<Value>,
    }

    fn text(value: Value) -> Message {
        Message::Text(value.to_string())
    }

    fn close(code: u16, reason: &'static str) -> Message {
        Message::Close(Some(CloseFrame { code: CloseCode::from(code), reason: reason.into() }))
    }

    fn member_add(sequence: u64, guild_id: u64, user_id: u64) -> Message {
        text(json!({
            "op": 0,
            "s": sequence,
            "t": "GUILD_MEMBER_ADD",
            "d": {"guild_id": guild_id.to_string(), "user": {"id": user_id.to_string()}}
        }))
    }

    /// Local gateway: sends HELLO, reads IDENTIFY, plays `script`, then
    /// collects `replies` text frames from the client.
    async fn gateway_server(script: Vec<Message>, replies: usize) -> (String, JoinHandle<Session>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local address");
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut socket = accept_async(stream).await.expect("websocket handshake");
            socket
                .send(text(json!({"op": 10, "d": {"heartbeat_interval": 45_000}})))
                .await
                .expect("hello");

            let mut received = Vec::new();
            while received.len() < replies + 1 {
                match socket.next().await {
                    Some(Ok(Message::Text(body))) => {
                        received.push(serde_json::from_str::<Value>(&body).expect("json frame"));
                        if received.len() == 1 {
                            for message in script.clone() {
                                socket.send(message).await.expect("scripted frame");
                            }
                        }
                    }
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
            let identify = received.remove(0);
            Session { identify, replies: received }
        });
        (format!("ws://{address}"), handle)
    }

    fn gateway(url: String) -> DiscordGateway {
        let mut config: DiscordConfig = AppConfig::default().discord;
        config.token = "MTIz.abc.def".to_owned().into();
        config.gateway_url = url;
        let rest = RestPlatform::new(&config).expect("http client");
        DiscordGateway::new(&config, rest)
    }

    #[tokio::test]
    async fn identifies_and_yields_member_joins() {
        let (url, server) = gateway_server(
            vec![
                text(json!({"op": 11})),
                text(json!({"op": 0, "s": 1, "t": "READY", "d": {}})),
                member_add(2, 10, 55),
                close(4014, "Disallowed intent(s)."),
            ],
            0,
        )
        .await;
        let gateway = gateway(url);

        gateway.connect().await.expect("session opens");
        let envelope = gateway.next_envelope().await.expect("frame").expect("an event");
        assert_eq!(envelope.envelope_id, "GUILD_MEMBER_ADD#2");
        assert_eq!(
            envelope.event,
            GatewayEvent::MemberJoined(MemberJoinEvent { guild_id: GuildId(10), user_id: UserId(55) })
        );
        let refused = gateway.next_envelope().await.expect_err("server closed with 4014");
        assert!(refused.is_fatal(), "{refused}");

        let session = server.await.expect("server task");
        assert_eq!(session.identify["op"], 2);
        assert_eq!(session.identify["d"]["token"], "MTIz.abc.def");
        assert_eq!(session.identify["d"]["intents"], 3);
    }

    #[tokio::test]
    async fn heartbeat_requests_are_answered_and_reconnects_drop_the_session() {
        let (url, server) = gateway_server(
            vec![
                text(json!({"op": 0, "s": 5, "t": "TYPING_START", "d": {}})),
                text(json!({"op": 1, "d": null})),
                text(json!({"op": 7, "d": null})),
            ],
            1,
        )
        .await;
        let gateway = gateway(url);

        gateway.connect().await.expect("session opens");
        let typing = gateway.next_envelope().await.expect("frame").expect("an event");
        assert!(matches!(typing.event, GatewayEvent::Unsupported { .. }));
        let dropped = gateway.next_envelope().await.expect_err("reconnect requested");
        assert!(matches!(dropped, TransportError::Receive(_)));
        assert!(!dropped.is_fatal());

        let session = server.await.expect("server task");
        assert_eq!(session.replies, vec![json!({"op": 1, "d": 5})]);
    }

    #[tokio::test]
    async fn gateway_interactions_without_a_token_cannot_be_answered() {
        let gateway = gateway("ws://127.0.0.1:9".to_owned());
        let error = gateway
            .respond("900", &InteractionResponse::notice("✅ Done"))
            .await
            .expect_err("no token was recorded");
        assert_eq!(error, TransportError::Respond("no interaction token for 900".to_owned()));
        assert_eq!(gateway.next_envelope().await, Ok(None));
    }

    #[tokio::test]
    async fn members_joining_the_guild_are_welcomed_end_to_end() {
        let home = guild().guild_id.get();
        let (url, server) = gateway_server(
            vec![
                member_add(1, 42, 77),
                member_add(2, home, ALICE.get()),
                close(4004, "Authentication failed."),
            ],
            0,
        )
        .await;
        let (platform, workflows) = fixture();

        GatewayRunner::new(
            Arc::new(gateway(url)),
            Arc::new(workflows.dispatcher()),
            ReconnectPolicy { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 },
        )
        .start()
        .await
        .expect("runner never errors");

        assert_eq!(platform.role_grants(), vec![(ALICE, guild().roles.member)]);
        assert_eq!(platform.sent_to(guild().channels.welcome).len(), 1);
        server.await.expect("server task");
    }
}
