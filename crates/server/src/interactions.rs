//! Signed `POST /interactions` endpoint.
//!
//! Discord signs `timestamp || body` with the application's Ed25519 key. The
//! signature is checked against the raw bytes before any JSON is parsed.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use ed25519_dalek::{Signature, VerifyingKey};
use serde::Serialize;
use serde_json::Value;
use switchdesk_discord::events::{EventContext, EventDispatcher, HandlerResult};
use switchdesk_discord::wire::{callback_body, parse_interaction, pong_body, InteractionRequest};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Clone)]
pub struct InteractionsState {
    verifying_key: VerifyingKey,
    dispatcher: Arc<EventDispatcher>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InteractionError {
    pub error: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublicKeyError {
    #[error("public key is not valid hex")]
    Hex,
    #[error("public key must be 32 bytes, got {0}")]
    Length(usize),
    #[error("public key is not a valid ed25519 point")]
    Point,
}

type Rejection = (StatusCode, Json<InteractionError>);

pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey, PublicKeyError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|_| PublicKeyError::Hex)?;
    let bytes: [u8; 32] =
        bytes.as_slice().try_into().map_err(|_| PublicKeyError::Length(bytes.len()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| PublicKeyError::Point)
}

pub fn router(verifying_key: VerifyingKey, dispatcher: Arc<EventDispatcher>) -> Router {
    Router::new()
        .route("/interactions", post(interactions))
        .with_state(InteractionsState { verifying_key, dispatcher })
}

fn reject(status: StatusCode, error: impl Into<String>) -> Rejection {
    (status, Json(InteractionError { error: error.into() }))
}

fn verify_signature(
    key: &VerifyingKey,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), Rejection> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let signature_hex = header(SIGNATURE_HEADER);
    let timestamp = header(TIMESTAMP_HEADER);
    let (Some(signature_hex), Some(timestamp)) = (signature_hex, timestamp) else {
        return Err(reject(StatusCode::UNAUTHORIZED, "missing signature headers"));
    };

    let signature = hex::decode(signature_hex)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
        .ok_or_else(|| reject(StatusCode::UNAUTHORIZED, "malformed signature"))?;

    let mut message = Vec::with_capacity(timestamp.len() + body.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(body);
    key.verify_strict(&message, &signature)
        .map_err(|_| reject(StatusCode::UNAUTHORIZED, "invalid request signature"))
}

pub async fn interactions(
    State(state): State<InteractionsState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    if let Err(rejection) = verify_signature(&state.verifying_key, &headers, &body) {
        warn!(
            event_name = "ingress.interactions.signature_rejected",
            error = %rejection.1.error,
            "rejected interaction request"
        );
        return Err(rejection);
    }

    let envelope = match parse_interaction(&body) {
        Ok(InteractionRequest::Ping) => {
            debug!(event_name = "ingress.interactions.ping", "answering interaction ping");
            return Ok((StatusCode::OK, Json(pong_body())));
        }
        Ok(InteractionRequest::Event(envelope)) => envelope,
        Err(error) => {
            warn!(
                event_name = "ingress.interactions.malformed",
                error = %error,
                "could not parse interaction body"
            );
            return Err(reject(StatusCode::BAD_REQUEST, error.to_string()));
        }
    };

    info!(
        event_name = "ingress.interactions.received",
        correlation_id = %envelope.envelope_id,
        event_type = ?envelope.event.event_type(),
        user_id = envelope.event.user_id().map(|user| user.get()).unwrap_or_default(),
        "received interaction"
    );

    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    match state.dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(response)) => {
            Ok((StatusCode::OK, Json(callback_body(&response))))
        }
        Ok(HandlerResult::Processed) => Ok((StatusCode::ACCEPTED, Json(Value::Null))),
        Ok(HandlerResult::Ignored) => {
            Err(reject(StatusCode::BAD_REQUEST, "unsupported interaction type"))
        }
        Err(error) => {
            warn!(
                event_name = "ingress.interactions.dispatch_failed",
                correlation_id = %envelope.envelope_id,
                error = %error,
                "interaction dispatch failed"
            );
            Err(reject(StatusCode::BAD_REQUEST, error.to_string()))
        }
    }
}
