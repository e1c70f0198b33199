#![forbid(unsafe_code)]

//! Home Assistant websocket plumbing.
//!
//! Two independent connections: [`HassClient`] is the command half the
//! dispatcher owns (service calls, initial state snapshot), and
//! [`HassEventFeed`] holds its own subscription socket so a slow command
//! never stalls inbound state events.

use hassdeck_core::event::RuntimeEvent;
use hassdeck_core::resolve::ServiceCall;
use hassdeck_core::state::{EntityState, StateCache};
use hassdeck_runtime::{Feed, RemoteClient, RemoteError, StopSignal};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::mpsc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

#[derive(Debug, Error)]
pub enum HassError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("authentication rejected: {0}")]
    AuthRejected(String),
    #[error("unexpected frame during {phase}: {frame}")]
    Protocol { phase: &'static str, frame: String },
    #[error("transport: {0}")]
    Transport(#[from] tungstenite::Error),
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Command connection to the server.
pub struct HassClient {
    socket: Socket,
    next_id: u64,
}

impl HassClient {
    /// Connect and run the auth handshake.
    pub fn connect(scheme: &str, host: &str, token: &str) -> Result<Self, HassError> {
        let socket = open_socket(scheme, host, token)?;
        info!(host, "command connection established");
        Ok(Self { socket, next_id: 1 })
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Fetch the full entity state snapshot.
    pub fn get_states(&mut self) -> Result<StateCache, HassError> {
        let id = self.take_id();
        self.socket
            .send(Message::text(json!({"id": id, "type": "get_states"}).to_string()))?;
        loop {
            let frame = self.socket.read()?;
            let Message::Text(text) = frame else { continue };
            let value: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if value["type"] == "result" && value["id"] == json!(id) {
                let entities = parse_states(&value["result"]);
                debug!(entities = entities.len(), "state snapshot received");
                return Ok(StateCache::from_snapshot(entities));
            }
        }
    }
}

impl RemoteClient for HassClient {
    fn call_service(&mut self, call: &ServiceCall) -> Result<(), RemoteError> {
        let id = self.take_id();
        let frame = service_frame(id, call)?;
        debug!(service = %call.service, id, "calling service");
        self.socket
            .send(Message::text(frame))
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }
}

/// Subscription connection pushing `state_changed` events.
///
/// Reconnects with a capped backoff until the stop signal fires.
pub struct HassEventFeed {
    pub scheme: String,
    pub host: String,
    pub token: String,
}

impl Feed for HassEventFeed {
    fn name(&self) -> &'static str {
        "hass-events"
    }

    fn run(self: Box<Self>, sender: mpsc::Sender<RuntimeEvent>, stop: StopSignal) {
        let mut backoff = Duration::from_secs(1);
        while !stop.is_stopped() {
            match self.subscribe() {
                Ok(socket) => {
                    backoff = Duration::from_secs(1);
                    if !pump_events(socket, &sender, &stop) {
                        return;
                    }
                }
                Err(err) => {
                    warn!(%err, "event subscription failed, retrying");
                }
            }
            if stop.wait_timeout(backoff) {
                return;
            }
            backoff = (backoff * 2).min(Duration::from_secs(30));
        }
    }
}

impl HassEventFeed {
    fn subscribe(&self) -> Result<Socket, HassError> {
        let mut socket = open_socket(&self.scheme, &self.host, &self.token)?;
        set_read_timeout(&mut socket, Duration::from_secs(1));
        socket.send(Message::text(
            json!({"id": 1, "type": "subscribe_events", "event_type": "state_changed"})
                .to_string(),
        ))?;
        info!(host = %self.host, "subscribed to state_changed");
        Ok(socket)
    }
}

/// Read events until disconnect or stop. Returns false once the channel
/// or the stop signal says the process is going down.
fn pump_events(
    mut socket: Socket,
    sender: &mpsc::Sender<RuntimeEvent>,
    stop: &StopSignal,
) -> bool {
    loop {
        if stop.is_stopped() {
            return false;
        }
        let frame = match socket.read() {
            Ok(frame) => frame,
            Err(tungstenite::Error::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(err) => {
                warn!(%err, "event connection dropped");
                return true;
            }
        };
        let Message::Text(text) = frame else { continue };
        let Some((entity_id, state)) = parse_event(&text) else {
            continue;
        };
        if sender
            .send(RuntimeEvent::StateChanged { entity_id, state })
            .is_err()
        {
            return false;
        }
    }
}

fn open_socket(scheme: &str, host: &str, token: &str) -> Result<Socket, HassError> {
    let url = format!("{scheme}://{host}/api/websocket");
    let (mut socket, _response) =
        tungstenite::connect(&url).map_err(|e| HassError::Connect(e.to_string()))?;
    authenticate(&mut socket, token)?;
    Ok(socket)
}

/// Auth handshake: wait for `auth_required`, send the token, expect
/// `auth_ok`.
fn authenticate(socket: &mut Socket, token: &str) -> Result<(), HassError> {
    loop {
        let frame = socket.read()?;
        let Message::Text(text) = frame else { continue };
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        match value["type"].as_str() {
            Some("auth_required") => {
                socket.send(Message::text(
                    json!({"type": "auth", "access_token": token}).to_string(),
                ))?;
            }
            Some("auth_ok") => return Ok(()),
            Some("auth_invalid") => {
                let message = value["message"].as_str().unwrap_or("invalid token");
                return Err(HassError::AuthRejected(message.to_owned()));
            }
            _ => {
                return Err(HassError::Protocol {
                    phase: "auth",
                    frame: text.to_string(),
                });
            }
        }
    }
}

fn set_read_timeout(socket: &mut Socket, timeout: Duration) {
    // The read timeout is what lets the feed notice its stop signal.
    let result = match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(tls) => tls.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    };
    if let Err(err) = result {
        warn!(%err, "could not set read timeout on event socket");
    }
}

/// Build a `call_service` frame. The service name carries its domain as
/// `domain.service`.
fn service_frame(id: u64, call: &ServiceCall) -> Result<String, RemoteError> {
    let (domain, service) = call
        .service
        .split_once('.')
        .ok_or_else(|| RemoteError::BadService(call.service.clone()))?;
    if domain.is_empty() || service.is_empty() {
        return Err(RemoteError::BadService(call.service.clone()));
    }
    let mut frame = json!({
        "id": id,
        "type": "call_service",
        "domain": domain,
        "service": service,
        "service_data": call.data,
    });
    if let Some(target) = &call.target {
        frame["target"] = Value::Object(target.clone());
    }
    Ok(frame.to_string())
}

fn parse_states(result: &Value) -> HashMap<String, EntityState> {
    let mut entities = HashMap::new();
    let Some(items) = result.as_array() else {
        return entities;
    };
    for item in items {
        let Some(entity_id) = item["entity_id"].as_str() else {
            continue;
        };
        let Ok(state) = serde_json::from_value::<EntityState>(item.clone()) else {
            continue;
        };
        entities.insert(entity_id.to_owned(), state);
    }
    entities
}

/// Pull `(entity_id, new_state)` out of a `state_changed` event frame.
/// Removal events carry a null `new_state` and are skipped.
fn parse_event(text: &str) -> Option<(String, EntityState)> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value["type"] != "event" {
        return None;
    }
    let data = &value["event"]["data"];
    let entity_id = data["entity_id"].as_str()?.to_owned();
    let new_state = &data["new_state"];
    if new_state.is_null() {
        return None;
    }
    let state: EntityState = serde_json::from_value(new_state.clone()).ok()?;
    Some((entity_id, state))
}
