//! Message channel: one socket.io connection per authenticated user
//!
//! Wraps the persistent WebSocket, joins at most one appointment room at a
//! time, turns send intents into outbound events and dispatches inbound
//! events to a single registered handler set.

pub mod events;
pub mod frame;
pub mod websocket;

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use events::{ChannelEvent, OutboundEvent, SendMessage};
use frame::Packet;
use websocket::{ChannelSocket, Transport};

use crate::error::ClientError;
use crate::models::{CallEvent, Message, ReadReceipt};
use crate::participant::ChatParticipantAdapter;

/// Connectivity as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Set by the caller while it retries; the channel never retries on its own.
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

type Handler<T> = Box<dyn Fn(T) + Send + Sync>;

/// The single handler set of a channel. Unset handlers drop their events.
#[derive(Default)]
pub struct ChannelHandlers {
    message: Option<Handler<Message>>,
    read_receipt: Option<Handler<ReadReceipt>>,
    error: Option<Handler<ClientError>>,
    call: Option<Handler<CallEvent>>,
    joined: Option<Handler<Value>>,
    state: Option<Handler<ConnectionState>>,
}

impl ChannelHandlers {
    /// Handler set that forwards every event into one queue.
    pub fn forward_to(tx: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        let fwd = move |ev: ChannelEvent| {
            let _ = tx.send(ev);
        };
        let fwd = Arc::new(fwd);
        let f = Arc::clone(&fwd);
        let message: Handler<Message> = Box::new(move |m| f(ChannelEvent::Message(m)));
        let f = Arc::clone(&fwd);
        let read_receipt: Handler<ReadReceipt> =
            Box::new(move |r| f(ChannelEvent::ReadReceipt(r)));
        let f = Arc::clone(&fwd);
        let error: Handler<ClientError> = Box::new(move |e| f(ChannelEvent::Error(e)));
        let f = Arc::clone(&fwd);
        let call: Handler<CallEvent> = Box::new(move |c| f(ChannelEvent::Call(c)));
        let f = Arc::clone(&fwd);
        let joined: Handler<Value> = Box::new(move |v| f(ChannelEvent::Joined(v)));
        let f = fwd;
        let state: Handler<ConnectionState> = Box::new(move |s| f(ChannelEvent::State(s)));

        Self {
            message: Some(message),
            read_receipt: Some(read_receipt),
            error: Some(error),
            call: Some(call),
            joined: Some(joined),
            state: Some(state),
        }
    }

    fn dispatch(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(m) => self.message.as_ref().map(|h| h(m)),
            ChannelEvent::ReadReceipt(r) => self.read_receipt.as_ref().map(|h| h(r)),
            ChannelEvent::Error(e) => self.error.as_ref().map(|h| h(e)),
            ChannelEvent::Call(c) => self.call.as_ref().map(|h| h(c)),
            ChannelEvent::Joined(v) => self.joined.as_ref().map(|h| h(v)),
            ChannelEvent::State(s) => self.state.as_ref().map(|h| h(s)),
        };
    }
}

type SharedHandlers = Arc<Mutex<ChannelHandlers>>;
type SharedState = Arc<Mutex<ConnectionState>>;

fn dispatch(handlers: &SharedHandlers, event: ChannelEvent) {
    let guard = handlers.lock().unwrap_or_else(|e| e.into_inner());
    guard.dispatch(event);
}

fn set_state(state: &SharedState, handlers: &SharedHandlers, next: ConnectionState) {
    {
        let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
        if *guard == next {
            return;
        }
        *guard = next;
    }
    tracing::info!("Channel {}", next.as_str());
    dispatch(handlers, ChannelEvent::State(next));
}

enum Command {
    Frame(String),
    Close,
}

/// Cloneable emit-only handle to an open channel.
#[derive(Clone)]
pub struct ChannelHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl ChannelHandle {
    /// Fire-and-forget emit; the server orders and acknowledges nothing here.
    pub fn emit(&self, event: &OutboundEvent) -> Result<(), ClientError> {
        tracing::debug!("Emit {} {}", event.name(), event.payload());
        self.cmd_tx
            .send(Command::Frame(event.encode()))
            .map_err(|_| ClientError::Transport("channel is closed".into()))
    }
}

/// Owned channel resource with an explicit open/close lifecycle.
pub struct MessageChannel {
    handle: ChannelHandle,
    handlers: SharedHandlers,
    state: SharedState,
    joined: Option<String>,
    task: Option<JoinHandle<()>>,
}

impl MessageChannel {
    /// Open the WebSocket and authenticate with the bearer token.
    pub async fn connect(socket_url: &str, token: &str) -> Result<Self, ClientError> {
        let socket = ChannelSocket::connect(socket_url).await?;
        Self::connect_with(socket, token).await
    }

    /// Run the Engine.IO/Socket.IO handshake over `transport`, then start the event loop.
    ///
    /// A `connect_error` reply is reported as `ClientError::Auth`.
    pub async fn connect_with<T: Transport>(
        mut transport: T,
        token: &str,
    ) -> Result<Self, ClientError> {
        handshake(&mut transport, token).await?;

        let handlers: SharedHandlers = Arc::new(Mutex::new(ChannelHandlers::default()));
        let state: SharedState = Arc::new(Mutex::new(ConnectionState::Open));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_connection(
            transport,
            cmd_rx,
            Arc::clone(&handlers),
            Arc::clone(&state),
        ));

        tracing::info!("Channel open");

        Ok(Self {
            handle: ChannelHandle { cmd_tx },
            handlers,
            state,
            joined: None,
            task: Some(task),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Currently joined conversation, if any.
    pub fn joined(&self) -> Option<&str> {
        self.joined.as_deref()
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    pub fn emit(&self, event: &OutboundEvent) -> Result<(), ClientError> {
        self.handle.emit(event)
    }

    /// Join a conversation room.
    ///
    /// Re-joining the current room is a no-op and returns `Ok(false)`. Joining
    /// a different room leaves the previous one first, so at most one room
    /// membership exists at a time.
    pub fn join_conversation(
        &mut self,
        conversation_id: &str,
        participant: &dyn ChatParticipantAdapter,
    ) -> Result<bool, ClientError> {
        let id = conversation_id.trim();
        if id.is_empty() {
            return Err(ClientError::Validation("conversation id is empty".into()));
        }
        if self.joined.as_deref() == Some(id) {
            tracing::debug!("Already joined conversation {}", id);
            return Ok(false);
        }
        self.leave_conversation()?;

        self.emit(&participant.join_event(id))?;
        tracing::info!("Joined conversation {}", id);
        self.joined = Some(id.to_string());
        Ok(true)
    }

    /// Leave the current room, if any.
    pub fn leave_conversation(&mut self) -> Result<(), ClientError> {
        if let Some(previous) = self.joined.take() {
            tracing::info!("Leaving conversation {}", previous);
            self.emit(&OutboundEvent::LeaveAppointment {
                appointment_id: previous,
            })?;
        }
        Ok(())
    }

    /// Emit a chat message. Does not wait for the server echo.
    pub fn send(
        &self,
        conversation_id: &str,
        body: &str,
        participant: &dyn ChatParticipantAdapter,
    ) -> Result<(), ClientError> {
        let id = conversation_id.trim();
        if id.is_empty() {
            return Err(ClientError::Validation("conversation id is empty".into()));
        }
        let text = body.trim();
        if text.is_empty() {
            return Err(ClientError::Validation("message body is empty".into()));
        }
        self.emit(&participant.send_event(id, text))
    }

    /// Replace the whole handler set.
    pub fn set_handlers(&self, handlers: ChannelHandlers) {
        *self.handlers.lock().unwrap_or_else(|e| e.into_inner()) = handlers;
    }

    /// Drop every registered handler.
    pub fn clear_handlers(&self) {
        self.set_handlers(ChannelHandlers::default());
    }

    pub fn on_message(&self, handler: impl Fn(Message) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).message = Some(Box::new(handler));
    }

    pub fn on_read_receipt(&self, handler: impl Fn(ReadReceipt) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).read_receipt =
            Some(Box::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(ClientError) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).error = Some(Box::new(handler));
    }

    pub fn on_call(&self, handler: impl Fn(CallEvent) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).call = Some(Box::new(handler));
    }

    pub fn on_joined(&self, handler: impl Fn(Value) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).joined = Some(Box::new(handler));
    }

    pub fn on_state(&self, handler: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner()).state = Some(Box::new(handler));
    }

    /// Leave the room, remove handlers and shut the connection down.
    pub fn close(&mut self) {
        self.begin_close();
    }

    /// Like `close`, but wait until the disconnect has been written.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.begin_close() {
            if let Err(e) = task.await {
                tracing::debug!("Channel task ended abnormally: {}", e);
            }
        }
    }

    fn begin_close(&mut self) -> Option<JoinHandle<()>> {
        let task = self.task.take()?;
        let _ = self.leave_conversation();
        self.clear_handlers();
        let _ = self.handle.cmd_tx.send(Command::Close);
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *guard = ConnectionState::Closed;
        Some(task)
    }
}

impl Drop for MessageChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn handshake<T: Transport>(transport: &mut T, token: &str) -> Result<(), ClientError> {
    // 1. Engine.IO open packet
    loop {
        let text = transport
            .recv()
            .await?
            .ok_or_else(|| ClientError::Transport("connection closed before handshake".into()))?;
        match frame::decode(&text)? {
            Packet::Open(info) => {
                tracing::debug!(
                    "Engine.IO open (sid={}, ping={}ms)",
                    info.sid,
                    info.ping_interval
                );
                break;
            }
            other => tracing::debug!("Pre-handshake frame ignored: {:?}", other),
        }
    }

    // 2. Socket.IO connect with auth payload
    transport
        .send(frame::encode_connect(&json!({ "token": token })))
        .await?;

    loop {
        let text = transport
            .recv()
            .await?
            .ok_or_else(|| ClientError::Transport("connection closed during connect".into()))?;
        match frame::decode(&text)? {
            Packet::Connect(_) => return Ok(()),
            Packet::ConnectError(v) => {
                let reason = frame::connect_error_message(&v);
                tracing::warn!("Channel rejected token: {}", reason);
                return Err(ClientError::Auth(reason));
            }
            Packet::Ping => transport.send(frame::PONG.to_string()).await?,
            Packet::Close | Packet::Disconnect => {
                return Err(ClientError::Transport("server closed during connect".into()))
            }
            other => tracing::debug!("Frame before connect ack ignored: {:?}", other),
        }
    }
}

/// Connection event loop: writes queued frames, answers pings, dispatches events.
async fn run_connection<T: Transport>(
    mut transport: T,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    handlers: SharedHandlers,
    state: SharedState,
) {
    let failure = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Frame(text)) => {
                        if let Err(e) = transport.send(text).await {
                            break Some(e);
                        }
                    }
                    Some(Command::Close) | None => {
                        let _ = transport.send(frame::DISCONNECT.to_string()).await;
                        break None;
                    }
                }
            }
            incoming = transport.recv() => {
                match incoming {
                    Ok(Some(text)) => match frame::decode(&text) {
                        Ok(Packet::Ping) => {
                            if let Err(e) = transport.send(frame::PONG.to_string()).await {
                                break Some(e);
                            }
                        }
                        Ok(Packet::Event { name, data, .. }) => {
                            if let Some(event) = events::decode_event(&name, data) {
                                dispatch(&handlers, event);
                            }
                        }
                        Ok(Packet::ConnectError(v)) => {
                            dispatch(&handlers, ChannelEvent::Error(ClientError::Auth(
                                frame::connect_error_message(&v),
                            )));
                        }
                        Ok(Packet::Close) | Ok(Packet::Disconnect) => {
                            break Some(ClientError::Transport("disconnected by server".into()));
                        }
                        Ok(other) => tracing::debug!("Frame ignored: {:?}", other),
                        Err(e) => tracing::warn!("{}", e),
                    },
                    Ok(None) => {
                        break Some(ClientError::Transport("connection closed by server".into()));
                    }
                    Err(e) => break Some(e),
                }
            }
        }
    };

    if let Some(e) = failure {
        tracing::warn!("Channel lost: {}", e);
        dispatch(&handlers, ChannelEvent::Error(e));
    }
    set_state(&state, &handlers, ConnectionState::Closed);
}
