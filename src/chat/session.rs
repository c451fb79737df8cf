//! Active chat session: one synchronizer bound to one channel room
//!
//! Activation joins the room and fetches history concurrently, feeding live
//! events into the synchronizer while the fetch is still in flight.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::ChatSynchronizer;
use crate::channel::{ChannelEvent, ConnectionState, MessageChannel};
use crate::error::ClientError;
use crate::models::{CallEvent, Message};
use crate::participant::ChatParticipantAdapter;

/// REST side of the chat: history, read-marking and the alternative send path.
pub trait ChatBackend: Send + Sync + 'static {
    fn fetch_messages(
        &self,
        conversation_id: &str,
    ) -> impl Future<Output = Result<Vec<Message>, ClientError>> + Send;

    fn mark_read(&self, conversation_id: &str)
        -> impl Future<Output = Result<(), ClientError>> + Send;

    fn post_message(
        &self,
        conversation_id: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Which path outgoing messages take. Neither inserts locally; the message
/// shows up once the server echoes it on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendMode {
    #[default]
    Channel,
    Rest,
}

/// What a handled channel event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A message was added to the list.
    Message(Message),
    /// Number of messages that turned read.
    Read(usize),
    Joined,
    State(ConnectionState),
    Error(ClientError),
    Call(CallEvent),
    /// Duplicate or foreign event; the list is unchanged.
    Unchanged,
}

pub struct ChatSession<B: ChatBackend> {
    backend: Arc<B>,
    channel: MessageChannel,
    participant: Box<dyn ChatParticipantAdapter>,
    sync: ChatSynchronizer,
    events_tx: mpsc::UnboundedSender<ChannelEvent>,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    send_mode: SendMode,
}

impl<B: ChatBackend> ChatSession<B> {
    pub fn new(
        backend: Arc<B>,
        channel: MessageChannel,
        participant: Box<dyn ChatParticipantAdapter>,
        conversation_id: &str,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        install_handlers(&channel, &events_tx);
        let mut sync = ChatSynchronizer::new(conversation_id.trim());
        sync.set_connection_state(channel.state());
        Self {
            backend,
            channel,
            participant,
            sync,
            events_tx,
            events,
            send_mode: SendMode::default(),
        }
    }

    pub fn with_send_mode(mut self, mode: SendMode) -> Self {
        self.send_mode = mode;
        self
    }

    pub fn synchronizer(&self) -> &ChatSynchronizer {
        &self.sync
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn participant(&self) -> &dyn ChatParticipantAdapter {
        self.participant.as_ref()
    }

    pub fn conversation_id(&self) -> &str {
        self.sync.conversation_id()
    }

    /// Join the room and merge history with whatever arrives live meanwhile.
    ///
    /// Events handled while the fetch is in flight are returned in arrival
    /// order, unchanged ones left out, so the caller can act on calls and
    /// state changes it would otherwise miss. A failed history fetch is
    /// logged and leaves the list as it is.
    pub async fn activate(&mut self) -> Result<Vec<SessionUpdate>, ClientError> {
        let id = self.sync.conversation_id().to_string();
        if id.is_empty() {
            return Err(ClientError::Validation("conversation id is empty".into()));
        }

        self.channel
            .join_conversation(&id, self.participant.as_ref())?;

        let backend = Arc::clone(&self.backend);
        let fetch = backend.fetch_messages(&id);
        tokio::pin!(fetch);

        let mut updates = Vec::new();
        let history = loop {
            tokio::select! {
                res = &mut fetch => break res,
                Some(event) = self.events.recv() => {
                    match self.handle_event(event) {
                        SessionUpdate::Unchanged => {}
                        update => updates.push(update),
                    }
                }
            }
        };

        match history {
            Ok(messages) => self.sync.seed_history(messages),
            Err(e) => tracing::warn!("Failed to load history for {}: {}", id, e),
        }
        Ok(updates)
    }

    /// Leave the current room and activate `conversation_id` instead.
    pub async fn switch_to(&mut self, conversation_id: &str) -> Result<Vec<SessionUpdate>, ClientError> {
        let id = conversation_id.trim();
        if id.is_empty() {
            return Err(ClientError::Validation("conversation id is empty".into()));
        }
        if id == self.sync.conversation_id() {
            return self.activate().await;
        }
        self.channel.leave_conversation()?;
        self.sync = ChatSynchronizer::new(id);
        self.sync.set_connection_state(self.channel.state());
        self.activate().await
    }

    /// Swap in a freshly connected channel and re-activate the conversation.
    ///
    /// The message list is kept; history is re-merged on top of it.
    pub async fn replace_channel(
        &mut self,
        channel: MessageChannel,
    ) -> Result<Vec<SessionUpdate>, ClientError> {
        install_handlers(&channel, &self.events_tx);
        self.channel = channel;
        self.sync.set_connection_state(self.channel.state());
        self.activate().await
    }

    /// Send a message. Nothing is inserted locally; the echo adds it.
    pub async fn send(&self, body: &str) -> Result<(), ClientError> {
        let text = body.trim();
        if text.is_empty() {
            return Err(ClientError::Validation("message body is empty".into()));
        }
        let id = self.sync.conversation_id();
        match self.send_mode {
            SendMode::Channel => self.channel.send(id, text, self.participant.as_ref()),
            SendMode::Rest => self.backend.post_message(id, text).await,
        }
    }

    /// Wait for the next channel event. `None` once every sender is gone.
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Apply one channel event to the session state.
    pub fn handle_event(&mut self, event: ChannelEvent) -> SessionUpdate {
        match event {
            ChannelEvent::Message(message) => {
                let wants_receipt = self.participant.should_mark_read(&message);
                if !self.sync.apply_message(message.clone()) {
                    return SessionUpdate::Unchanged;
                }
                if wants_receipt && !message.is_read {
                    self.spawn_mark_read();
                }
                SessionUpdate::Message(message)
            }
            ChannelEvent::ReadReceipt(receipt) => match self.sync.apply_receipt(&receipt) {
                0 => SessionUpdate::Unchanged,
                n => SessionUpdate::Read(n),
            },
            ChannelEvent::Joined(_) => {
                tracing::info!("Joined room for {}", self.sync.conversation_id());
                self.spawn_mark_read();
                SessionUpdate::Joined
            }
            ChannelEvent::State(state) => {
                self.sync.set_connection_state(state);
                SessionUpdate::State(state)
            }
            ChannelEvent::Error(e) => {
                tracing::warn!("Channel error: {}", e);
                SessionUpdate::Error(e)
            }
            ChannelEvent::Call(call) => SessionUpdate::Call(call),
        }
    }

    /// Leave the room and shut the channel down.
    pub fn close(&mut self) {
        self.channel.close();
        self.sync.set_connection_state(ConnectionState::Closed);
    }

    // Receipt failures never block display; they are only logged.
    fn spawn_mark_read(&self) {
        let backend = Arc::clone(&self.backend);
        let id = self.sync.conversation_id().to_string();
        tokio::spawn(async move {
            match backend.mark_read(&id).await {
                Ok(()) => tracing::debug!("Marked {} as read", id),
                Err(e) => tracing::warn!("Failed to mark {} as read: {}", id, e),
            }
        });
    }
}

fn install_handlers(channel: &MessageChannel, tx: &mpsc::UnboundedSender<ChannelEvent>) {
    let fwd = tx.clone();
    channel.on_message(move |m| {
        let _ = fwd.send(ChannelEvent::Message(m));
    });
    let fwd = tx.clone();
    channel.on_read_receipt(move |r| {
        let _ = fwd.send(ChannelEvent::ReadReceipt(r));
    });
    let fwd = tx.clone();
    channel.on_joined(move |v| {
        let _ = fwd.send(ChannelEvent::Joined(v));
    });
    let fwd = tx.clone();
    channel.on_call(move |c| {
        let _ = fwd.send(ChannelEvent::Call(c));
    });
    let fwd = tx.clone();
    channel.on_error(move |e| {
        let _ = fwd.send(ChannelEvent::Error(e));
    });
    let fwd = tx.clone();
    channel.on_state(move |state| {
        let _ = fwd.send(ChannelEvent::State(state));
    });
}
