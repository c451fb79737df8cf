//! Line-oriented console: the interactive front end over chat and calls.
//!
//! Purely reactive. It renders synchronizer and call state, forwards typed
//! commands and owns reconnection of a dropped channel.

pub mod input;
pub mod render;

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{self, Sleep};

use crate::api::{self, ApiClient};
use crate::auth::SessionStore;
use crate::calling::room::MediaRoom;
use crate::calling::signaling::{describe, NO_ANSWER_REASON};
use crate::calling::{conversation_of, CallController, CallState, HeadlessConnector};
use crate::channel::{ChannelEvent, ChannelHandle, ChannelHandlers, ConnectionState, MessageChannel};
use crate::chat::{ChatSession, ChatSynchronizer, SendMode, SessionUpdate};
use crate::config::Config;
use crate::error::ClientError;
use crate::models::{CallEvent, Identity};
use crate::notify::{NotificationBus, Subscription};
use crate::participant::{adapter_for, ChatParticipantAdapter};
use input::Command;

type ConsoleCall = CallController<ChannelHandle, ApiClient, HeadlessConnector>;

const MAX_BACKOFF_SECS: u64 = 64;

/// Logged-in context shared by every console command.
struct Context {
    config: Config,
    identity: Identity,
    token: String,
    api: ApiClient,
}

impl Context {
    fn load() -> Result<Self> {
        let config = Config::load()?;
        let identity = config
            .identity()
            .context("Not logged in. Run `consult-cli login` first.")?;
        let token = config
            .bearer_token()
            .context("Session expired. Run `consult-cli login` again.")?;
        let api = ApiClient::new(config.api_url.clone(), token.clone());
        Ok(Self {
            config,
            identity,
            token,
            api,
        })
    }

    fn participant(&self) -> Result<Box<dyn ChatParticipantAdapter>> {
        Ok(adapter_for(self.identity.clone())?)
    }

    async fn connect(&self) -> Result<MessageChannel, ClientError> {
        MessageChannel::connect(&self.config.socket_url, &self.token).await
    }

    fn ringing_timeout(&self) -> Option<Duration> {
        self.config
            .ringing_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    fn call_controller(&self, channel: &MessageChannel) -> Result<ConsoleCall> {
        Ok(CallController::new(
            self.participant()?,
            channel.handle(),
            self.api.clone(),
            HeadlessConnector,
        ))
    }
}

/// Print the stored history of one appointment.
pub async fn print_history(appointment: &str) -> Result<()> {
    let ctx = Context::load()?;
    let participant = ctx.participant()?;
    let messages = api::chat::fetch_messages(&ctx.api, appointment).await?;

    let mut sync = ChatSynchronizer::new(appointment);
    sync.seed_history(messages);
    if sync.is_empty() {
        println!("No messages for appointment {}.", appointment);
        return Ok(());
    }
    render::print_groups(&sync.groups(&render::local_now()), participant.as_ref());
    Ok(())
}

/// Send one message and exit.
pub async fn send_once(appointment: &str, text: &str, rest: bool) -> Result<()> {
    let ctx = Context::load()?;
    if rest {
        api::chat::post_message(&ctx.api, appointment, text).await?;
    } else {
        let participant = ctx.participant()?;
        let mut channel = ctx.connect().await?;
        channel.join_conversation(appointment, participant.as_ref())?;
        channel.send(appointment, text, participant.as_ref())?;
        channel.shutdown().await;
    }
    println!("Message sent.");
    Ok(())
}

/// Interactive chat on one appointment, with calls.
///
/// With `rest` set, typed messages go through the REST endpoint instead of
/// the channel; either way they appear once the server echoes them.
pub async fn run_chat(appointment: &str, rest: bool) -> Result<()> {
    let ctx = Context::load()?;
    let bus = NotificationBus::new();
    tokio::spawn(render_notifications(bus.subscribe()));

    let channel = ctx.connect().await?;
    let mut calls = ctx.call_controller(&channel)?;
    let mut session = ChatSession::new(
        Arc::new(ctx.api.clone()),
        channel,
        ctx.participant()?,
        appointment,
    )
    .with_send_mode(if rest { SendMode::Rest } else { SendMode::Channel });
    // Messages seen during activation are part of the history printed below.
    let mut pending: VecDeque<SessionUpdate> = without_messages(session.activate().await?);

    println!(
        "Chat {} as {} ({}). /help for commands.",
        session.conversation_id(),
        ctx.identity.name,
        ctx.identity.role
    );
    render::print_groups(
        &session.synchronizer().groups(&render::local_now()),
        session.participant(),
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ringing: Option<Pin<Box<Sleep>>> = None;

    loop {
        let update = match pending.pop_front() {
            Some(update) => update,
            None => tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line.context("Failed to read input")? else { break };
                    match input::parse_line(&line) {
                        None => {}
                        Some(Command::Quit) => break,
                        Some(Command::Say(text)) => {
                            if let Err(e) = session.send(&text).await {
                                bus.error(e.message());
                            }
                        }
                        Some(Command::Open(None)) => bus.warning("Usage: /open <appointment>"),
                        Some(Command::Open(Some(id))) => match session.switch_to(&id).await {
                            Ok(updates) => {
                                pending.extend(without_messages(updates));
                                println!("Chat {}", session.conversation_id());
                                render::print_groups(
                                    &session.synchronizer().groups(&render::local_now()),
                                    session.participant(),
                                );
                            }
                            Err(e) => bus.error(e.message()),
                        },
                        Some(Command::Call(peer)) => match peer.or_else(|| infer_peer(&session)) {
                            Some(peer) => {
                                if let Err(e) = calls.start_call(session.conversation_id(), &peer).await {
                                    bus.error(e.message());
                                }
                                println!("Call: {}", describe(calls.session()));
                            }
                            None => bus.warning("No peer known yet; use /call <peer-id>"),
                        },
                        Some(Command::Status) => {
                            println!(
                                "Channel: {}  Room: {}  Messages: {}  Call: {}",
                                session.synchronizer().connection_state().as_str(),
                                session.channel().joined().unwrap_or("-"),
                                session.synchronizer().len(),
                                describe(calls.session())
                            );
                            if let Some(room) = calls.room() {
                                println!("Media: {}", room.room_name());
                            }
                        }
                        Some(other) => {
                            if call_command(&mut calls, other, &bus).await {
                                ringing = None;
                            }
                        }
                    }
                    continue;
                }
                event = session.next_event() => match event {
                    Some(event) => session.handle_event(event),
                    None => break,
                },
                member = calls.next_room_event() => {
                    calls.apply_room_event(member);
                    continue;
                }
                _ = expire(&mut ringing) => {
                    ringing = None;
                    no_answer(&mut calls, &bus);
                    continue;
                }
                _ = tokio::signal::ctrl_c() => break,
            },
        };

        match update {
            SessionUpdate::Message(message) => {
                render::print_message(&message, session.participant());
                if !session.participant().is_own(&message) {
                    bus.info("New message");
                }
            }
            SessionUpdate::Read(n) => tracing::debug!("{} messages read", n),
            SessionUpdate::Joined | SessionUpdate::Unchanged => {}
            SessionUpdate::State(ConnectionState::Closed) => {
                bus.warning("Connection lost");
                session.handle_event(ChannelEvent::State(ConnectionState::Reconnecting));
                match reconnect(&ctx).await? {
                    Some(channel) => {
                        calls.replace_sink(channel.handle());
                        pending.extend(session.replace_channel(channel).await?);
                        bus.success("Reconnected");
                    }
                    None => break,
                }
            }
            SessionUpdate::State(state) => tracing::debug!("Channel {}", state.as_str()),
            SessionUpdate::Error(e) if e.is_auth() => bail!("{}", e),
            SessionUpdate::Error(e) => bus.error(e.message()),
            SessionUpdate::Call(call) => {
                if remote_call_event(&mut calls, call, &bus) {
                    ringing = ctx.ringing_timeout().map(|d| Box::pin(time::sleep(d)));
                }
            }
        }
    }

    if let Err(e) = calls.hang_up() {
        tracing::warn!("Hang-up on exit failed: {}", e);
    }
    session.close();
    Ok(())
}

fn without_messages(updates: Vec<SessionUpdate>) -> VecDeque<SessionUpdate> {
    updates
        .into_iter()
        .filter(|u| !matches!(u, SessionUpdate::Message(_)))
        .collect()
}

/// Place a call and stay in it until it ends.
pub async fn run_call(appointment: &str, peer: &str) -> Result<()> {
    let ctx = Context::load()?;
    let bus = NotificationBus::new();
    tokio::spawn(render_notifications(bus.subscribe()));

    let channel = ctx.connect().await?;
    let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    let call_tx = tx.clone();
    channel.on_call(move |call| {
        let _ = call_tx.send(ChannelEvent::Call(call));
    });
    let error_tx = tx.clone();
    channel.on_error(move |e| {
        let _ = error_tx.send(ChannelEvent::Error(e));
    });
    channel.on_state(move |state| {
        let _ = tx.send(ChannelEvent::State(state));
    });
    let mut calls = ctx.call_controller(&channel)?;

    calls.start_call(appointment, peer).await?;
    println!("Call: {}  (/mute, /video, /hangup)", describe(calls.session()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else { break };
                match input::parse_line(&line) {
                    None => {}
                    Some(Command::Quit) | Some(Command::Hangup) => break,
                    Some(other) => {
                        call_command(&mut calls, other, &bus).await;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(ChannelEvent::Call(call)) => {
                        remote_call_event(&mut calls, call, &bus);
                    }
                    Some(ChannelEvent::Error(e)) => bus.error(e.message()),
                    Some(ChannelEvent::State(ConnectionState::Closed)) | None => {
                        bus.warning("Connection lost; ending call");
                        break;
                    }
                    Some(_) => {}
                }
                if calls.state() == CallState::Ended {
                    break;
                }
            }
            member = calls.next_room_event() => calls.apply_room_event(member),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    calls.hang_up()?;
    println!("Call: {}", describe(calls.session()));
    channel.shutdown().await;
    Ok(())
}

/// Wait for incoming calls.
pub async fn run_listen(auto_accept: bool) -> Result<()> {
    let ctx = Context::load()?;
    let bus = NotificationBus::new();
    tokio::spawn(render_notifications(bus.subscribe()));

    let mut channel = ctx.connect().await?;
    let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
    channel.set_handlers(ChannelHandlers::forward_to(tx.clone()));
    let mut calls = ctx.call_controller(&channel)?;

    println!(
        "Listening for calls as {} ({}). Ctrl+C to stop.",
        ctx.identity.name, ctx.identity.role
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ringing: Option<Pin<Box<Sleep>>> = None;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else { break };
                match input::parse_line(&line) {
                    None => {}
                    Some(Command::Quit) => break,
                    Some(Command::Status) => println!("Call: {}", describe(calls.session())),
                    Some(other) => {
                        if call_command(&mut calls, other, &bus).await {
                            ringing = None;
                        }
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Some(ChannelEvent::Call(call)) => {
                        if remote_call_event(&mut calls, call, &bus) {
                            if auto_accept {
                                if let Err(e) = calls.accept().await {
                                    bus.error(e.message());
                                }
                                println!("Call: {}", describe(calls.session()));
                            } else {
                                ringing = ctx.ringing_timeout().map(|d| Box::pin(time::sleep(d)));
                            }
                        }
                    }
                    Some(ChannelEvent::Error(e)) if e.is_auth() => bail!("{}", e),
                    Some(ChannelEvent::Error(e)) => bus.error(e.message()),
                    Some(ChannelEvent::State(ConnectionState::Closed)) | None => {
                        bus.warning("Connection lost");
                        match reconnect(&ctx).await? {
                            Some(fresh) => {
                                fresh.set_handlers(ChannelHandlers::forward_to(tx.clone()));
                                calls.replace_sink(fresh.handle());
                                channel = fresh;
                                bus.success("Reconnected");
                            }
                            None => break,
                        }
                    }
                    Some(_) => {}
                }
            }
            member = calls.next_room_event() => calls.apply_room_event(member),
            _ = expire(&mut ringing) => {
                ringing = None;
                no_answer(&mut calls, &bus);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Err(e) = calls.hang_up() {
        tracing::warn!("Hang-up on exit failed: {}", e);
    }
    channel.shutdown().await;
    Ok(())
}

/// Apply a call command typed by the user. Returns true if it answered a
/// ringing call either way.
async fn call_command(calls: &mut ConsoleCall, cmd: Command, bus: &NotificationBus) -> bool {
    let before = calls.state();
    let result = match cmd {
        Command::Accept => calls.accept().await,
        Command::Decline => calls.decline(),
        Command::Hangup => calls.hang_up(),
        Command::Dismiss => {
            calls.dismiss();
            Ok(())
        }
        Command::Mute => {
            let on = calls.toggle_audio();
            println!("Microphone {}", if on { "on" } else { "muted" });
            Ok(())
        }
        Command::Video => {
            let on = calls.toggle_video();
            println!("Camera {}", if on { "on" } else { "off" });
            Ok(())
        }
        Command::Help => {
            println!("{}", input::HELP);
            Ok(())
        }
        Command::Unknown(name) => {
            println!("Unknown command /{} (try /help)", name);
            Ok(())
        }
        Command::Say(_)
        | Command::Call(_)
        | Command::Open(_)
        | Command::Status
        | Command::Quit => {
            println!("Not available here.");
            Ok(())
        }
    };
    match result {
        Ok(()) if calls.state() != before => println!("Call: {}", describe(calls.session())),
        Ok(()) => {}
        Err(e) => bus.error(e.message()),
    }
    before == CallState::Incoming && calls.state() != CallState::Incoming
}

/// Apply a remote call event. Returns true if it started ringing.
fn remote_call_event(calls: &mut ConsoleCall, event: CallEvent, bus: &NotificationBus) -> bool {
    let before = calls.state();
    let after = calls.handle_remote(event);
    if after == before {
        return false;
    }
    match after {
        CallState::Incoming => {
            let caller = calls
                .session()
                .peer
                .as_ref()
                .map(|p| p.name.clone().unwrap_or_else(|| p.user_id.clone()))
                .unwrap_or_default();
            let about = calls
                .session()
                .room_name
                .as_deref()
                .and_then(conversation_of)
                .map(|id| format!(" about appointment {}", id))
                .unwrap_or_default();
            bus.info(format!(
                "Incoming call from {}{} (/accept or /decline)",
                caller, about
            ));
            true
        }
        CallState::Ended => {
            let reason = calls.session().end_reason.clone().unwrap_or_default();
            bus.warning(format!("Call ended: {}", reason));
            false
        }
        _ => false,
    }
}

fn no_answer(calls: &mut ConsoleCall, bus: &NotificationBus) {
    if calls.state() != CallState::Incoming {
        return;
    }
    match calls.decline_with_reason(NO_ANSWER_REASON) {
        Ok(()) => bus.warning("Missed call"),
        Err(e) => bus.error(e.message()),
    }
}

/// The other chat participant, taken from the newest message they sent.
fn infer_peer<B: crate::chat::ChatBackend>(session: &ChatSession<B>) -> Option<String> {
    let me = session.participant();
    session
        .synchronizer()
        .messages()
        .filter(|m| !me.is_own(m))
        .filter_map(|m| m.sender_id.clone())
        .last()
}

/// Resolves when the ringing timer fires; never while none is set.
async fn expire(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Reconnect with exponential backoff (1s, 2s, 4s, ... capped at 64s).
///
/// Returns `None` on Ctrl+C. A rejected token ends the retries with an error.
async fn reconnect(ctx: &Context) -> Result<Option<MessageChannel>> {
    let mut backoff = 1u64;
    loop {
        println!("Reconnecting in {}s...", backoff);
        tokio::select! {
            _ = time::sleep(Duration::from_secs(backoff)) => {}
            _ = tokio::signal::ctrl_c() => return Ok(None),
        }

        match ctx.connect().await {
            Ok(channel) => return Ok(Some(channel)),
            Err(e) if e.is_auth() => bail!("{}. Run `consult-cli login` again.", e),
            Err(e) => {
                tracing::warn!("Reconnect failed: {}", e);
                backoff = next_backoff(backoff);
            }
        }
    }
}

fn next_backoff(secs: u64) -> u64 {
    (secs * 2).min(MAX_BACKOFF_SECS)
}

async fn render_notifications(mut notices: Subscription) {
    let mut filter = render::NoticeFilter::default();
    while let Some(notice) = notices.recv().await {
        if filter.admit(&notice, time::Instant::now()) {
            println!("{}", render::notice_line(&notice));
        }
    }
}
