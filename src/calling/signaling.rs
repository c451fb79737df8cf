//! Call signaling state machine.
//!
//! Invites, answers and hang-ups travel over the message channel as
//! `video:*` events. Media needs a per-call credential from the backend and
//! a join of the shared room. The caller joins right after inviting without
//! waiting for the callee to accept.

use std::future::Future;

use super::room::{check_scope, MediaConnector, MediaRoom, RoomCredential, RoomEvent};
use super::{CallSession, CallState, Peer};
use crate::channel::{ChannelHandle, OutboundEvent};
use crate::error::ClientError;
use crate::models::{AcceptCall, CallEvent, EndCall, IncomingCall, RejectCall, TokenRequest};
use crate::participant::ChatParticipantAdapter;

pub const DECLINE_REASON: &str = "Call declined";
pub const NO_ANSWER_REASON: &str = "No answer";
const REJECTED_REASON: &str = "Call was rejected";
const ENDED_REASON: &str = "Call ended";

/// Outbound path for signaling events.
pub trait SignalSink: Send + Sync {
    fn emit(&self, event: &OutboundEvent) -> Result<(), ClientError>;
}

impl SignalSink for ChannelHandle {
    fn emit(&self, event: &OutboundEvent) -> Result<(), ClientError> {
        ChannelHandle::emit(self, event)
    }
}

/// Issues media-room credentials.
pub trait CredentialProvider: Send + Sync {
    fn request_credential(
        &self,
        request: &TokenRequest,
    ) -> impl Future<Output = Result<RoomCredential, ClientError>> + Send;
}

/// Drives one identity's call session.
pub struct CallController<S, P, M>
where
    S: SignalSink,
    P: CredentialProvider,
    M: MediaConnector,
{
    participant: Box<dyn ChatParticipantAdapter>,
    sink: S,
    provider: P,
    connector: M,
    session: CallSession,
    room: Option<M::Room>,
}

impl<S, P, M> CallController<S, P, M>
where
    S: SignalSink,
    P: CredentialProvider,
    M: MediaConnector,
{
    pub fn new(
        participant: Box<dyn ChatParticipantAdapter>,
        sink: S,
        provider: P,
        connector: M,
    ) -> Self {
        Self {
            participant,
            sink,
            provider,
            connector,
            session: CallSession::default(),
            room: None,
        }
    }

    pub fn session(&self) -> &CallSession {
        &self.session
    }

    pub fn state(&self) -> CallState {
        self.session.state
    }

    pub fn room(&self) -> Option<&M::Room> {
        self.room.as_ref()
    }

    /// Route further signaling through `sink`, e.g. after a reconnect.
    pub fn replace_sink(&mut self, sink: S) {
        self.sink = sink;
    }

    /// Ring `receiver_id` about `conversation_id` and join the room right away.
    pub async fn start_call(
        &mut self,
        conversation_id: &str,
        receiver_id: &str,
    ) -> Result<(), ClientError> {
        let conversation_id = conversation_id.trim();
        let receiver_id = receiver_id.trim();
        if conversation_id.is_empty() {
            return Err(ClientError::Validation("conversation id is required".into()));
        }
        if receiver_id.is_empty() {
            return Err(ClientError::Validation("peer id is required".into()));
        }
        if receiver_id == self.participant.identity().user_id {
            return Err(ClientError::Validation("cannot call yourself".into()));
        }
        if !self.session.state.is_free() {
            return Err(ClientError::Validation(format!(
                "a call is already {}",
                self.session.state.as_str()
            )));
        }

        let invite = self.participant.call_invite(conversation_id, receiver_id);
        self.session = CallSession {
            state: CallState::Outgoing,
            room_name: Some(invite.room_name.clone()),
            peer: Some(Peer {
                user_id: receiver_id.to_string(),
                name: None,
            }),
            ..self.fresh_session()
        };
        tracing::info!("Calling {} in {}", receiver_id, invite.room_name);

        if let Err(e) = self.sink.emit(&OutboundEvent::CallUser(invite)) {
            return Err(self.fail(e));
        }
        self.connect_room().await
    }

    /// Apply a remote signaling event.
    pub fn handle_remote(&mut self, event: CallEvent) -> CallState {
        match event {
            CallEvent::Incoming(call) => self.on_incoming(call),
            CallEvent::Accepted { room_name } => {
                if self.session.state.is_active() {
                    tracing::info!(
                        "Peer accepted call in {}",
                        room_name.as_deref().unwrap_or("current room")
                    );
                }
            }
            CallEvent::Rejected { reason } => {
                if self.session.state.is_active() {
                    let reason = reason.unwrap_or_else(|| REJECTED_REASON.to_string());
                    tracing::info!("Call rejected: {}", reason);
                    self.finish(reason);
                }
            }
            CallEvent::Ended => match self.session.state {
                CallState::Incoming | CallState::Outgoing | CallState::Connecting
                | CallState::Connected => {
                    tracing::info!("Remote ended the call");
                    self.finish(ENDED_REASON.to_string());
                }
                _ => tracing::debug!("call-ended while {}", self.session.state.as_str()),
            },
        }
        self.session.state
    }

    fn on_incoming(&mut self, call: IncomingCall) {
        if !self.session.state.is_free() {
            // No precedence is defined for a second call; keep the current one.
            tracing::warn!(
                "Ignoring incoming call from {} while {}",
                call.caller_id,
                self.session.state.as_str()
            );
            return;
        }
        if call.caller_id == self.participant.identity().user_id {
            tracing::debug!("Ignoring our own call invite");
            return;
        }
        tracing::info!(
            "Incoming call from {} in {}",
            call.caller_name.as_deref().unwrap_or(&call.caller_id),
            call.room_name
        );
        self.session = CallSession {
            state: CallState::Incoming,
            room_name: Some(call.room_name),
            incoming: true,
            peer: Some(Peer {
                user_id: call.caller_id,
                name: call.caller_name,
            }),
            ..self.fresh_session()
        };
    }

    /// Answer the ringing call and join its room.
    pub async fn accept(&mut self) -> Result<(), ClientError> {
        let (room_name, caller_id) = self.ringing()?;
        let accept = AcceptCall {
            room_name,
            caller_id,
            receiver_id: self.participant.identity().user_id.clone(),
        };
        if let Err(e) = self.sink.emit(&OutboundEvent::AcceptCall(accept)) {
            return Err(self.fail(e));
        }
        self.connect_room().await
    }

    pub fn decline(&mut self) -> Result<(), ClientError> {
        self.decline_with_reason(DECLINE_REASON)
    }

    /// Reject the ringing call. No room is joined; the session returns to idle.
    pub fn decline_with_reason(&mut self, reason: &str) -> Result<(), ClientError> {
        let (room_name, caller_id) = self.ringing()?;
        tracing::info!("Declining call from {}: {}", caller_id, reason);
        let reject = RejectCall {
            room_name,
            caller_id,
            reason: reason.to_string(),
        };
        let sent = self.sink.emit(&OutboundEvent::RejectCall(reject));
        self.session = self.fresh_session();
        sent
    }

    /// End whatever is going on. Ending an idle or ended session does nothing.
    pub fn hang_up(&mut self) -> Result<(), ClientError> {
        match self.session.state {
            CallState::Idle | CallState::Ended => Ok(()),
            CallState::Incoming => self.decline(),
            CallState::Error => {
                self.dismiss();
                Ok(())
            }
            CallState::Outgoing | CallState::Connecting | CallState::Connected => {
                if let Some(room_name) = self.session.room_name.clone() {
                    let end = EndCall {
                        room_name,
                        user_id: self.participant.identity().user_id.clone(),
                    };
                    if let Err(e) = self.sink.emit(&OutboundEvent::EndCall(end)) {
                        tracing::warn!("Failed to signal end of call: {}", e);
                    }
                }
                self.finish(ENDED_REASON.to_string());
                Ok(())
            }
        }
    }

    /// Clear an error or ended banner.
    pub fn dismiss(&mut self) {
        if matches!(self.session.state, CallState::Error | CallState::Ended) {
            self.release();
            self.session = self.fresh_session();
        }
    }

    /// Flip the local microphone. Returns the new setting.
    pub fn toggle_audio(&mut self) -> bool {
        self.session.audio_enabled = !self.session.audio_enabled;
        let enabled = self.session.audio_enabled;
        if let Some(room) = self.room.as_mut() {
            room.set_audio_enabled(enabled);
        }
        enabled
    }

    /// Flip the local camera. Returns the new setting.
    pub fn toggle_video(&mut self) -> bool {
        self.session.video_enabled = !self.session.video_enabled;
        let enabled = self.session.video_enabled;
        if let Some(room) = self.room.as_mut() {
            room.set_video_enabled(enabled);
        }
        enabled
    }

    /// Next membership change in the joined room. Never resolves while no
    /// room is joined or after the room stops reporting.
    pub async fn next_room_event(&mut self) -> RoomEvent {
        if let Some(room) = self.room.as_mut() {
            if let Some(event) = room.next_event().await {
                return event;
            }
        }
        std::future::pending().await
    }

    pub fn apply_room_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::ParticipantConnected(who) => self.participant_connected(&who),
            RoomEvent::ParticipantDisconnected(who) => self.participant_disconnected(&who),
        }
    }

    /// Media layer reports a remote participant joining the room.
    pub fn participant_connected(&mut self, identity: &str) {
        if self.session.state == CallState::Connected {
            self.session.remote_participant_count += 1;
            tracing::info!("{} joined the call", identity);
        }
    }

    pub fn participant_disconnected(&mut self, identity: &str) {
        if self.session.state == CallState::Connected {
            self.session.remote_participant_count =
                self.session.remote_participant_count.saturating_sub(1);
            tracing::info!("{} left the call", identity);
        }
    }

    fn ringing(&self) -> Result<(String, String), ClientError> {
        match (&self.session.state, &self.session.room_name, &self.session.peer) {
            (CallState::Incoming, Some(room), Some(peer)) => {
                Ok((room.clone(), peer.user_id.clone()))
            }
            _ => Err(ClientError::Validation("no incoming call".into())),
        }
    }

    async fn connect_room(&mut self) -> Result<(), ClientError> {
        let room_name = match self.session.room_name.clone() {
            Some(r) => r,
            None => return Err(self.fail(ClientError::Validation("no room to join".into()))),
        };
        self.session.state = CallState::Connecting;

        let me = self.participant.identity();
        let request = TokenRequest {
            room_name: room_name.clone(),
            user_id: me.user_id.clone(),
            user_name: me.name.clone(),
        };
        let credential = match self.provider.request_credential(&request).await {
            Ok(c) => c,
            Err(e) => return Err(self.fail(e)),
        };
        if let Err(e) = check_scope(&room_name, &credential) {
            return Err(self.fail(e));
        }

        let mut room = match self.connector.join(&room_name, &credential).await {
            Ok(room) => room,
            Err(e) => return Err(self.fail(e)),
        };
        if !self.session.audio_enabled {
            room.set_audio_enabled(false);
        }
        if !self.session.video_enabled {
            room.set_video_enabled(false);
        }

        tracing::info!("Call connected in {}", room.room_name());
        self.room = Some(room);
        self.session.state = CallState::Connected;
        Ok(())
    }

    /// Move to `Error`, keeping the message for display.
    fn fail(&mut self, e: ClientError) -> ClientError {
        tracing::error!("Call failed: {}", e);
        self.release();
        self.session.state = CallState::Error;
        self.session.error = Some(e.message().to_string());
        e
    }

    fn finish(&mut self, reason: String) {
        self.release();
        self.session.state = CallState::Ended;
        self.session.end_reason = Some(reason);
    }

    fn release(&mut self) {
        if let Some(mut room) = self.room.take() {
            room.disconnect();
        }
        self.session.remote_participant_count = 0;
    }

    /// Idle session that keeps the local media toggles.
    fn fresh_session(&self) -> CallSession {
        CallSession {
            audio_enabled: self.session.audio_enabled,
            video_enabled: self.session.video_enabled,
            ..CallSession::default()
        }
    }
}

/// One-line summary of a call session.
pub fn describe(session: &CallSession) -> String {
    let peer = session
        .peer
        .as_ref()
        .map(|p| p.name.clone().unwrap_or_else(|| p.user_id.clone()))
        .unwrap_or_else(|| "-".to_string());
    match (&session.state, &session.error, &session.end_reason) {
        (CallState::Error, Some(err), _) => format!("error: {}", err),
        (CallState::Ended, _, Some(reason)) => format!("ended ({})", reason),
        (CallState::Connected, _, _) => format!(
            "connected with {} [{} remote, mic {}, camera {}]",
            peer,
            session.remote_participant_count,
            if session.audio_enabled { "on" } else { "off" },
            if session.video_enabled { "on" } else { "off" },
        ),
        (state, _, _) => format!("{} {}", state.as_str(), peer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identity, Role};
    use crate::participant::{DoctorAdapter, PatientAdapter};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<OutboundEvent>>>,
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&'static str> {
            self.sent.lock().unwrap().iter().map(|e| e.name()).collect()
        }
    }

    impl SignalSink for RecordingSink {
        fn emit(&self, event: &OutboundEvent) -> Result<(), ClientError> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockProvider {
        requests: Arc<Mutex<Vec<TokenRequest>>>,
        fail: bool,
        wrong_room: bool,
    }

    impl CredentialProvider for MockProvider {
        async fn request_credential(
            &self,
            request: &TokenRequest,
        ) -> Result<RoomCredential, ClientError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ClientError::Signaling("Failed to get video token".into()));
            }
            let room_name = if self.wrong_room {
                "appointment_other".to_string()
            } else {
                request.room_name.clone()
            };
            Ok(RoomCredential {
                token: format!("tok-{}", request.user_id),
                room_name,
            })
        }
    }

    #[derive(Clone, Default)]
    struct MockConnector {
        log: Arc<Mutex<Vec<String>>>,
        members: Arc<Mutex<VecDeque<RoomEvent>>>,
    }

    struct MockRoom {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        members: Arc<Mutex<VecDeque<RoomEvent>>>,
    }

    impl MediaConnector for MockConnector {
        type Room = MockRoom;

        async fn join(
            &self,
            room_name: &str,
            credential: &RoomCredential,
        ) -> Result<MockRoom, ClientError> {
            check_scope(room_name, credential)?;
            self.log.lock().unwrap().push(format!("join {}", room_name));
            Ok(MockRoom {
                name: room_name.to_string(),
                log: Arc::clone(&self.log),
                members: Arc::clone(&self.members),
            })
        }
    }

    impl MediaRoom for MockRoom {
        fn room_name(&self) -> &str {
            &self.name
        }
        fn set_audio_enabled(&mut self, enabled: bool) {
            self.log.lock().unwrap().push(format!("audio {}", enabled));
        }
        fn set_video_enabled(&mut self, enabled: bool) {
            self.log.lock().unwrap().push(format!("video {}", enabled));
        }
        fn disconnect(&mut self) {
            self.log.lock().unwrap().push(format!("leave {}", self.name));
        }
        async fn next_event(&mut self) -> Option<RoomEvent> {
            let next = self.members.lock().unwrap().pop_front();
            match next {
                Some(event) => Some(event),
                None => std::future::pending().await,
            }
        }
    }

    type Controller = CallController<RecordingSink, MockProvider, MockConnector>;

    struct Harness {
        controller: Controller,
        sink: RecordingSink,
        provider: MockProvider,
        connector: MockConnector,
    }

    fn harness_with(participant: Box<dyn ChatParticipantAdapter>, provider: MockProvider) -> Harness {
        let sink = RecordingSink::default();
        let connector = MockConnector::default();
        let controller = CallController::new(
            participant,
            sink.clone(),
            provider.clone(),
            connector.clone(),
        );
        Harness {
            controller,
            sink,
            provider,
            connector,
        }
    }

    fn caller() -> Harness {
        harness_with(
            Box::new(PatientAdapter::new(Identity::new("u1", "Ann", Role::Patient))),
            MockProvider::default(),
        )
    }

    fn callee() -> Harness {
        harness_with(
            Box::new(DoctorAdapter::new(Identity::new("u2", "Dr. Grey", Role::Doctor))),
            MockProvider::default(),
        )
    }

    fn ring(h: &mut Harness) {
        let state = h.controller.handle_remote(CallEvent::Incoming(IncomingCall {
            room_name: "appointment_apt_2".into(),
            caller_id: "u1".into(),
            caller_name: Some("Ann".into()),
        }));
        assert_eq!(state, CallState::Incoming);
    }

    #[tokio::test]
    async fn test_caller_invites_and_joins_immediately() {
        let mut h = caller();
        h.controller.start_call("apt_2", "u2").await.unwrap();

        let sent = h.sink.sent.lock().unwrap().clone();
        match &sent[..] {
            [OutboundEvent::CallUser(invite)] => {
                assert_eq!(invite.room_name, "appointment_apt_2");
                assert_eq!(invite.caller_id, "u1");
                assert_eq!(invite.receiver_id, "u2");
            }
            other => panic!("unexpected emits {:?}", other),
        }

        let requests = h.provider.requests.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].room_name, "appointment_apt_2");
        assert_eq!(requests[0].user_id, "u1");
        assert_eq!(requests[0].user_name, "Ann");

        assert_eq!(h.controller.state(), CallState::Connected);
        assert_eq!(h.controller.room().unwrap().room_name(), "appointment_apt_2");
    }

    #[tokio::test]
    async fn test_callee_decline_skips_credential() {
        let mut h = callee();
        ring(&mut h);
        h.controller.decline().unwrap();

        let sent = h.sink.sent.lock().unwrap().clone();
        match &sent[..] {
            [OutboundEvent::RejectCall(reject)] => {
                assert_eq!(reject.room_name, "appointment_apt_2");
                assert_eq!(reject.caller_id, "u1");
                assert_eq!(reject.reason, DECLINE_REASON);
            }
            other => panic!("unexpected emits {:?}", other),
        }
        assert!(h.provider.requests.lock().unwrap().is_empty());
        assert_eq!(h.controller.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn test_both_sides_converge_on_one_room() {
        let mut a = caller();
        a.controller.start_call("apt_2", "u2").await.unwrap();
        let mut b = callee();
        ring(&mut b);
        b.controller.accept().await.unwrap();

        assert_eq!(
            a.controller.session().room_name,
            b.controller.session().room_name
        );
        assert_eq!(b.sink.names(), vec!["video:accept-call"]);
        match &b.sink.sent.lock().unwrap()[0] {
            OutboundEvent::AcceptCall(accept) => {
                assert_eq!(accept.caller_id, "u1");
                assert_eq!(accept.receiver_id, "u2");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(b.controller.state(), CallState::Connected);
        assert_eq!(b.provider.requests.lock().unwrap()[0].user_id, "u2");
    }

    #[tokio::test]
    async fn test_double_hang_up_is_a_no_op() {
        let mut h = caller();
        h.controller.start_call("apt_2", "u2").await.unwrap();
        h.controller.hang_up().unwrap();
        h.controller.hang_up().unwrap();

        assert_eq!(h.sink.names(), vec!["video:call-user", "video:end-call"]);
        assert_eq!(h.controller.state(), CallState::Ended);
        assert!(h.controller.room().is_none());
        assert!(h
            .connector
            .log
            .lock()
            .unwrap()
            .contains(&"leave appointment_apt_2".to_string()));

        // Hang-up on a fresh controller is fine too.
        let mut idle = callee();
        idle.controller.hang_up().unwrap();
        assert!(idle.sink.names().is_empty());
    }

    #[tokio::test]
    async fn test_remote_end_releases_without_emitting() {
        let mut h = callee();
        ring(&mut h);
        h.controller.accept().await.unwrap();
        h.controller.participant_connected("u1");
        assert_eq!(h.controller.session().remote_participant_count, 1);

        assert_eq!(h.controller.handle_remote(CallEvent::Ended), CallState::Ended);
        assert_eq!(h.sink.names(), vec!["video:accept-call"]);
        assert!(h.controller.room().is_none());
        assert_eq!(h.controller.session().remote_participant_count, 0);
    }

    #[tokio::test]
    async fn test_room_membership_drives_remote_count() {
        let mut h = callee();
        h.connector.members.lock().unwrap().extend([
            RoomEvent::ParticipantConnected("u1".into()),
            RoomEvent::ParticipantDisconnected("u1".into()),
        ]);
        // Nothing to report before a room is joined.
        let idle = tokio::time::timeout(Duration::from_millis(20), h.controller.next_room_event());
        assert!(idle.await.is_err());

        ring(&mut h);
        h.controller.accept().await.unwrap();
        let joined = h.controller.next_room_event().await;
        h.controller.apply_room_event(joined);
        assert_eq!(h.controller.session().remote_participant_count, 1);
        assert!(describe(h.controller.session()).contains("[1 remote"));

        let left = h.controller.next_room_event().await;
        h.controller.apply_room_event(left);
        assert_eq!(h.controller.session().remote_participant_count, 0);
    }

    #[tokio::test]
    async fn test_remote_rejection_ends_with_reason() {
        let mut h = caller();
        h.controller.start_call("apt_2", "u2").await.unwrap();
        h.controller
            .handle_remote(CallEvent::Rejected { reason: None });
        assert_eq!(h.controller.state(), CallState::Ended);
        assert_eq!(
            h.controller.session().end_reason.as_deref(),
            Some("Call was rejected")
        );
        assert!(h.controller.room().is_none());
    }

    #[tokio::test]
    async fn test_credential_failure_moves_to_error_until_dismissed() {
        let mut h = harness_with(
            Box::new(PatientAdapter::new(Identity::new("u1", "Ann", Role::Patient))),
            MockProvider {
                fail: true,
                ..Default::default()
            },
        );
        let err = h.controller.start_call("apt_2", "u2").await.unwrap_err();
        assert!(matches!(err, ClientError::Signaling(_)));
        assert_eq!(h.controller.state(), CallState::Error);
        assert_eq!(
            h.controller.session().error.as_deref(),
            Some("Failed to get video token")
        );

        h.controller.dismiss();
        assert_eq!(h.controller.state(), CallState::Idle);
        assert!(h.controller.session().error.is_none());
    }

    #[tokio::test]
    async fn test_credential_for_other_room_is_refused() {
        let mut h = harness_with(
            Box::new(PatientAdapter::new(Identity::new("u1", "Ann", Role::Patient))),
            MockProvider {
                wrong_room: true,
                ..Default::default()
            },
        );
        assert!(h.controller.start_call("apt_2", "u2").await.is_err());
        assert_eq!(h.controller.state(), CallState::Error);
        assert!(h.connector.log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_emit() {
        let mut h = caller();
        assert!(matches!(
            h.controller.start_call("", "u2").await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            h.controller.start_call("apt_2", " ").await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            h.controller.start_call("apt_2", "u1").await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(h.controller.accept().await, Err(ClientError::Validation(_))));
        assert!(h.sink.names().is_empty());
        assert_eq!(h.controller.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn test_second_incoming_call_is_ignored_while_busy() {
        let mut h = caller();
        h.controller.start_call("apt_2", "u2").await.unwrap();
        let state = h.controller.handle_remote(CallEvent::Incoming(IncomingCall {
            room_name: "appointment_apt_3".into(),
            caller_id: "u3".into(),
            caller_name: None,
        }));
        assert_eq!(state, CallState::Connected);
        assert_eq!(
            h.controller.session().room_name.as_deref(),
            Some("appointment_apt_2")
        );
    }

    #[tokio::test]
    async fn test_toggles_do_not_change_state() {
        let mut h = caller();
        assert!(!h.controller.toggle_audio());
        h.controller.start_call("apt_2", "u2").await.unwrap();
        assert!(!h.controller.toggle_video());
        assert_eq!(h.controller.state(), CallState::Connected);

        let log = h.connector.log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec!["join appointment_apt_2", "audio false", "video false"]
        );
        assert!(!h.controller.session().audio_enabled);
    }

    #[tokio::test]
    async fn test_every_state_has_a_way_out() {
        // Outgoing/connecting collapse into connected with instant mocks; the
        // remaining states are reached explicitly.
        let mut connected = caller();
        connected.controller.start_call("apt_2", "u2").await.unwrap();
        connected.controller.hang_up().unwrap();
        assert_eq!(connected.controller.state(), CallState::Ended);
        connected.controller.dismiss();
        assert_eq!(connected.controller.state(), CallState::Idle);

        let mut incoming = callee();
        ring(&mut incoming);
        incoming.controller.hang_up().unwrap();
        assert_eq!(incoming.controller.state(), CallState::Idle);

        let mut caller_gave_up = callee();
        ring(&mut caller_gave_up);
        caller_gave_up.controller.handle_remote(CallEvent::Ended);
        assert_eq!(caller_gave_up.controller.state(), CallState::Ended);

        let mut errored = harness_with(
            Box::new(PatientAdapter::new(Identity::new("u1", "Ann", Role::Patient))),
            MockProvider {
                fail: true,
                ..Default::default()
            },
        );
        let _ = errored.controller.start_call("apt_2", "u2").await;
        errored.controller.hang_up().unwrap();
        assert_eq!(errored.controller.state(), CallState::Idle);

        for h in [&connected, &incoming, &caller_gave_up, &errored] {
            assert!(h.controller.room().is_none());
        }
    }

    #[tokio::test]
    async fn test_replaced_sink_receives_later_signals() {
        let mut h = caller();
        h.controller.start_call("apt_2", "u2").await.unwrap();
        let fresh = RecordingSink::default();
        h.controller.replace_sink(fresh.clone());
        h.controller.hang_up().unwrap();
        assert_eq!(h.sink.names(), vec!["video:call-user"]);
        assert_eq!(fresh.names(), vec!["video:end-call"]);
    }

    #[test]
    fn test_describe() {
        let mut s = CallSession::default();
        s.state = CallState::Error;
        s.error = Some("Failed to get video token".into());
        assert_eq!(describe(&s), "error: Failed to get video token");
        s.state = CallState::Incoming;
        s.peer = Some(Peer {
            user_id: "u1".into(),
            name: Some("Ann".into()),
        });
        assert_eq!(describe(&s), "incoming Ann");
    }
}
