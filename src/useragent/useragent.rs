use super::session::{InvitePhase, Session};
use crate::callrecord::{CallState, CallStore, Correspondence, Direction};
use crate::callservice::{CallService, CreateCall, MemoryCallBackend};
use crate::config::{MobileCallMethod, Mode, RingtoneConfig, VoipSettings};
use crate::event::{EventSender, Notifier, SessionEvent};
use crate::media::{AudioSink, MediaConstraints, MediaError, NullAudioSink, RemoteAudio};
use crate::ringtone::{Cue, RingtonePlayer};
use crate::signaling::{Dialog, DialogState, SignalEvent, SignalingEngine, SignalingError};
use crate::utils::clean_phone_number;
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MSG_NO_MEDIA_SUPPORT: &str = "This environment does not support some of the features \
     required for VoIP to work. Please check that a signaling engine is configured.";
const MSG_SERVER_MISSING: &str =
    "PBX or WebSocket address is missing. Please check your settings.";
const MSG_CREDENTIALS_MISSING: &str =
    "Your login details are not set correctly. Please contact your administrator.";
const MSG_CONNECTING: &str = "Connecting…";
const MSG_START_FAILED: &str = "The user agent could not be started. The WebSocket server URL \
     may be incorrect. Please have an administrator check the WebSocket server URL in the \
     general settings.";
const MSG_CONNECTION_LOST: &str = "The WebSocket connection to the server has been lost. \
     Attempting to reestablish the connection…";
const MSG_MICROPHONE_REMINDER: &str = "Please accept the use of the microphone.";
const MSG_CALL_IN_PROGRESS: &str = "A call is already in progress.";

/// How long the simulated far end rings before answering in demo mode.
const DEMO_ANSWER_DELAY: Duration = Duration::from_secs(3);

/// User actions entering the agent inbox.
#[derive(Debug)]
pub enum Command {
    PlaceCall { data: CreateCall },
    Accept,
    Reject,
    Hangup { activity_done: bool },
    Transfer { number: String },
    SwitchInputDevice { device_id: String },
    SetMute { mute: bool },
    ToggleMute,
    SetAutoCallMode { enabled: bool },
    AttemptReconnect { attempt: u32 },
}

/// Everything the agent reacts to, in arrival order.
#[derive(Debug)]
pub enum Input {
    Command(Command),
    Signal(SignalEvent),
}

pub type InputSender = UnboundedSender<Input>;

/// Cloneable handle used by the UI layer and the signaling engine to
/// feed the agent inbox.
#[derive(Clone)]
pub struct UserAgentHandle {
    sender: InputSender,
}

impl UserAgentHandle {
    pub fn command(&self, command: Command) -> Result<()> {
        self.sender
            .send(Input::Command(command))
            .map_err(|_| anyhow!("user agent stopped"))
    }

    pub fn signal(&self, event: SignalEvent) -> Result<()> {
        self.sender
            .send(Input::Signal(event))
            .map_err(|_| anyhow!("user agent stopped"))
    }
}

pub struct UserAgentBuilder {
    settings: Option<VoipSettings>,
    engine: Option<Arc<dyn SignalingEngine>>,
    service: Option<Arc<CallService>>,
    ringtones: Option<RingtoneConfig>,
    audio_sink: Option<Arc<dyn AudioSink>>,
    event_sender: Option<EventSender>,
    cancel_token: Option<CancellationToken>,
}

impl UserAgentBuilder {
    pub fn new() -> Self {
        Self {
            settings: None,
            engine: None,
            service: None,
            ringtones: None,
            audio_sink: None,
            event_sender: None,
            cancel_token: None,
        }
    }

    pub fn with_settings(mut self, settings: VoipSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn SignalingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_service(mut self, service: Arc<CallService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_ringtones(mut self, ringtones: RingtoneConfig) -> Self {
        self.ringtones = Some(ringtones);
        self
    }

    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn build(self) -> UserAgent {
        let settings = self.settings.unwrap_or_default();
        let events = self
            .event_sender
            .unwrap_or_else(|| tokio::sync::broadcast::channel(128).0);
        let service = self.service.unwrap_or_else(|| {
            Arc::new(CallService::new(
                Arc::new(MemoryCallBackend::new()),
                Arc::new(CallStore::new()),
            ))
        });
        let sink = self.audio_sink.unwrap_or_else(|| Arc::new(NullAudioSink));
        let ringtone = RingtonePlayer::new(self.ringtones.unwrap_or_default(), sink.clone());
        let (inbox, inbox_rx) = unbounded_channel();
        UserAgent {
            settings,
            engine: self.engine,
            service,
            ringtone,
            remote_audio: RemoteAudio::new(sink),
            notifier: Arc::new(Notifier::new(events)),
            token: self.cancel_token.unwrap_or_default(),
            session: None,
            next_seq: 0,
            reconnecting: false,
            auto_call_mode: false,
            preferred_input_device: None,
            inbox,
            inbox_rx,
        }
    }
}

/// Owns the single call session and serializes every transition through
/// one inbox: signaling events, media results, timers and user commands
/// are handled one at a time, in arrival order.
pub struct UserAgent {
    pub(super) settings: VoipSettings,
    pub(super) engine: Option<Arc<dyn SignalingEngine>>,
    pub(super) service: Arc<CallService>,
    pub(super) ringtone: RingtonePlayer,
    pub(super) remote_audio: RemoteAudio,
    pub(super) notifier: Arc<Notifier>,
    pub(super) token: CancellationToken,
    pub(super) session: Option<Session>,
    pub(super) next_seq: u64,
    pub(super) reconnecting: bool,
    pub(super) auto_call_mode: bool,
    pub(super) preferred_input_device: Option<String>,
    pub(super) inbox: InputSender,
    inbox_rx: UnboundedReceiver<Input>,
}

impl UserAgent {
    pub fn handle(&self) -> UserAgentHandle {
        UserAgentHandle {
            sender: self.inbox.clone(),
        }
    }

    pub fn notifier(&self) -> Arc<Notifier> {
        self.notifier.clone()
    }

    pub fn service(&self) -> Arc<CallService> {
        self.service.clone()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub async fn serve(&mut self) -> Result<()> {
        self.init().await;
        let token = self.token.clone();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("cancelled");
                    break;
                }
                input = self.inbox_rx.recv() => {
                    match input {
                        Some(Input::Command(command)) => self.handle_command(command).await,
                        Some(Input::Signal(event)) => self.handle_signal(event).await,
                        None => break,
                    }
                }
            }
        }
        info!("stopping");
        Ok(())
    }

    async fn init(&mut self) {
        if self.settings.mode != Mode::Prod {
            info!("demo mode, signaling engine disabled");
            return;
        }
        if let Some(message) = self.precondition_error() {
            self.notifier.trigger_error(message, false);
            return;
        }
        let engine = match self.engine.clone() {
            Some(engine) => engine,
            None => return,
        };
        self.notifier.trigger_error(MSG_CONNECTING, false);
        if let Err(e) = engine.connect().await {
            error!("engine start failed: {}", e);
            self.notifier.trigger_error(MSG_START_FAILED, false);
            return;
        }
        match engine.register().await {
            Ok(()) => {
                info!("registration started");
                self.notifier.resolve_error();
            }
            Err(e) => {
                warn!("registration failed: {}", e);
                self.notifier
                    .trigger_error(format!("Registration failed: {}", e), false);
            }
        }
    }

    fn precondition_error(&self) -> Option<&'static str> {
        if self.settings.mode == Mode::Demo {
            return None;
        }
        if self.engine.is_none() {
            return Some(MSG_NO_MEDIA_SUPPORT);
        }
        if !self.settings.server_configured() {
            return Some(MSG_SERVER_MISSING);
        }
        if !self.settings.credentials_set() {
            return Some(MSG_CREDENTIALS_MISSING);
        }
        None
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn session_matches(&self, dialog_id: &str) -> bool {
        self.session
            .as_ref()
            .and_then(|session| session.dialog_id.as_deref())
            .map(|id| id == dialog_id)
            .unwrap_or(false)
    }

    fn media_constraints(&self) -> MediaConstraints {
        MediaConstraints::audio_only(self.preferred_input_device.as_deref())
    }

    fn sip_uri(&self, phone_number: &str) -> Result<rsip::Uri> {
        let sanitized = clean_phone_number(phone_number);
        rsip::Uri::try_from(format!("sip:{}@{}", sanitized, self.settings.pbx_address))
            .map_err(|e| anyhow!("invalid SIP uri for {}: {}", phone_number, e))
    }

    fn call_action_failed(&self, operation: &str, error: anyhow::Error) {
        // remote call-control failures never stop local teardown; the
        // user gets a toast and the session proceeds
        error!(operation, "call action failed: {:?}", error);
        self.notifier.trigger_error(
            format!("The call record could not be updated ({}).", operation),
            true,
        );
    }

    async fn handle_command(&mut self, command: Command) {
        debug!(?command, "command");
        match command {
            Command::PlaceCall { data } => self.place_call(data).await,
            Command::Accept => self.accept_incoming_call().await,
            Command::Reject => self.reject_incoming_call().await,
            Command::Hangup { activity_done } => self.hangup(activity_done).await,
            Command::Transfer { number } => self.transfer(&number).await,
            Command::SwitchInputDevice { device_id } => self.switch_input_device(device_id).await,
            Command::SetMute { mute } => self.set_mute(mute),
            Command::ToggleMute => self.toggle_mute(),
            Command::SetAutoCallMode { enabled } => self.auto_call_mode = enabled,
            Command::AttemptReconnect { attempt } => self.attempt_reconnection(attempt).await,
        }
    }

    async fn handle_signal(&mut self, event: SignalEvent) {
        debug!(?event, "signal");
        match event {
            SignalEvent::IncomingInvite { dialog } => self.on_incoming_invite(dialog).await,
            SignalEvent::TransportDisconnected { error } => {
                self.on_transport_disconnected(error).await
            }
            SignalEvent::InviteCanceled { dialog_id } => {
                if self.session_matches(&dialog_id) {
                    self.on_invite_canceled().await;
                }
            }
            SignalEvent::Progress { dialog_id, status } => {
                if self.session_matches(&dialog_id) {
                    self.on_outgoing_progress(status);
                }
            }
            SignalEvent::Accepted { dialog_id } => {
                if self.session_matches(&dialog_id) {
                    self.on_outgoing_accepted().await;
                }
            }
            SignalEvent::Rejected {
                dialog_id,
                status,
                reason,
            } => {
                if self.session_matches(&dialog_id) {
                    self.on_outgoing_rejected(status, reason).await;
                }
            }
            SignalEvent::ReferAccepted { dialog_id } => {
                if self.session_matches(&dialog_id) {
                    self.on_refer_accepted().await;
                }
            }
            SignalEvent::StateChanged { dialog_id, state } => {
                if self.session_matches(&dialog_id) {
                    self.on_state_changed(state);
                }
            }
            SignalEvent::RemoteTrackAdded { dialog_id } => {
                if self.session_matches(&dialog_id) {
                    self.attach_remote_audio();
                }
            }
            SignalEvent::Bye { dialog_id } => self.on_bye(&dialog_id).await,
            SignalEvent::MediaAcquired { dialog_id } => {
                if self.session_matches(&dialog_id) {
                    self.on_media_acquired().await;
                }
            }
            SignalEvent::MediaFailed { dialog_id, error } => {
                if self.session_matches(&dialog_id) {
                    self.on_media_failed(error).await;
                }
            }
        }
    }

    async fn place_call(&mut self, data: CreateCall) {
        if self.session.is_some() {
            self.notifier.trigger_error(MSG_CALL_IN_PROGRESS, true);
            return;
        }
        if let Some(message) = self.precondition_error() {
            self.notifier.trigger_error(message, false);
            return;
        }
        match self.settings.mobile_call_method {
            MobileCallMethod::Voip => {}
            MobileCallMethod::Phone | MobileCallMethod::Ask => {
                self.notifier.emit(SessionEvent::NativeDialRequested {
                    phone_number: data.phone_number.clone(),
                    ask: self.settings.mobile_call_method == MobileCallMethod::Ask,
                });
                return;
            }
        }
        let call = match self.service.create(data).await {
            Ok(call) => call,
            Err(e) => {
                self.call_action_failed("create", e);
                return;
            }
        };
        info!(
            call_id = call.id,
            phone_number = call.phone_number,
            "placing call"
        );
        self.notifier.emit(SessionEvent::Dialing {
            phone_number: call.phone_number.clone(),
        });
        self.notifier
            .emit(SessionEvent::CallAdded { call: call.clone() });
        self.notifier.emit(SessionEvent::CorrespondenceSelected {
            correspondence: Correspondence::of_call(call.clone()),
        });

        let seq = self.next_seq();
        let mut session = Session::outgoing(seq, call.id.clone());
        self.ringtone.play(Cue::Ringback);
        if self.settings.mode == Mode::Prod {
            self.session = Some(session);
            self.invite(&call.phone_number).await;
        } else {
            // simulated far end answers after a fixed ring
            let dialog_id = format!("demo-{}", seq);
            session.dialog_id = Some(dialog_id.clone());
            let inbox = self.inbox.clone();
            session.demo_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(DEMO_ANSWER_DELAY).await;
                inbox
                    .send(Input::Signal(SignalEvent::Accepted { dialog_id }))
                    .ok();
            }));
            self.session = Some(session);
        }
    }

    async fn invite(&mut self, phone_number: &str) {
        let engine = match self.engine.clone() {
            Some(engine) => engine,
            None => return,
        };
        let callee = if self.settings.will_call_from_another_device() {
            // ring the relay device first; the real destination becomes
            // the transfer target once the relay leg is up
            if let Some(session) = self.session.as_mut() {
                session.transfer_target = Some(phone_number.to_string());
            }
            self.settings
                .external_device_number
                .clone()
                .unwrap_or_default()
        } else {
            phone_number.to_string()
        };
        let uri = match self.sip_uri(&callee) {
            Ok(uri) => uri,
            Err(e) => {
                error!("invite failed: {}", e);
                self.notifier.trigger_error(
                    format!(
                        "An error occurred trying to invite the following number: {}\n\nError: {}",
                        phone_number, e
                    ),
                    false,
                );
                return;
            }
        };
        let constraints = self.media_constraints();
        match engine.invite(&uri, &constraints).await {
            Ok(dialog) => match self.session.as_mut() {
                Some(session) => {
                    session.dialog_id = Some(dialog.id());
                    session.dialog = Some(dialog);
                }
                None => {
                    // a hangup outran the invite; drop the fresh leg
                    dialog.cancel().await.ok();
                }
            },
            Err(SignalingError::PermissionDenied) => {
                // the permission prompt already told the user
            }
            Err(e) => {
                error!("invite failed: {}", e);
                self.notifier.trigger_error(
                    format!(
                        "An error occurred trying to invite the following number: {}\n\nError: {}",
                        phone_number, e
                    ),
                    false,
                );
            }
        }
    }

    async fn accept_incoming_call(&mut self) {
        let constraints = self.media_constraints();
        let dialog = match self.session.as_ref() {
            Some(session)
                if session.direction == Direction::Incoming
                    && session.phase == InvitePhase::Ringing =>
            {
                session.dialog.clone()
            }
            _ => {
                debug!("accept without a ringing incoming session");
                return;
            }
        };
        self.ringtone.stop();
        if let Some(dialog) = dialog {
            if let Err(e) = dialog.accept(&constraints).await {
                error!("accept failed: {}", e);
            }
        }
        self.notifier.trigger_error(MSG_MICROPHONE_REMINDER, false);
    }

    async fn reject_incoming_call(&mut self) {
        let valid = matches!(
            self.session.as_ref(),
            Some(session)
                if session.direction == Direction::Incoming
                    && session.phase == InvitePhase::Ringing
        );
        if !valid {
            debug!("reject without a ringing incoming session");
            return;
        }
        let session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        self.ringtone.stop();
        if let Some(dialog) = session.dialog.clone() {
            if let Err(e) = dialog.reject(rsip::StatusCode::Decline).await {
                warn!("decline failed: {}", e);
            }
        }
        match self.service.reject(&session.call_id).await {
            Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
            Err(e) => self.call_action_failed("reject", e),
        }
    }

    /// Hang up whatever is in flight. Idempotent: a second hangup finds
    /// no session and does nothing.
    async fn hangup(&mut self, activity_done: bool) {
        let mut session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        self.ringtone.stop();
        session.teardown();
        self.remote_audio.clear();
        if let Some(dialog) = session.dialog.clone() {
            match dialog.state() {
                DialogState::Initial | DialogState::Establishing => {
                    if let Err(e) = dialog.cancel().await {
                        warn!("cancel failed: {}", e);
                    }
                }
                DialogState::Established => {
                    if let Err(e) = dialog.bye().await {
                        warn!("bye failed: {}", e);
                    }
                }
                DialogState::Terminating | DialogState::Terminated => {}
            }
        }
        match self.service.store().get(&session.call_id) {
            Some(call) if call.state == CallState::Calling => {
                match self.service.abort(&call.id).await {
                    Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
                    Err(e) => self.call_action_failed("abort", e),
                }
            }
            Some(call) if call.state == CallState::Ongoing => {
                match self.service.end(&call, activity_done).await {
                    Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
                    Err(e) => self.call_action_failed("end", e),
                }
            }
            _ => {}
        }
        if self.auto_call_mode {
            self.notifier.emit(SessionEvent::AutoDialAdvance);
        }
    }

    async fn transfer(&mut self, number: &str) {
        if self.settings.mode == Mode::Demo {
            self.hangup(true).await;
            return;
        }
        let dialog = match self.session.as_ref() {
            Some(session) if session.phase == InvitePhase::Established => session.dialog.clone(),
            _ => {
                debug!("transfer outside an established session");
                return;
            }
        };
        let target = match self.sip_uri(number) {
            Ok(uri) => uri,
            Err(e) => {
                error!("transfer target invalid: {}", e);
                return;
            }
        };
        if let Some(dialog) = dialog {
            if let Err(e) = dialog.refer(&target).await {
                warn!("refer failed: {}", e);
            }
        }
    }

    async fn switch_input_device(&mut self, device_id: String) {
        let media = self
            .session
            .as_ref()
            .and_then(|session| session.dialog.as_ref())
            .and_then(|dialog| dialog.media());
        let media = match media {
            Some(media) => media,
            None => return,
        };
        self.preferred_input_device = Some(device_id);
        let constraints = self.media_constraints();
        if let Err(e) = media.replace_input(&constraints).await {
            warn!("input device switch failed: {}", e);
        }
    }

    fn set_mute(&mut self, mute: bool) {
        let session = match self.session.as_mut() {
            Some(session) => session,
            None => return,
        };
        session.muted = mute;
        // without negotiated media there is nothing to silence
        if let Some(media) = session.dialog.as_ref().and_then(|dialog| dialog.media()) {
            media.set_senders_enabled(!mute);
        }
    }

    fn toggle_mute(&mut self) {
        let mute = match self.session.as_ref() {
            Some(session) => !session.muted,
            None => return,
        };
        self.set_mute(mute);
    }

    async fn on_incoming_invite(&mut self, dialog: Arc<dyn Dialog>) {
        if self.session.is_some() {
            // never queue a second call
            if let Err(e) = dialog.reject(rsip::StatusCode::BusyHere).await {
                warn!("busy reject failed: {}", e);
            }
            return;
        }
        if self.settings.auto_reject_incoming_calls {
            if let Err(e) = dialog.reject(rsip::StatusCode::NotAcceptableHere).await {
                warn!("auto reject failed: {}", e);
            }
            return;
        }
        let phone_number = dialog.remote_user().unwrap_or_default();
        info!(phone_number, "incoming invite");
        let call = match self.service.create(CreateCall::incoming(phone_number)).await {
            Ok(call) => call,
            Err(e) => {
                self.call_action_failed("create", e);
                dialog
                    .reject(rsip::StatusCode::ServerInternalError)
                    .await
                    .ok();
                return;
            }
        };
        self.notifier
            .emit(SessionEvent::CallAdded { call: call.clone() });
        self.notifier.emit(SessionEvent::CorrespondenceSelected {
            correspondence: Correspondence::of_call(call.clone()),
        });
        let seq = self.next_seq();
        self.session = Some(Session::incoming(seq, call.id, dialog));
        self.ringtone.play(Cue::Incoming);
    }

    async fn on_invite_canceled(&mut self) {
        let session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        self.ringtone.stop();
        if let Some(dialog) = session.dialog.clone() {
            if let Err(e) = dialog.reject(rsip::StatusCode::RequestTerminated).await {
                warn!("reject failed: {}", e);
            }
        }
        match self.service.miss(&session.call_id).await {
            Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
            Err(e) => self.call_action_failed("miss", e),
        }
    }

    fn on_outgoing_progress(&mut self, status: rsip::StatusCode) {
        let code = u16::from(status);
        if code == 180 || code == 183 {
            self.ringtone.play(Cue::Ringback);
            if let Some(session) = self.session.as_mut() {
                session.phase = InvitePhase::Ringing;
            }
        }
    }

    async fn on_outgoing_accepted(&mut self) {
        self.ringtone.stop();
        let pending_transfer = match self.session.as_mut() {
            Some(session) => {
                session.phase = InvitePhase::Established;
                session.transfer_target.clone()
            }
            None => return,
        };
        if let Some(target) = pending_transfer {
            // a relayed call hands over to the real destination instead
            // of counting as connected here
            self.transfer(&target).await;
            return;
        }
        self.start_call().await;
    }

    async fn on_outgoing_rejected(&mut self, status: rsip::StatusCode, reason: String) {
        self.ringtone.stop();
        let code = u16::from(status);
        if code == 487 {
            // our own cancellation; hangup already tore the session down
            return;
        }
        let text = match code {
            404 | 488 | 603 => format!(
                "The number is incorrect, the user credentials could be wrong, or the \
                 connection cannot be made. Please check your configuration.\n\
                 (Reason received: {})",
                reason
            ),
            486 | 600 => {
                "The person you are trying to contact is currently unavailable.".to_string()
            }
            _ => format!("Call rejected (reason: “{}”)", reason),
        };
        self.notifier.trigger_error(text, true);
        let session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        match self.service.reject(&session.call_id).await {
            Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
            Err(e) => self.call_action_failed("reject", e),
        }
    }

    async fn on_refer_accepted(&mut self) {
        let session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        if let Some(dialog) = session.dialog.clone() {
            if let Err(e) = dialog.bye().await {
                warn!("bye after refer failed: {}", e);
            }
        }
        self.remote_audio.clear();
        if let Some(call) = self.service.store().get(&session.call_id) {
            match self.service.end(&call, true).await {
                Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
                Err(e) => self.call_action_failed("end", e),
            }
        }
    }

    fn on_state_changed(&mut self, state: DialogState) {
        match state {
            DialogState::Established => {
                if let Some(session) = self.session.as_mut() {
                    session.phase = InvitePhase::Established;
                }
                self.attach_remote_audio();
            }
            DialogState::Initial
            | DialogState::Establishing
            | DialogState::Terminating
            | DialogState::Terminated => {}
        }
    }

    fn attach_remote_audio(&mut self) {
        let stream = self
            .session
            .as_ref()
            .and_then(|session| session.dialog.as_ref())
            .and_then(|dialog| dialog.media())
            .and_then(|media| media.remote_stream());
        if let Some(stream) = stream {
            self.remote_audio.attach(&stream);
        }
    }

    async fn on_bye(&mut self, dialog_id: &str) {
        if !self.session_matches(dialog_id) {
            // already torn down locally
            return;
        }
        let session = match self.session.take() {
            Some(session) => session,
            None => return,
        };
        if let Some(call) = self.service.store().get(&session.call_id) {
            match self.service.end(&call, true).await {
                Ok(call) => self.notifier.emit(SessionEvent::CallUpdated { call }),
                Err(e) => self.call_action_failed("end", e),
            }
        }
        self.remote_audio.clear();
        if self.auto_call_mode {
            self.notifier.emit(SessionEvent::AutoDialAdvance);
        }
    }

    async fn on_media_acquired(&mut self) {
        self.notifier.resolve_error();
        let direction = match self.session.as_ref() {
            Some(session) => session.direction,
            None => return,
        };
        match direction {
            Direction::Outgoing => self.ringtone.play(Cue::Dial),
            Direction::Incoming => self.start_call().await,
        }
    }

    async fn on_media_failed(&mut self, error: MediaError) {
        error!("media acquisition failed: {}", error);
        self.notifier.trigger_error(error.user_message(), true);
        let direction = match self.session.as_ref() {
            Some(session) => session.direction,
            None => return,
        };
        match direction {
            Direction::Outgoing => self.hangup(true).await,
            Direction::Incoming => self.reject_incoming_call().await,
        }
    }

    async fn on_transport_disconnected(&mut self, error: Option<String>) {
        let error = match error {
            Some(error) => error,
            // clean shutdown
            None => return,
        };
        error!("transport disconnected: {}", error);
        self.notifier.trigger_error(MSG_CONNECTION_LOST, false);
        self.attempt_reconnection(0).await;
    }

    /// Begin server-side timing and the local elapsed ticker.
    async fn start_call(&mut self) {
        let (seq, call_id) = match self.session.as_ref() {
            Some(session) => (session.seq, session.call_id.clone()),
            None => return,
        };
        match self.service.start(&call_id).await {
            Ok(call) => {
                self.notifier.emit(SessionEvent::CallUpdated { call });
                self.spawn_ticker(seq, call_id);
            }
            Err(e) => self.call_action_failed("start", e),
        }
    }

    fn spawn_ticker(&mut self, seq: u64, call_id: String) {
        // re-validate the session after the await in start_call
        let session = match self.session.as_mut() {
            Some(session) if session.seq == seq => session,
            _ => return,
        };
        let token = self.token.child_token();
        session.ticker = Some(token.clone());
        let store = self.service.store().clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        store.update(&call_id, |call| {
                            if let Some(started_at) = call.started_at {
                                call.elapsed_secs =
                                    (Utc::now() - started_at).num_seconds().max(0) as u64;
                            }
                        });
                    }
                }
            }
        });
    }
}
