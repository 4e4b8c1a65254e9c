use crate::callrecord::CallStore;
use crate::callservice::{CallService, MemoryCallBackend};
use crate::config::{Mode, VoipSettings};
use crate::event::{EventReceiver, Notifier, SessionEvent};
use crate::media::{AudioSink, MediaChannel, MediaConstraints, MediaError, RemoteStream};
use crate::signaling::{Dialog, DialogId, DialogState, SignalingEngine, SignalingError};
use crate::useragent::{UserAgentBuilder, UserAgentHandle};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Play(String),
    Stop,
    Stream(String),
}

/// Records every sink operation so tests can assert cue sequences.
#[derive(Default)]
pub struct RecordingSink {
    ops: Mutex<Vec<SinkOp>>,
}

impl RecordingSink {
    pub fn ops(&self) -> Vec<SinkOp> {
        self.ops.lock().unwrap().clone()
    }

    pub fn plays(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Play(source) => Some(source),
                _ => None,
            })
            .collect()
    }

    pub fn last(&self) -> Option<SinkOp> {
        self.ops.lock().unwrap().last().cloned()
    }
}

impl AudioSink for RecordingSink {
    fn play(&self, source: &str, _volume: f32, _looped: bool) -> anyhow::Result<()> {
        self.ops.lock().unwrap().push(SinkOp::Play(source.to_string()));
        Ok(())
    }

    fn set_stream(&self, stream: &RemoteStream) -> anyhow::Result<()> {
        self.ops
            .lock()
            .unwrap()
            .push(SinkOp::Stream(stream.id.clone()));
        Ok(())
    }

    fn stop(&self) {
        self.ops.lock().unwrap().push(SinkOp::Stop);
    }
}

#[derive(Default)]
pub struct FakeMedia {
    pub enabled: Mutex<Vec<bool>>,
    pub replaced: Mutex<Vec<MediaConstraints>>,
    pub stream: Mutex<Option<RemoteStream>>,
}

#[async_trait]
impl MediaChannel for FakeMedia {
    fn set_senders_enabled(&self, enabled: bool) {
        self.enabled.lock().unwrap().push(enabled);
    }

    async fn replace_input(&self, constraints: &MediaConstraints) -> Result<(), MediaError> {
        self.replaced.lock().unwrap().push(constraints.clone());
        Ok(())
    }

    fn remote_stream(&self) -> Option<RemoteStream> {
        self.stream.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOp {
    Accept,
    Reject(u16),
    Cancel,
    Bye,
    Refer(String),
}

pub struct FakeDialog {
    id: DialogId,
    state: Mutex<DialogState>,
    ops: Mutex<Vec<DialogOp>>,
    media: Mutex<Option<Arc<FakeMedia>>>,
    remote_user: Option<String>,
}

impl FakeDialog {
    pub fn outgoing(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: Mutex::new(DialogState::Establishing),
            ops: Mutex::new(Vec::new()),
            media: Mutex::new(None),
            remote_user: None,
        })
    }

    pub fn incoming(id: &str, remote_user: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            state: Mutex::new(DialogState::Establishing),
            ops: Mutex::new(Vec::new()),
            media: Mutex::new(None),
            remote_user: Some(remote_user.to_string()),
        })
    }

    pub fn set_state(&self, state: DialogState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn set_media(&self, media: Arc<FakeMedia>) {
        *self.media.lock().unwrap() = Some(media);
    }

    pub fn ops(&self) -> Vec<DialogOp> {
        self.ops.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialog for FakeDialog {
    fn id(&self) -> DialogId {
        self.id.clone()
    }

    fn state(&self) -> DialogState {
        *self.state.lock().unwrap()
    }

    async fn accept(&self, _constraints: &MediaConstraints) -> Result<(), SignalingError> {
        self.ops.lock().unwrap().push(DialogOp::Accept);
        Ok(())
    }

    async fn reject(&self, status: rsip::StatusCode) -> Result<(), SignalingError> {
        self.ops
            .lock()
            .unwrap()
            .push(DialogOp::Reject(u16::from(status)));
        Ok(())
    }

    async fn cancel(&self) -> Result<(), SignalingError> {
        self.ops.lock().unwrap().push(DialogOp::Cancel);
        Ok(())
    }

    async fn bye(&self) -> Result<(), SignalingError> {
        self.ops.lock().unwrap().push(DialogOp::Bye);
        Ok(())
    }

    async fn refer(&self, target: &rsip::Uri) -> Result<(), SignalingError> {
        self.ops
            .lock()
            .unwrap()
            .push(DialogOp::Refer(target.to_string()));
        Ok(())
    }

    fn media(&self) -> Option<Arc<dyn MediaChannel>> {
        self.media
            .lock()
            .unwrap()
            .clone()
            .map(|media| media as Arc<dyn MediaChannel>)
    }

    fn remote_user(&self) -> Option<String> {
        self.remote_user.clone()
    }
}

pub struct FakeEngine {
    reconnect_fails: bool,
    pub connects: AtomicU32,
    pub registers: AtomicU32,
    pub reconnect_attempts: AtomicU32,
    next_dialog: Mutex<Option<Arc<FakeDialog>>>,
    invited: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reconnect_fails: false,
            connects: AtomicU32::new(0),
            registers: AtomicU32::new(0),
            reconnect_attempts: AtomicU32::new(0),
            next_dialog: Mutex::new(None),
            invited: Mutex::new(Vec::new()),
        })
    }

    pub fn with_failing_reconnect() -> Arc<Self> {
        Arc::new(Self {
            reconnect_fails: true,
            connects: AtomicU32::new(0),
            registers: AtomicU32::new(0),
            reconnect_attempts: AtomicU32::new(0),
            next_dialog: Mutex::new(None),
            invited: Mutex::new(Vec::new()),
        })
    }

    pub fn set_next_dialog(&self, dialog: Arc<FakeDialog>) {
        *self.next_dialog.lock().unwrap() = Some(dialog);
    }

    pub fn invited(&self) -> Vec<String> {
        self.invited.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingEngine for FakeEngine {
    async fn connect(&self) -> Result<(), SignalingError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reconnect(&self) -> Result<(), SignalingError> {
        self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_fails {
            return Err(SignalingError::Engine("transport unreachable".to_string()));
        }
        Ok(())
    }

    async fn register(&self) -> Result<(), SignalingError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn invite(
        &self,
        target: &rsip::Uri,
        _constraints: &MediaConstraints,
    ) -> Result<Arc<dyn Dialog>, SignalingError> {
        self.invited.lock().unwrap().push(target.to_string());
        match self.next_dialog.lock().unwrap().clone() {
            Some(dialog) => Ok(dialog as Arc<dyn Dialog>),
            None => Err(SignalingError::Engine("no route".to_string())),
        }
    }
}

pub struct Harness {
    pub handle: UserAgentHandle,
    pub notifier: Arc<Notifier>,
    pub store: Arc<CallStore>,
    pub service: Arc<CallService>,
    pub sink: Arc<RecordingSink>,
    pub events: EventReceiver,
}

impl Harness {
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn prod_settings() -> VoipSettings {
    VoipSettings {
        mode: Mode::Prod,
        pbx_address: "pbx.example.com".to_string(),
        websocket_url: "wss://pbx.example.com/ws".to_string(),
        username: "101".to_string(),
        secret: "hunter2".to_string(),
        ..VoipSettings::default()
    }
}

pub fn demo_settings() -> VoipSettings {
    VoipSettings::default()
}

pub fn spawn_agent(settings: VoipSettings, engine: Option<Arc<FakeEngine>>) -> Harness {
    let store = Arc::new(CallStore::new());
    let service = Arc::new(CallService::new(
        Arc::new(MemoryCallBackend::new()),
        store.clone(),
    ));
    let sink = Arc::new(RecordingSink::default());
    let (event_sender, events) = tokio::sync::broadcast::channel(256);
    let mut builder = UserAgentBuilder::new()
        .with_settings(settings)
        .with_service(service.clone())
        .with_audio_sink(sink.clone())
        .with_event_sender(event_sender);
    if let Some(engine) = engine {
        builder = builder.with_engine(engine);
    }
    let mut agent = builder.build();
    let handle = agent.handle();
    let notifier = agent.notifier();
    tokio::spawn(async move {
        agent.serve().await.ok();
    });
    Harness {
        handle,
        notifier,
        store,
        service,
        sink,
        events,
    }
}

/// Let the agent drain its inbox.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(25)).await;
}
