use crate::callrecord::CallStore;
use crate::callservice::{create_backend, CallService};
use crate::config::Config;
use crate::event::{EventReceiver, EventSender, Notifier};
use crate::media::AudioSink;
use crate::signaling::SignalingEngine;
use crate::useragent::{UserAgent, UserAgentBuilder, UserAgentHandle};
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct AppBuilder {
    config: Option<Config>,
    engine: Option<Arc<dyn SignalingEngine>>,
    audio_sink: Option<Arc<dyn AudioSink>>,
    cancel_token: Option<CancellationToken>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            engine: None,
            audio_sink: None,
            cancel_token: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn SignalingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.audio_sink = Some(sink);
        self
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn build(self) -> Result<App> {
        let config = self.config.unwrap_or_default();
        let token = self.cancel_token.unwrap_or_default();
        let store = Arc::new(CallStore::new());
        let service = Arc::new(CallService::new(create_backend(&config.backend), store.clone()));
        let (events, _) = tokio::sync::broadcast::channel(128);

        let mut builder = UserAgentBuilder::new()
            .with_settings(config.settings.clone())
            .with_service(service.clone())
            .with_ringtones(config.ringtones.clone())
            .with_event_sender(events.clone())
            .with_cancel_token(token.clone());
        if let Some(engine) = self.engine {
            builder = builder.with_engine(engine);
        }
        if let Some(sink) = self.audio_sink {
            builder = builder.with_audio_sink(sink);
        }
        let useragent = builder.build();

        Ok(App {
            config: Arc::new(config),
            store,
            service,
            events,
            notifier: useragent.notifier(),
            handle: useragent.handle(),
            token,
            useragent,
        })
    }
}

pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<CallStore>,
    pub service: Arc<CallService>,
    pub events: EventSender,
    pub notifier: Arc<Notifier>,
    pub token: CancellationToken,
    handle: UserAgentHandle,
    useragent: UserAgent,
}

impl App {
    pub fn handle(&self) -> UserAgentHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub async fn run(mut self) -> Result<()> {
        self.useragent.serve().await
    }
}
