use crate::callrecord::{Activity, Call, CallStore, Direction, Persona};
use crate::config::CallBackendConfig;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::info;

pub mod http;
pub mod memory;

pub use http::HttpCallBackend;
pub use memory::MemoryCallBackend;

/// Payload for creating a call record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCall {
    pub phone_number: String,
    pub direction: Direction,
    pub partner_id: Option<String>,
    /// Local-only reference, reattached to the created record.
    #[serde(skip)]
    pub activity: Option<Activity>,
}

impl CreateCall {
    pub fn outgoing(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            direction: Direction::Outgoing,
            partner_id: None,
            activity: None,
        }
    }

    pub fn incoming(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            direction: Direction::Incoming,
            partner_id: None,
            activity: None,
        }
    }
}

/// Remote call-lifecycle operations, keyed by call id. Every operation
/// returns the canonical record as the backend now sees it.
#[async_trait]
pub trait CallBackend: Send + Sync {
    async fn create(&self, data: &CreateCall) -> Result<Call>;
    async fn start(&self, call_id: &str) -> Result<Call>;
    async fn end(&self, call_id: &str, activity_name: Option<&str>) -> Result<Call>;
    async fn abort(&self, call_id: &str) -> Result<Call>;
    async fn reject(&self, call_id: &str) -> Result<Call>;
    async fn miss(&self, call_id: &str) -> Result<Call>;
    async fn contact_info(&self, call_id: &str) -> Result<Option<Persona>>;
}

pub fn create_backend(config: &CallBackendConfig) -> Arc<dyn CallBackend> {
    match config {
        CallBackendConfig::Memory => Arc::new(MemoryCallBackend::new()),
        CallBackendConfig::Http { url, headers } => {
            Arc::new(HttpCallBackend::new(url.clone(), headers.clone()))
        }
    }
}

/// Store-applying wrapper around the call-control backend.
pub struct CallService {
    backend: Arc<dyn CallBackend>,
    store: Arc<CallStore>,
    missed_calls: AtomicU32,
}

impl CallService {
    pub fn new(backend: Arc<dyn CallBackend>, store: Arc<CallStore>) -> Self {
        Self {
            backend,
            store,
            missed_calls: AtomicU32::new(0),
        }
    }

    pub fn store(&self) -> &Arc<CallStore> {
        &self.store
    }

    /// Create the call record. The only operation the agent must await
    /// before building a session.
    pub async fn create(&self, data: CreateCall) -> Result<Call> {
        let mut call = self.backend.create(&data).await?;
        if call.activity.is_none() {
            call.activity = data.activity.clone();
        }
        let call = self.store.insert(call);
        if call.partner.is_none() {
            // contact enrichment runs in the background; the call is
            // usable without it
            let backend = self.backend.clone();
            let store = self.store.clone();
            let call_id = call.id.clone();
            tokio::spawn(async move {
                match backend.contact_info(&call_id).await {
                    Ok(Some(partner)) => {
                        store.update(&call_id, |call| call.partner = Some(partner));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        info!(call_id, "contact lookup failed: {}", e);
                    }
                }
            });
        }
        Ok(call)
    }

    /// Begin server-side timing for the call.
    pub async fn start(&self, call_id: &str) -> Result<Call> {
        let call = self.backend.start(call_id).await?;
        Ok(self.store.insert(call))
    }

    /// End an answered call. When `activity_done` is set the linked
    /// activity record is closed along with the call.
    pub async fn end(&self, call: &Call, activity_done: bool) -> Result<Call> {
        let activity_name = call
            .activity
            .as_ref()
            .filter(|_| activity_done)
            .map(|activity| activity.name.as_str());
        let updated = self.backend.end(&call.id, activity_name).await?;
        let updated = self.store.insert(updated);
        if activity_name.is_some() {
            // the closed activity must not stick to the stored record
            return Ok(self
                .store
                .update(&call.id, |call| call.activity = None)
                .unwrap_or(updated));
        }
        Ok(updated)
    }

    /// Drop a call that never got answered.
    pub async fn abort(&self, call_id: &str) -> Result<Call> {
        let call = self.backend.abort(call_id).await?;
        Ok(self.store.insert(call))
    }

    pub async fn reject(&self, call_id: &str) -> Result<Call> {
        let call = self.backend.reject(call_id).await?;
        Ok(self.store.insert(call))
    }

    pub async fn miss(&self, call_id: &str) -> Result<Call> {
        let call = self.backend.miss(call_id).await?;
        self.missed_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.store.insert(call))
    }

    pub fn missed_calls(&self) -> u32 {
        self.missed_calls.load(Ordering::Relaxed)
    }

    pub fn reset_missed_calls(&self) {
        self.missed_calls.store(0, Ordering::Relaxed);
    }
}
