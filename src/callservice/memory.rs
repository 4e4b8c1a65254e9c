use super::{CallBackend, CreateCall};
use crate::callrecord::{Call, CallId, CallState, Persona};
use crate::utils::clean_phone_number;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Call-control backend keeping canonical records in memory. Powers demo
/// mode and tests.
#[derive(Default)]
pub struct MemoryCallBackend {
    records: Mutex<HashMap<CallId, Call>>,
}

impl MemoryCallBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, call_id: &str, f: F) -> Result<Call>
    where
        F: FnOnce(&mut Call),
    {
        let mut records = self.records.lock().unwrap();
        let call = records
            .get_mut(call_id)
            .ok_or_else(|| anyhow!("unknown call id: {}", call_id))?;
        f(call);
        Ok(call.clone())
    }
}

#[async_trait]
impl CallBackend for MemoryCallBackend {
    async fn create(&self, data: &CreateCall) -> Result<Call> {
        let call = Call {
            id: Uuid::new_v4().to_string(),
            direction: data.direction,
            state: CallState::Calling,
            phone_number: clean_phone_number(&data.phone_number),
            display_name: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            elapsed_secs: 0,
            partner: None,
            activity: None,
        };
        self.records
            .lock()
            .unwrap()
            .insert(call.id.clone(), call.clone());
        Ok(call)
    }

    async fn start(&self, call_id: &str) -> Result<Call> {
        self.update(call_id, |call| {
            call.state = CallState::Ongoing;
            if call.started_at.is_none() {
                call.started_at = Some(Utc::now());
            }
        })
    }

    async fn end(&self, call_id: &str, _activity_name: Option<&str>) -> Result<Call> {
        self.update(call_id, |call| {
            call.state = CallState::Terminated;
            // a call that never started keeps both timestamps empty
            if call.started_at.is_some() && call.ended_at.is_none() {
                call.ended_at = Some(Utc::now());
            }
        })
    }

    async fn abort(&self, call_id: &str) -> Result<Call> {
        self.update(call_id, |call| call.state = CallState::Terminated)
    }

    async fn reject(&self, call_id: &str) -> Result<Call> {
        self.update(call_id, |call| call.state = CallState::Rejected)
    }

    async fn miss(&self, call_id: &str) -> Result<Call> {
        self.update(call_id, |call| call.state = CallState::Missed)
    }

    async fn contact_info(&self, _call_id: &str) -> Result<Option<Persona>> {
        Ok(None)
    }
}
