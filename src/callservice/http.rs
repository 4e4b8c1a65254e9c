use super::{CallBackend, CreateCall};
use crate::callrecord::{Call, Persona};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;
use tracing::info;

/// Call-control backend speaking JSON over HTTP. Each operation is one
/// POST to `<base_url>/<operation>`; the response body is the canonical
/// call record.
pub struct HttpCallBackend {
    client: Client,
    base_url: String,
    headers: Option<HashMap<String, String>>,
}

impl HttpCallBackend {
    pub fn new(base_url: String, headers: Option<HashMap<String, String>>) -> Self {
        Self {
            client: Client::new(),
            base_url,
            headers,
        }
    }

    async fn post(&self, operation: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), operation);
        let start_time = Instant::now();
        let mut request = self.client.post(&url);
        if let Some(headers) = &self.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }
        let response = request
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("call backend unreachable: {}", e))?;
        info!(
            url,
            operation,
            elapsed = start_time.elapsed().as_millis() as u64,
            status = ?response.status(),
            "call action"
        );
        if !response.status().is_success() {
            return Err(anyhow!(
                "call action {} failed: {}",
                operation,
                response.status()
            ));
        }
        Ok(response.json().await?)
    }

    async fn post_call(&self, operation: &str, payload: Value) -> Result<Call> {
        let value = self.post(operation, payload).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl CallBackend for HttpCallBackend {
    async fn create(&self, data: &CreateCall) -> Result<Call> {
        self.post_call("create", json!(data)).await
    }

    async fn start(&self, call_id: &str) -> Result<Call> {
        self.post_call("start", json!({ "call_id": call_id })).await
    }

    async fn end(&self, call_id: &str, activity_name: Option<&str>) -> Result<Call> {
        self.post_call(
            "end",
            json!({ "call_id": call_id, "activity_name": activity_name }),
        )
        .await
    }

    async fn abort(&self, call_id: &str) -> Result<Call> {
        self.post_call("abort", json!({ "call_id": call_id })).await
    }

    async fn reject(&self, call_id: &str) -> Result<Call> {
        self.post_call("reject", json!({ "call_id": call_id })).await
    }

    async fn miss(&self, call_id: &str) -> Result<Call> {
        self.post_call("miss", json!({ "call_id": call_id })).await
    }

    async fn contact_info(&self, call_id: &str) -> Result<Option<Persona>> {
        let value = self
            .post("contact_info", json!({ "call_id": call_id }))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}
