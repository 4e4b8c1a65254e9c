use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;


pub type CallId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Lifecycle state of a call record. `Missed` and `Rejected` are terminal
/// variants of `Terminated` kept distinct for display and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Calling,
    Ongoing,
    Terminated,
    Missed,
    Rejected,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallState::Terminated | CallState::Missed | CallState::Rejected
        )
    }
}

/// A contact the user corresponds with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub phone_number: Option<String>,
}

/// An external task record a call can be linked to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub name: String,
    pub summary: Option<String>,
}

/// A displayable record of one phone interaction, independent of
/// signaling state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub direction: Direction,
    pub state: CallState,
    pub phone_number: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set when media begins flowing.
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds elapsed since `started_at`, driven by the agent's ticker
    /// while the call is active.
    pub elapsed_secs: u64,
    pub partner: Option<Persona>,
    pub activity: Option<Activity>,
}

impl Call {
    pub fn duration_secs(&self) -> i64 {
        match (self.started_at, self.ended_at) {
            (Some(started), Some(ended)) => (ended - started).num_seconds(),
            _ => 0,
        }
    }

    pub fn duration_string(&self) -> String {
        let duration = self.duration_secs();
        if duration <= 0 {
            return String::new();
        }
        let minutes = duration / 60;
        let seconds = duration % 60;
        match (minutes, seconds) {
            (0, 1) => "1 second".to_string(),
            (0, s) => format!("{} seconds", s),
            (1, 0) => "1 minute".to_string(),
            (m, 0) => format!("{} minutes", m),
            (m, s) => format!("{} min {} sec", m, s),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self.state, CallState::Calling | CallState::Ongoing)
    }
}

/// A read-only join of what the UI displays for one entry. At least one
/// of the three parts must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correspondence {
    pub activity: Option<Activity>,
    pub partner: Option<Persona>,
    pub call: Option<Call>,
}

impl Correspondence {
    pub fn new(
        activity: Option<Activity>,
        partner: Option<Persona>,
        call: Option<Call>,
    ) -> Result<Self> {
        if activity.is_none() && partner.is_none() && call.is_none() {
            return Err(anyhow!("correspondence requires an activity, partner or call"));
        }
        Ok(Self {
            activity,
            partner,
            call,
        })
    }

    pub fn of_call(call: Call) -> Self {
        Self {
            activity: call.activity.clone(),
            partner: call.partner.clone(),
            call: Some(call),
        }
    }

    pub fn display_name(&self) -> String {
        if let Some(partner) = &self.partner {
            return partner.name.clone();
        }
        if let Some(call) = &self.call {
            return call
                .display_name
                .clone()
                .unwrap_or_else(|| call.phone_number.clone());
        }
        self.activity
            .as_ref()
            .and_then(|a| a.summary.clone())
            .unwrap_or_default()
    }
}

/// In-memory registry of call records, keyed by call id.
#[derive(Default)]
pub struct CallStore {
    records: RwLock<HashMap<CallId, Call>>,
}

impl CallStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a record. Locally-attached references (partner,
    /// activity) survive a refresh that does not carry them.
    pub fn insert(&self, mut call: Call) -> Call {
        let mut records = self.records.write().unwrap();
        if let Some(existing) = records.get(&call.id) {
            if call.partner.is_none() {
                call.partner = existing.partner.clone();
            }
            if call.activity.is_none() {
                call.activity = existing.activity.clone();
            }
        }
        records.insert(call.id.clone(), call.clone());
        call
    }

    pub fn update<F>(&self, id: &str, f: F) -> Option<Call>
    where
        F: FnOnce(&mut Call),
    {
        let mut records = self.records.write().unwrap();
        let call = records.get_mut(id)?;
        f(call);
        Some(call.clone())
    }

    pub fn get(&self, id: &str) -> Option<Call> {
        self.records.read().unwrap().get(id).cloned()
    }

    /// Most recent calls first.
    pub fn recent(&self, limit: usize) -> Vec<Call> {
        let records = self.records.read().unwrap();
        let mut calls: Vec<Call> = records.values().cloned().collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        calls.truncate(limit);
        calls
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}
