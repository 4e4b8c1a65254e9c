use crate::callrecord::{Call, Correspondence};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Events surfaced to the embedding UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new call record exists and should be shown.
    CallAdded { call: Call },
    CallUpdated { call: Call },
    /// The softphone should focus this entry.
    CorrespondenceSelected { correspondence: Correspondence },
    /// An outgoing call is being placed.
    Dialing { phone_number: String },
    /// The user prefers the platform dialer over VoIP for this call.
    NativeDialRequested { phone_number: String, ask: bool },
    /// The current auto-dial activity is done, move to the next one.
    AutoDialAdvance,
    Error { text: String, non_blocking: bool },
    ErrorResolved,
}

pub type EventSender = tokio::sync::broadcast::Sender<SessionEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<SessionEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserError {
    pub text: String,
    pub non_blocking: bool,
}

/// The single user-visible error slot plus the event broadcast feeding
/// the UI. One blocking error at a time; a non-blocking error never
/// replaces a blocking one.
pub struct Notifier {
    error: RwLock<Option<UserError>>,
    events: EventSender,
}

impl Notifier {
    pub fn new(events: EventSender) -> Self {
        Self {
            error: RwLock::new(None),
            events,
        }
    }

    pub fn trigger_error(&self, text: impl Into<String>, non_blocking: bool) {
        let text = text.into();
        {
            let mut slot = self.error.write().unwrap();
            let keep_current = matches!(slot.as_ref(), Some(current) if !current.non_blocking)
                && non_blocking;
            if !keep_current {
                *slot = Some(UserError {
                    text: text.clone(),
                    non_blocking,
                });
            }
        }
        self.events
            .send(SessionEvent::Error {
                text,
                non_blocking,
            })
            .ok();
    }

    pub fn resolve_error(&self) {
        *self.error.write().unwrap() = None;
        self.events.send(SessionEvent::ErrorResolved).ok();
    }

    pub fn current_error(&self) -> Option<UserError> {
        self.error.read().unwrap().clone()
    }

    pub fn emit(&self, event: SessionEvent) {
        self.events.send(event).ok();
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}
