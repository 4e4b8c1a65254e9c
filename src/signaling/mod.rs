use crate::media::{MediaChannel, MediaConstraints, MediaError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub type DialogId = String;

/// Lifecycle of a single dialog, as reported by the engine. The set is
/// closed: an engine reporting anything else is a contract violation
/// caught at the adapter boundary, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogState {
    Initial,
    Establishing,
    Established,
    Terminating,
    Terminated,
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialogState::Initial => "initial",
            DialogState::Establishing => "establishing",
            DialogState::Established => "established",
            DialogState::Terminating => "terminating",
            DialogState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum SignalingError {
    /// The platform denied the media permission needed to build the
    /// offer. The platform's own permission prompt already informed the
    /// user, so callers swallow this one.
    #[error("media permission denied")]
    PermissionDenied,
    #[error("{0}")]
    Engine(String),
}

/// Connection and registration surface of the SIP engine.
#[async_trait]
pub trait SignalingEngine: Send + Sync {
    async fn connect(&self) -> Result<(), SignalingError>;
    async fn reconnect(&self) -> Result<(), SignalingError>;
    async fn register(&self) -> Result<(), SignalingError>;

    /// Send an INVITE to `target`. The returned dialog starts in
    /// `Establishing`; progress arrives as `SignalEvent`s.
    async fn invite(
        &self,
        target: &rsip::Uri,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn Dialog>, SignalingError>;
}

/// One call leg owned by the engine.
#[async_trait]
pub trait Dialog: Send + Sync {
    fn id(&self) -> DialogId;
    fn state(&self) -> DialogState;

    async fn accept(&self, constraints: &MediaConstraints) -> Result<(), SignalingError>;
    async fn reject(&self, status: rsip::StatusCode) -> Result<(), SignalingError>;
    async fn cancel(&self) -> Result<(), SignalingError>;
    async fn bye(&self) -> Result<(), SignalingError>;
    async fn refer(&self, target: &rsip::Uri) -> Result<(), SignalingError>;

    /// Negotiated media, once the offer/answer exchange produced one.
    fn media(&self) -> Option<Arc<dyn MediaChannel>>;

    /// Caller identity of an incoming leg (user part of the From URI).
    fn remote_user(&self) -> Option<String>;
}

/// Events the engine delivers into the user agent inbox.
pub enum SignalEvent {
    IncomingInvite {
        dialog: Arc<dyn Dialog>,
    },
    /// The remote party gave up before the invite was accepted.
    InviteCanceled {
        dialog_id: DialogId,
    },
    /// 1xx provisional response on an outgoing invite.
    Progress {
        dialog_id: DialogId,
        status: rsip::StatusCode,
    },
    Accepted {
        dialog_id: DialogId,
    },
    Rejected {
        dialog_id: DialogId,
        status: rsip::StatusCode,
        reason: String,
    },
    ReferAccepted {
        dialog_id: DialogId,
    },
    StateChanged {
        dialog_id: DialogId,
        state: DialogState,
    },
    RemoteTrackAdded {
        dialog_id: DialogId,
    },
    Bye {
        dialog_id: DialogId,
    },
    MediaAcquired {
        dialog_id: DialogId,
    },
    MediaFailed {
        dialog_id: DialogId,
        error: MediaError,
    },
    TransportDisconnected {
        error: Option<String>,
    },
}

impl fmt::Debug for SignalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalEvent::IncomingInvite { dialog } => f
                .debug_struct("IncomingInvite")
                .field("dialog_id", &dialog.id())
                .finish(),
            SignalEvent::InviteCanceled { dialog_id } => f
                .debug_struct("InviteCanceled")
                .field("dialog_id", dialog_id)
                .finish(),
            SignalEvent::Progress { dialog_id, status } => f
                .debug_struct("Progress")
                .field("dialog_id", dialog_id)
                .field("status", status)
                .finish(),
            SignalEvent::Accepted { dialog_id } => f
                .debug_struct("Accepted")
                .field("dialog_id", dialog_id)
                .finish(),
            SignalEvent::Rejected {
                dialog_id, status, ..
            } => f
                .debug_struct("Rejected")
                .field("dialog_id", dialog_id)
                .field("status", status)
                .finish(),
            SignalEvent::ReferAccepted { dialog_id } => f
                .debug_struct("ReferAccepted")
                .field("dialog_id", dialog_id)
                .finish(),
            SignalEvent::StateChanged { dialog_id, state } => f
                .debug_struct("StateChanged")
                .field("dialog_id", dialog_id)
                .field("state", state)
                .finish(),
            SignalEvent::RemoteTrackAdded { dialog_id } => f
                .debug_struct("RemoteTrackAdded")
                .field("dialog_id", dialog_id)
                .finish(),
            SignalEvent::Bye { dialog_id } => {
                f.debug_struct("Bye").field("dialog_id", dialog_id).finish()
            }
            SignalEvent::MediaAcquired { dialog_id } => f
                .debug_struct("MediaAcquired")
                .field("dialog_id", dialog_id)
                .finish(),
            SignalEvent::MediaFailed { dialog_id, error } => f
                .debug_struct("MediaFailed")
                .field("dialog_id", dialog_id)
                .field("error", error)
                .finish(),
            SignalEvent::TransportDisconnected { error } => f
                .debug_struct("TransportDisconnected")
                .field("error", error)
                .finish(),
        }
    }
}
