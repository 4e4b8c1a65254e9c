use crate::callrecord::Direction;
use crate::signaling::Dialog;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where an invite sits in its three-step progression. Both directions
/// share the set: an outgoing leg climbs `Trying → Ringing → Established`
/// as provisional and final responses arrive; an incoming leg is created
/// already `Ringing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitePhase {
    Trying,
    Ringing,
    Established,
}

/// The single in-flight call the agent owns. A plain state holder: every
/// transition is driven from the `UserAgent` inbox loop, so the fields are
/// mutated in place under the exclusivity guarantee and never shared.
pub struct Session {
    /// Call-record id this session is backed by.
    pub(super) call_id: String,
    /// Dialog id once the engine (or the demo timer) has assigned one.
    pub(super) dialog_id: Option<String>,
    /// The engine-owned call leg, absent until an invite produces one.
    pub(super) dialog: Option<Arc<dyn Dialog>>,
    pub(super) direction: Direction,
    pub(super) phase: InvitePhase,
    pub(super) muted: bool,
    /// Real destination parked here while a relay device leg is dialed.
    pub(super) transfer_target: Option<String>,
    /// Demo-mode auto-answer timer.
    pub(super) demo_timer: Option<JoinHandle<()>>,
    /// Cancels the 1 Hz elapsed-time ticker.
    pub(super) ticker: Option<CancellationToken>,
    /// Process-unique sequence number; continuations re-validate against
    /// it to drop work for a session that was superseded across an await.
    pub(super) seq: u64,
}

impl Session {
    /// A freshly placed outgoing call, before any leg exists.
    pub(super) fn outgoing(seq: u64, call_id: String) -> Self {
        Self {
            call_id,
            dialog_id: None,
            dialog: None,
            direction: Direction::Outgoing,
            phase: InvitePhase::Trying,
            muted: false,
            transfer_target: None,
            demo_timer: None,
            ticker: None,
            seq,
        }
    }

    /// An incoming invite, already ringing, carrying its engine dialog.
    pub(super) fn incoming(seq: u64, call_id: String, dialog: Arc<dyn Dialog>) -> Self {
        Self {
            call_id,
            dialog_id: Some(dialog.id()),
            dialog: Some(dialog),
            direction: Direction::Incoming,
            phase: InvitePhase::Ringing,
            muted: false,
            transfer_target: None,
            demo_timer: None,
            ticker: None,
            seq,
        }
    }

    /// Stop the background tasks this session spawned: the elapsed-time
    /// ticker and, in demo mode, the auto-answer timer.
    pub(super) fn teardown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        if let Some(timer) = self.demo_timer.take() {
            timer.abort();
        }
    }
}
