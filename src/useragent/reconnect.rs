use super::useragent::{Command, Input, UserAgent};
use std::time::Duration;
use tracing::{info, warn};

/// Retries beyond this become a permanent error.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

const MSG_RECONNECT_GIVE_UP: &str =
    "The WebSocket connection was lost and couldn't be reestablished.";

impl UserAgent {
    /// Reconnect the transport and re-register, backing off exponentially
    /// between attempts. The only operation in the system that is retried
    /// automatically.
    pub(super) async fn attempt_reconnection(&mut self, attempt: u32) {
        if attempt > MAX_RECONNECT_ATTEMPTS {
            self.notifier.trigger_error(MSG_RECONNECT_GIVE_UP, false);
            return;
        }
        if self.reconnecting {
            return;
        }
        let engine = match self.engine.clone() {
            Some(engine) => engine,
            None => return,
        };
        self.reconnecting = true;
        let result = async {
            engine.reconnect().await?;
            engine.register().await
        }
        .await;
        self.reconnecting = false;
        match result {
            Ok(()) => {
                info!(attempt, "transport reconnected");
                self.notifier.resolve_error();
            }
            Err(e) => {
                let backoff = Duration::from_secs(1u64 << attempt)
                    + Duration::from_millis(rand::random::<u64>() % 500);
                warn!(attempt, ?backoff, "reconnection failed: {}", e);
                let inbox = self.inbox.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(backoff).await;
                    inbox
                        .send(Input::Command(Command::AttemptReconnect {
                            attempt: attempt + 1,
                        }))
                        .ok();
                });
            }
        }
    }
}
