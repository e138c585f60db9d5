//! Session lifecycle events.
//!
//! The client never navigates anywhere itself. When the session ends (an
//! explicit logout, or a refresh failure that forces teardown) it publishes a
//! [`SessionEvent`]; the host subscribes and routes to its login screen.

use tokio::sync::broadcast;
use tracing::debug;

/// Buffered events per subscriber before lagging receivers drop old ones.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Change in authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Both tokens were stored after a successful login.
    LoggedIn,
    /// The user logged out; tokens were cleared.
    LoggedOut,
    /// The access token could not be refreshed; tokens were cleared and
    /// in-flight admin work cannot be resumed.
    Expired {
        /// Normalized refresh error message.
        reason: String,
    },
}

/// Broadcast hub for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: SessionEvent) {
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(target: "site.session", receivers, "Session event published");
            }
            Err(broadcast::error::SendError(event)) => {
                debug!(target: "site.session", ?event, "Session event had no subscribers");
            }
        }
    }
}
