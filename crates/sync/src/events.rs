//! Session events published to rendering collaborators.
//!
//! [`SessionEventBus`] is a thin fan-out hub over a
//! [`tokio::sync::broadcast`] channel. Sessions publish an `Updated`
//! event per merged delivery and exactly one `Finalized` event when they
//! freeze their snapshot.

use piiwatch_core::snapshot::{JobKind, JobSnapshot};
use serde::Serialize;
use tokio::sync::broadcast;

/// Broadcast channel capacity for session events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A state change observed by a session.
#[derive(Debug, Clone, Serialize)]
pub enum SessionEvent {
    /// A channel delivery changed the session's snapshot.
    Updated {
        kind: JobKind,
        snapshot: JobSnapshot,
    },

    /// The session finalized; the snapshot is frozen and will not change
    /// again. Emitted exactly once per session.
    Finalized {
        kind: JobKind,
        snapshot: JobSnapshot,
    },
}

/// In-process fan-out bus for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed events are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With zero subscribers the event is silently dropped; the snapshot
    /// itself remains available through the registry accessors.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}
