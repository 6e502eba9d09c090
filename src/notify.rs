use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{BookingEvent, MentorId};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for booking lifecycle events, one channel per mentor.
/// Fire-and-forget: publishing never blocks, the engine never retries,
/// and lagging subscribers simply miss events.
pub struct NotifyHub {
    channels: DashMap<MentorId, broadcast::Sender<BookingEvent>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a mentor's events. Creates the channel if needed.
    pub fn subscribe(&self, mentor_id: MentorId) -> broadcast::Receiver<BookingEvent> {
        let sender = self
            .channels
            .entry(mentor_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event. No-op if nobody is listening.
    pub fn publish(&self, mentor_id: MentorId, event: &BookingEvent) {
        if let Some(sender) = self.channels.get(&mentor_id) {
            let _ = sender.send(event.clone());
        }
    }

}
