//! Notifier port.
//!
//! The engine pushes lifecycle [`Event`]s into a notifier and never looks at
//! what happens next. Sounds, toasts and anything else user-facing live
//! behind this trait.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::events::Event;

pub trait Notifier: Send {
    fn notify(&self, event: &Event);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &Event) {}
}

/// Logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &Event) {
        info!(event = %event, "Growth timer lifecycle event");
    }
}

/// Forwards events into a broadcast channel.
///
/// Sending with no live receivers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: broadcast::Sender<Event>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<Event>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &Event) {
        if self.sender.send(*event).is_err() {
            debug!(event = %event, "No subscribers for lifecycle event");
        }
    }
}
