//! Terminal rendition of the lifecycle toasts.

use grove_core::storage::NotificationsConfig;
use grove_core::{Event, Notifier, TracingNotifier};

#[derive(Debug, Clone)]
pub struct TerminalNotifier {
    bell: bool,
}

impl TerminalNotifier {
    pub fn new(bell: bool) -> Self {
        Self { bell }
    }
}

/// Terminal toasts when enabled, otherwise events only reach the log.
pub fn from_config(config: &NotificationsConfig) -> Box<dyn Notifier> {
    if config.enabled {
        Box::new(TerminalNotifier::new(config.bell))
    } else {
        Box::new(TracingNotifier)
    }
}

/// Title and description shown for an event.
pub fn message(event: &Event) -> (&'static str, &'static str) {
    match event {
        Event::Completed => (
            "Timer Completed!",
            "You were so productive you saved and nurtured a life!",
        ),
        Event::Paused => (
            "Timer Paused",
            "You've used your one break. Pausing again will kill the tree.",
        ),
        Event::Killed => ("Tree Died", "Focus broken. Your tree has withered away."),
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, event: &Event) {
        let (title, description) = message(event);
        let bell = if self.bell { "\x07" } else { "" };
        eprintln!("{bell}{title} {description}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_event_has_a_message() {
        for event in [Event::Completed, Event::Paused, Event::Killed] {
            let (title, description) = message(&event);
            assert!(!title.is_empty());
            assert!(!description.is_empty());
        }
        assert_eq!(message(&Event::Killed).0, "Tree Died");
    }
}
