use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle events the engine hands to its [`Notifier`](crate::notify::Notifier).
///
/// Events carry no payload; anything a presentation layer needs beyond the
/// tag is available from the engine's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Remaining time reached zero while running.
    Completed,
    /// The single allowed pause was consumed.
    Paused,
    /// The tree died, either through `kill()` or a second pause.
    Killed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Completed => "completed",
            Event::Paused => "paused",
            Event::Killed => "killed",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
