//! Session data owned by the engine, and the read-only snapshot handed out.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::{derive_stage, TreeStage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Dead,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Idle => "idle",
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
            TimerStatus::Completed => "completed",
            TimerStatus::Dead => "dead",
        }
    }

    /// A session exists and has not finished yet.
    pub fn is_active(&self) -> bool {
        matches!(self, TimerStatus::Running | TimerStatus::Paused)
    }
}

impl fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine commands, used to label rejected transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Pause,
    Resume,
    Kill,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Kill => "kill",
        };
        f.write_str(name)
    }
}

/// Automatic reset scheduled after the tree dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReset {
    /// Generation id; a newer death always gets a larger id.
    pub id: u64,
    /// Clock timestamp (ms) at which the reset is due.
    pub due_at_ms: u64,
}

/// One run of the timer.
///
/// Serializable so a caller can park a session between processes and hand
/// it back to [`GrowthEngine::with_session`](super::GrowthEngine::with_session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub(crate) duration_secs: u64,
    pub(crate) remaining_secs: u64,
    pub(crate) status: TimerStatus,
    pub(crate) pause_used: bool,
    /// Clock timestamp (ms) the countdown was last brought up to date at.
    #[serde(default)]
    pub(crate) last_seen_ms: Option<u64>,
    #[serde(default)]
    pub(crate) pending_reset: Option<PendingReset>,
    #[serde(default)]
    pub(crate) reset_generation: u64,
}

impl Session {
    pub fn idle() -> Self {
        Self {
            duration_secs: 0,
            remaining_secs: 0,
            status: TimerStatus::Idle,
            pause_used: false,
            last_seen_ms: None,
            pending_reset: None,
            reset_generation: 0,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn pause_used(&self) -> bool {
        self.pause_used
    }

    pub fn stage(&self) -> TreeStage {
        derive_stage(self.status, self.remaining_secs, self.duration_secs)
    }

    pub fn pending_reset(&self) -> Option<PendingReset> {
        self.pending_reset
    }

    /// Clear everything back to Idle, keeping the reset generation counter
    /// so ids handed out earlier can never match a later death.
    pub(crate) fn clear(&mut self) {
        let generation = self.reset_generation;
        *self = Self::idle();
        self.reset_generation = generation;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}

/// Read model handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub duration_secs: u64,
    pub remaining_secs: u64,
    pub status: TimerStatus,
    pub stage: TreeStage,
    pub pause_used: bool,
    pub completed_count: u64,
}

impl Snapshot {
    /// Fraction of the session already grown, `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        super::stage::progress(self.remaining_secs, self.duration_secs)
    }

    /// `MM:SS` rendering of the remaining time.
    pub fn remaining_clock(&self) -> String {
        format!("{:02}:{:02}", self.remaining_secs / 60, self.remaining_secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_session_has_empty_stage() {
        let session = Session::idle();
        assert_eq!(session.stage(), TreeStage::Empty);
        assert!(!session.status().is_active());
    }

    #[test]
    fn clear_preserves_reset_generation() {
        let mut session = Session::idle();
        session.reset_generation = 7;
        session.status = TimerStatus::Dead;
        session.pending_reset = Some(PendingReset { id: 7, due_at_ms: 3_000 });
        session.clear();
        assert_eq!(session.status(), TimerStatus::Idle);
        assert!(session.pending_reset().is_none());
        assert_eq!(session.reset_generation, 7);
    }

    #[test]
    fn session_without_bookkeeping_fields_deserializes() {
        let json = r#"{"duration_secs":60,"remaining_secs":30,"status":"paused","pause_used":true}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.status(), TimerStatus::Paused);
        assert!(session.last_seen_ms.is_none());
    }

    #[test]
    fn remaining_clock_formats_minutes_and_seconds() {
        let snap = Snapshot {
            duration_secs: 1500,
            remaining_secs: 754,
            status: TimerStatus::Running,
            stage: TreeStage::Sapling,
            pause_used: false,
            completed_count: 0,
        };
        assert_eq!(snap.remaining_clock(), "12:34");
        assert!((snap.progress() - 746.0 / 1500.0).abs() < 1e-9);
    }
}
