//! Growth timer engine.
//!
//! A synchronous state machine with no internal threads. The caller (usually
//! the [`driver`](super::driver)) is responsible for calling `tick()` once per
//! second while the session is running.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running <-> Paused          (one pause per session)
//! Running -> Completed                (remaining reaches zero)
//! Running | Paused | Completed -> Dead -> Idle   (auto reset after 3s)
//! any -> Idle                         (reset)
//! ```
//!
//! A second `pause()` in the same session kills the tree, even while paused.
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = GrowthEngine::new(store, notifier, clock)?;
//! engine.start(25)?;
//! // Once per second:
//! engine.tick();
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::session::{Command, PendingReset, Session, Snapshot, TimerStatus};
use super::stage::TreeStage;
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, EngineError};
use crate::events::Event;
use crate::notify::{Notifier, NoopNotifier};
use crate::storage::{CounterStore, MemoryCounterStore};

/// Delay between the tree dying and the session resetting to Idle.
pub const AUTO_RESET_DELAY: Duration = Duration::from_secs(3);

const SECOND_MS: u64 = 1000;

/// How much time lost while the driver was suspended is charged to the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DriftPolicy {
    /// Seconds of each detected gap that are forgiven instead of charged.
    #[serde(default)]
    pub forgiveness_secs: u64,
}

impl DriftPolicy {
    /// Seconds actually charged for a gap of `elapsed_secs`.
    pub fn charge(&self, elapsed_secs: u64) -> u64 {
        elapsed_secs.saturating_sub(self.forgiveness_secs)
    }
}

/// Core growth timer.
///
/// Owns the [`Session`] exclusively. Collaborators only ever see
/// [`Snapshot`]s and [`Event`]s.
pub struct GrowthEngine {
    session: Session,
    completed_count: u64,
    drift: DriftPolicy,
    store: Box<dyn CounterStore>,
    notifier: Box<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for GrowthEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrowthEngine")
            .field("session", &self.session)
            .field("completed_count", &self.completed_count)
            .field("drift", &self.drift)
            .finish_non_exhaustive()
    }
}

impl GrowthEngine {
    /// Create an Idle engine. The completed counter is read from `store`
    /// once, here.
    ///
    /// # Errors
    /// Returns an error if the counter cannot be loaded.
    pub fn new(
        store: Box<dyn CounterStore>,
        notifier: Box<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let completed_count = store.load()?;
        debug!(completed_count, "Growth engine created");
        Ok(Self {
            session: Session::idle(),
            completed_count,
            drift: DriftPolicy::default(),
            store,
            notifier,
            clock,
        })
    }

    /// Engine with an in-memory counter, no notifications and the system clock.
    pub fn in_memory() -> Self {
        Self {
            session: Session::idle(),
            completed_count: 0,
            drift: DriftPolicy::default(),
            store: Box::new(MemoryCounterStore::default()),
            notifier: Box::new(NoopNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_drift_policy(mut self, drift: DriftPolicy) -> Self {
        self.drift = drift;
        self
    }

    /// Continue a previously parked session.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = session;
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> TimerStatus {
        self.session.status
    }

    pub fn stage(&self) -> TreeStage {
        self.session.stage()
    }

    pub fn remaining_secs(&self) -> u64 {
        self.session.remaining_secs
    }

    pub fn completed_count(&self) -> u64 {
        self.completed_count
    }

    pub fn drift_policy(&self) -> DriftPolicy {
        self.drift
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            duration_secs: self.session.duration_secs,
            remaining_secs: self.session.remaining_secs,
            status: self.session.status,
            stage: self.session.stage(),
            pause_used: self.session.pause_used,
            completed_count: self.completed_count,
        }
    }

    /// The automatic reset scheduled by the last death, if still pending.
    pub fn pending_reset(&self) -> Option<PendingReset> {
        self.session.pending_reset
    }

    /// Time left until the pending reset is due.
    pub fn pending_reset_delay(&self) -> Option<Duration> {
        let now = self.clock.now_ms();
        self.session
            .pending_reset
            .map(|p| Duration::from_millis(p.due_at_ms.saturating_sub(now)))
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a fresh session of `minutes` minutes.
    pub fn start(&mut self, minutes: u32) -> Result<Snapshot, EngineError> {
        if minutes == 0 {
            return Err(EngineError::InvalidArgument {
                field: "minutes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.session.status.is_active() {
            return Err(self.rejected(Command::Start));
        }

        let duration_secs = u64::from(minutes) * 60;
        self.session.clear();
        self.session.duration_secs = duration_secs;
        self.session.remaining_secs = duration_secs;
        self.session.status = TimerStatus::Running;
        self.session.pause_used = false;
        self.session.last_seen_ms = Some(self.clock.now_ms());
        debug!(minutes, duration_secs, "Session started");
        Ok(self.snapshot())
    }

    /// Use the session's one pause. A second pause abandons focus and
    /// kills the tree, whether or not the session was resumed in between.
    pub fn pause(&mut self) -> Result<Snapshot, EngineError> {
        match self.session.status {
            TimerStatus::Running if !self.session.pause_used => {
                self.session.status = TimerStatus::Paused;
                self.session.pause_used = true;
                self.session.last_seen_ms = None;
                debug!(remaining_secs = self.session.remaining_secs, "Session paused");
                self.notifier.notify(&Event::Paused);
                Ok(self.snapshot())
            }
            TimerStatus::Running | TimerStatus::Paused => {
                info!("Second pause in session, killing tree");
                self.kill()
            }
            _ => Err(self.rejected(Command::Pause)),
        }
    }

    pub fn resume(&mut self) -> Result<Snapshot, EngineError> {
        if self.session.status != TimerStatus::Paused {
            return Err(self.rejected(Command::Resume));
        }
        self.session.status = TimerStatus::Running;
        self.session.last_seen_ms = Some(self.clock.now_ms());
        debug!(remaining_secs = self.session.remaining_secs, "Session resumed");
        Ok(self.snapshot())
    }

    /// Kill the tree and schedule the automatic reset.
    ///
    /// Killing a tree that is already dead changes nothing and keeps the
    /// reset that is already scheduled.
    pub fn kill(&mut self) -> Result<Snapshot, EngineError> {
        match self.session.status {
            TimerStatus::Running | TimerStatus::Paused | TimerStatus::Completed => {}
            TimerStatus::Dead => return Ok(self.snapshot()),
            TimerStatus::Idle => return Err(self.rejected(Command::Kill)),
        }

        let now = self.clock.now_ms();
        self.session.reset_generation += 1;
        let pending = PendingReset {
            id: self.session.reset_generation,
            due_at_ms: now.saturating_add(AUTO_RESET_DELAY.as_millis() as u64),
        };
        self.session.status = TimerStatus::Dead;
        self.session.last_seen_ms = None;
        self.session.pending_reset = Some(pending);
        info!(
            remaining_secs = self.session.remaining_secs,
            reset_id = pending.id,
            "Tree died"
        );
        self.notifier.notify(&Event::Killed);
        Ok(self.snapshot())
    }

    /// Back to Idle from anywhere. Cancels a pending automatic reset.
    pub fn reset(&mut self) -> Snapshot {
        self.session.clear();
        debug!("Session reset");
        self.snapshot()
    }

    /// Count down one second. No-op unless running.
    pub fn tick(&mut self) -> Snapshot {
        if self.session.status != TimerStatus::Running {
            return self.snapshot();
        }
        // A tick accounts for exactly one second of clock time.
        self.session.last_seen_ms = self.session.last_seen_ms.map(|t| t + SECOND_MS);
        self.charge(1);
        self.snapshot()
    }

    /// Tick once the clock has seen a full second pass since the countdown
    /// was last brought up to date. Lets a driver wake more often than once
    /// a second without speeding up the countdown.
    pub fn advance(&mut self) -> Snapshot {
        if self.session.status != TimerStatus::Running {
            return self.snapshot();
        }
        let now = self.clock.now_ms();
        match self.session.last_seen_ms {
            Some(last) if now.saturating_sub(last) >= SECOND_MS => self.tick(),
            Some(_) => self.snapshot(),
            None => {
                self.session.last_seen_ms = Some(now);
                self.snapshot()
            }
        }
    }

    /// Charge `elapsed_secs` of time the driver could not account for.
    ///
    /// No-op unless running, or when `elapsed_secs <= 0`.
    pub fn reconcile(&mut self, elapsed_secs: i64) -> Snapshot {
        if self.session.status != TimerStatus::Running || elapsed_secs <= 0 {
            return self.snapshot();
        }
        let now = self.clock.now_ms();
        self.session.last_seen_ms = Some(self.session.last_seen_ms.map_or(now, |t| t.max(now)));
        self.apply_drift(elapsed_secs as u64);
        self.snapshot()
    }

    /// Reconcile against the clock: charge the whole seconds that passed
    /// since the countdown was last brought up to date.
    ///
    /// A gap the forgiveness window absorbs entirely is left pending, so
    /// short gaps add up until they exceed the window.
    pub fn resync(&mut self) -> Snapshot {
        if self.session.status != TimerStatus::Running {
            return self.snapshot();
        }
        let now = self.clock.now_ms();
        let Some(last) = self.session.last_seen_ms else {
            self.session.last_seen_ms = Some(now);
            return self.snapshot();
        };
        let elapsed_secs = now.saturating_sub(last) / SECOND_MS;
        if elapsed_secs == 0 || self.drift.charge(elapsed_secs) == 0 {
            return self.snapshot();
        }
        // Keep the sub-second remainder for the next resync.
        self.session.last_seen_ms = Some(last + elapsed_secs * SECOND_MS);
        self.apply_drift(elapsed_secs);
        self.snapshot()
    }

    /// Fire the pending automatic reset if the clock says it is due.
    pub fn poll(&mut self) -> Snapshot {
        let now = self.clock.now_ms();
        if let Some(pending) = self.session.pending_reset {
            if now >= pending.due_at_ms {
                debug!(reset_id = pending.id, "Automatic reset after death");
                return self.reset();
            }
        }
        self.snapshot()
    }

    /// Fire the pending automatic reset if `id` still names it.
    ///
    /// Returns `None` for stale ids (the reset was cancelled, or a newer
    /// death replaced it).
    pub fn fire_reset(&mut self, id: u64) -> Option<Snapshot> {
        match self.session.pending_reset {
            Some(pending) if pending.id == id => {
                debug!(reset_id = id, "Automatic reset after death");
                Some(self.reset())
            }
            _ => None,
        }
    }

    /// Cancel the pending automatic reset without changing status.
    pub fn cancel_pending_reset(&mut self) -> bool {
        let cancelled = self.session.pending_reset.take();
        if let Some(pending) = cancelled {
            debug!(reset_id = pending.id, "Automatic reset cancelled");
        }
        cancelled.is_some()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn rejected(&self, command: Command) -> EngineError {
        debug!(%command, status = %self.session.status, "Command rejected");
        EngineError::InvalidTransition {
            command,
            status: self.session.status,
        }
    }

    fn apply_drift(&mut self, elapsed_secs: u64) {
        let charged = self.drift.charge(elapsed_secs);
        debug!(
            elapsed_secs,
            charged_secs = charged,
            remaining_secs = self.session.remaining_secs,
            "Drift correction"
        );
        if charged > 0 {
            self.charge(charged);
        }
    }

    fn charge(&mut self, secs: u64) {
        self.session.remaining_secs = self.session.remaining_secs.saturating_sub(secs);
        if self.session.remaining_secs == 0 {
            self.complete();
        }
    }

    fn complete(&mut self) {
        self.session.status = TimerStatus::Completed;
        self.session.remaining_secs = 0;
        self.session.last_seen_ms = None;
        self.completed_count += 1;
        if let Err(e) = self.store.save(self.completed_count) {
            warn!(error = %e, completed_count = self.completed_count, "Failed to persist completed count");
        }
        info!(completed_count = self.completed_count, "Session completed");
        self.notifier.notify(&Event::Completed);
    }
}
