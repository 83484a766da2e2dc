//! Async tick driver.
//!
//! The driver task is the single owner of a [`GrowthEngine`] once spawned.
//! Callers talk to it through a cheap-to-clone [`DriverHandle`]; every
//! command is answered over a oneshot channel, and the latest snapshot is
//! published on a `watch` channel.
//!
//! The task wakes up for three reasons besides commands:
//! - the tick interval, which calls `advance()` while the session is
//!   running so the countdown follows the clock however often the driver
//!   wakes (followed by a clock `resync()` so a suspended process catches up)
//! - the auto-reset deadline after the tree dies
//! - cancellation, or every handle being dropped
//!
//! ```ignore
//! let (handle, task) = spawn_driver(engine, DriverOptions::default(), cancel.clone());
//! handle.start(25).await?;
//! let mut snapshots = handle.subscribe();
//! while snapshots.changed().await.is_ok() { /* render */ }
//! ```

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::engine::GrowthEngine;
use super::session::{Snapshot, TimerStatus};
use crate::error::EngineError;
use crate::storage::TimerConfig;

/// Bounds applied to [`DriverOptions::tick_interval`].
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);
const MAX_TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// How often the driver wakes to check the clock. Clamped to
    /// 1 ms..=1 s.
    pub tick_interval: Duration,
    /// Run a clock resync after every tick.
    pub resync_on_tick: bool,
    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            resync_on_tick: true,
            command_buffer: 32,
        }
    }
}

impl From<&TimerConfig> for DriverOptions {
    fn from(config: &TimerConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("timer driver has stopped")]
    Stopped,
}

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum DriverCommand {
    Start {
        minutes: u32,
        respond_to: Reply<Result<Snapshot, EngineError>>,
    },
    Pause {
        respond_to: Reply<Result<Snapshot, EngineError>>,
    },
    Resume {
        respond_to: Reply<Result<Snapshot, EngineError>>,
    },
    Kill {
        respond_to: Reply<Result<Snapshot, EngineError>>,
    },
    Reset {
        respond_to: Reply<Snapshot>,
    },
    Reconcile {
        elapsed_secs: i64,
        respond_to: Reply<Snapshot>,
    },
    Resync {
        respond_to: Reply<Snapshot>,
    },
    Snapshot {
        respond_to: Reply<Snapshot>,
    },
}

/// Handle for talking to a running driver task.
#[derive(Debug, Clone)]
pub struct DriverHandle {
    sender: mpsc::Sender<DriverCommand>,
    snapshots: watch::Receiver<Snapshot>,
}

impl DriverHandle {
    pub async fn start(&self, minutes: u32) -> Result<Snapshot, DriverError> {
        let result = self
            .request(|respond_to| DriverCommand::Start {
                minutes,
                respond_to,
            })
            .await?;
        Ok(result?)
    }

    pub async fn pause(&self) -> Result<Snapshot, DriverError> {
        let result = self
            .request(|respond_to| DriverCommand::Pause { respond_to })
            .await?;
        Ok(result?)
    }

    pub async fn resume(&self) -> Result<Snapshot, DriverError> {
        let result = self
            .request(|respond_to| DriverCommand::Resume { respond_to })
            .await?;
        Ok(result?)
    }

    pub async fn kill(&self) -> Result<Snapshot, DriverError> {
        let result = self
            .request(|respond_to| DriverCommand::Kill { respond_to })
            .await?;
        Ok(result?)
    }

    pub async fn reset(&self) -> Result<Snapshot, DriverError> {
        self.request(|respond_to| DriverCommand::Reset { respond_to })
            .await
    }

    pub async fn reconcile(&self, elapsed_secs: i64) -> Result<Snapshot, DriverError> {
        self.request(|respond_to| DriverCommand::Reconcile {
            elapsed_secs,
            respond_to,
        })
        .await
    }

    pub async fn resync(&self) -> Result<Snapshot, DriverError> {
        self.request(|respond_to| DriverCommand::Resync { respond_to })
            .await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, DriverError> {
        self.request(|respond_to| DriverCommand::Snapshot { respond_to })
            .await
    }

    /// Receiver that sees every published snapshot change.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Last published snapshot, without a round trip to the task.
    pub fn latest(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> DriverCommand,
    ) -> Result<T, DriverError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| DriverError::Stopped)?;
        rx.await.map_err(|_| DriverError::Stopped)
    }
}

/// Spawn the driver task.
///
/// The task stops when `cancel_token` is cancelled or every [`DriverHandle`]
/// is dropped, and hands the engine back through the join handle.
pub fn spawn_driver(
    engine: GrowthEngine,
    options: DriverOptions,
    cancel_token: CancellationToken,
) -> (DriverHandle, JoinHandle<GrowthEngine>) {
    let (sender, receiver) = mpsc::channel(options.command_buffer.max(1));
    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
    let task = tokio::spawn(run(engine, receiver, snapshot_tx, options, cancel_token));
    let handle = DriverHandle {
        sender,
        snapshots: snapshot_rx,
    };
    (handle, task)
}

async fn run(
    mut engine: GrowthEngine,
    mut receiver: mpsc::Receiver<DriverCommand>,
    snapshots: watch::Sender<Snapshot>,
    options: DriverOptions,
    cancel_token: CancellationToken,
) -> GrowthEngine {
    let period = options.tick_interval.clamp(MIN_TICK_INTERVAL, MAX_TICK_INTERVAL);
    if period != options.tick_interval {
        warn!(
            requested_ms = options.tick_interval.as_millis() as u64,
            interval_ms = period.as_millis() as u64,
            "Tick interval out of range, clamped"
        );
    }
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_ms = period.as_millis() as u64,
        status = %engine.status(),
        "Timer driver started"
    );

    loop {
        let reset_delay = engine.pending_reset_delay();
        let reset_due = async move {
            match reset_delay {
                Some(delay) => sleep(delay).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                info!("Timer driver shutting down");
                break;
            }

            command = receiver.recv() => {
                let Some(command) = command else {
                    debug!("All driver handles dropped");
                    break;
                };
                handle_command(&mut engine, command, &mut ticker);
            }

            _ = reset_due => {
                engine.poll();
            }

            _ = ticker.tick() => {
                if engine.status() == TimerStatus::Running {
                    engine.advance();
                    if options.resync_on_tick {
                        engine.resync();
                    }
                }
            }
        }

        let latest = engine.snapshot();
        snapshots.send_if_modified(|current| {
            if *current == latest {
                false
            } else {
                *current = latest;
                true
            }
        });
    }

    debug!("Timer driver task completed");
    engine
}

fn handle_command(
    engine: &mut GrowthEngine,
    command: DriverCommand,
    ticker: &mut tokio::time::Interval,
) {
    // Replies are best effort: a caller that gave up waiting is not an error.
    match command {
        DriverCommand::Start {
            minutes,
            respond_to,
        } => {
            let result = engine.start(minutes);
            if result.is_ok() {
                ticker.reset();
            }
            let _ = respond_to.send(result);
        }
        DriverCommand::Pause { respond_to } => {
            let _ = respond_to.send(engine.pause());
        }
        DriverCommand::Resume { respond_to } => {
            let result = engine.resume();
            if result.is_ok() {
                ticker.reset();
            }
            let _ = respond_to.send(result);
        }
        DriverCommand::Kill { respond_to } => {
            let _ = respond_to.send(engine.kill());
        }
        DriverCommand::Reset { respond_to } => {
            let _ = respond_to.send(engine.reset());
        }
        DriverCommand::Reconcile {
            elapsed_secs,
            respond_to,
        } => {
            let _ = respond_to.send(engine.reconcile(elapsed_secs));
        }
        DriverCommand::Resync { respond_to } => {
            let _ = respond_to.send(engine.resync());
        }
        DriverCommand::Snapshot { respond_to } => {
            let _ = respond_to.send(engine.snapshot());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::events::Event;
    use crate::notify::{ChannelNotifier, NoopNotifier};
    use crate::storage::MemoryCounterStore;
    use crate::timer::{Command, TreeStage};
    use std::sync::Arc;

    fn engine() -> GrowthEngine {
        GrowthEngine::new(
            Box::new(MemoryCounterStore::default()),
            Box::new(NoopNotifier),
            Arc::new(TokioClock::new()),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_second_while_running() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        handle.start(1).await.unwrap();
        sleep(Duration::from_millis(5_500)).await;
        assert_eq!(handle.snapshot().await.unwrap().remaining_secs, 55);
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_interval_keeps_real_time_pace() {
        let options = DriverOptions {
            tick_interval: Duration::from_millis(500),
            ..DriverOptions::default()
        };
        let (handle, _task) = spawn_driver(engine(), options, CancellationToken::new());
        handle.start(1).await.unwrap();
        sleep(Duration::from_millis(10_250)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.remaining_secs, 50);
        assert_eq!(snap.status, TimerStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let options = DriverOptions {
            tick_interval: Duration::ZERO,
            ..DriverOptions::default()
        };
        let (handle, _task) = spawn_driver(engine(), options, CancellationToken::new());
        handle.start(1).await.unwrap();
        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(handle.snapshot().await.unwrap().remaining_secs, 57);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticking_until_resume() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        handle.start(1).await.unwrap();
        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(handle.pause().await.unwrap().remaining_secs, 58);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(handle.snapshot().await.unwrap().remaining_secs, 58);

        handle.resume().await.unwrap();
        sleep(Duration::from_millis(1_500)).await;
        assert_eq!(handle.snapshot().await.unwrap().remaining_secs, 57);
    }

    #[tokio::test(start_paused = true)]
    async fn completes_and_notifies() {
        let (notifier, mut events) = ChannelNotifier::new(8);
        let engine = GrowthEngine::new(
            Box::new(MemoryCounterStore::default()),
            Box::new(notifier),
            Arc::new(TokioClock::new()),
        )
        .unwrap();
        let (handle, _task) = spawn_driver(engine, DriverOptions::default(), CancellationToken::new());
        handle.start(1).await.unwrap();

        sleep(Duration::from_millis(60_500)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.status, TimerStatus::Completed);
        assert_eq!(snap.stage, TreeStage::Fruiting);
        assert_eq!(snap.completed_count, 1);
        assert_eq!(events.recv().await.unwrap(), Event::Completed);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.snapshot().await.unwrap(), snap);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_tree_resets_after_three_seconds() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        handle.start(1).await.unwrap();
        assert_eq!(handle.kill().await.unwrap().status, TimerStatus::Dead);

        sleep(Duration::from_millis(2_900)).await;
        assert_eq!(handle.snapshot().await.unwrap().status, TimerStatus::Dead);

        sleep(Duration::from_millis(200)).await;
        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.status, TimerStatus::Idle);
        assert_eq!(snap.stage, TreeStage::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn early_reset_cancels_automatic_reset() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        handle.start(1).await.unwrap();
        handle.kill().await.unwrap();
        sleep(Duration::from_secs(1)).await;

        assert_eq!(handle.reset().await.unwrap().status, TimerStatus::Idle);
        handle.start(1).await.unwrap();
        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(handle.snapshot().await.unwrap().status, TimerStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_commands_surface_engine_errors() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        let err = handle.resume().await.unwrap_err();
        assert_eq!(
            err,
            DriverError::Engine(EngineError::InvalidTransition {
                command: Command::Resume,
                status: TimerStatus::Idle,
            })
        );
        assert!(matches!(
            handle.start(0).await,
            Err(DriverError::Engine(EngineError::InvalidArgument { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_through_handle() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        handle.start(1).await.unwrap();
        assert_eq!(handle.reconcile(20).await.unwrap().remaining_secs, 40);
        assert_eq!(handle.resync().await.unwrap().remaining_secs, 40);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_stage_changes() {
        let (handle, _task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        let mut snapshots = handle.subscribe();
        handle.start(1).await.unwrap();
        snapshots.changed().await.unwrap();
        assert_eq!(snapshots.borrow_and_update().stage, TreeStage::Seed);

        sleep(Duration::from_millis(24_500)).await;
        assert_eq!(handle.latest().stage, TreeStage::Sapling);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_task_and_returns_engine() {
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_driver(engine(), DriverOptions::default(), cancel.clone());
        handle.start(1).await.unwrap();
        sleep(Duration::from_millis(3_500)).await;

        cancel.cancel();
        let engine = task.await.unwrap();
        assert_eq!(engine.remaining_secs(), 57);
        assert_eq!(handle.snapshot().await.unwrap_err(), DriverError::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_stops_task() {
        let (handle, task) = spawn_driver(engine(), DriverOptions::default(), CancellationToken::new());
        drop(handle);
        let engine = task.await.unwrap();
        assert_eq!(engine.status(), TimerStatus::Idle);
    }
}
