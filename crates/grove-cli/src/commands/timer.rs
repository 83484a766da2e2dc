use std::sync::{Arc, Mutex};

use chrono::{Duration as ChronoDuration, Local};
use clap::Subcommand;
use grove_core::{
    spawn_driver, Config, ConfigError, Database, DatabaseError, DriftPolicy, DriverOptions,
    GrowthEngine, KvCounterStore, Session, Snapshot, SystemClock, TimerStatus,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::notifier;

const SESSION_KEY: &str = "growth_session";

#[derive(Subcommand)]
pub enum TimerAction {
    /// Plant a new tree (minutes default to timer.default_minutes)
    Start {
        minutes: Option<u32>,
        /// Use the Nth entry of timer.presets instead
        #[arg(long, short, conflicts_with = "minutes")]
        preset: Option<usize>,
    },
    /// Use the session's one pause; pausing again kills the tree
    Pause,
    /// Resume after the pause
    Resume,
    /// Clear the session back to idle
    Reset,
    /// Give up and kill the tree
    Kill,
    /// Print current timer state as JSON
    Status,
    /// Charge seconds the timer could not account for
    Reconcile {
        #[arg(allow_hyphen_values = true)]
        seconds: i64,
    },
    /// Run a session in the foreground; Ctrl+C kills the tree
    Run {
        minutes: Option<u32>,
        /// Use the Nth entry of timer.presets instead
        #[arg(long, short, conflicts_with = "minutes")]
        preset: Option<usize>,
    },
}

type Shared = Arc<Mutex<Database>>;

fn load_session(db: &Shared) -> Option<Session> {
    let db = db.lock().ok()?;
    match db.kv_get(SESSION_KEY) {
        Ok(Some(json)) => match serde_json::from_str::<Session>(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable parked session");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Failed to read parked session");
            None
        }
    }
}

fn save_session(db: &Shared, engine: &GrowthEngine) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string(engine.session())?;
    let db = db.lock().map_err(|_| DatabaseError::Poisoned)?;
    db.kv_set(SESSION_KEY, &json)?;
    Ok(())
}

fn open_engine(
    db: &Shared,
    config: &Config,
    drift: DriftPolicy,
) -> Result<GrowthEngine, Box<dyn std::error::Error>> {
    let engine = GrowthEngine::new(
        Box::new(KvCounterStore::new(db.clone())),
        notifier::from_config(&config.notifications),
        Arc::new(SystemClock),
    )?
    .with_drift_policy(drift);

    Ok(match load_session(db) {
        Some(session) => engine.with_session(session),
        None => engine,
    })
}

/// Snapshot plus a human readable clock and, while running, the local
/// time the tree will be fully grown.
fn render(snapshot: &Snapshot) -> Result<String, serde_json::Error> {
    let mut value = serde_json::to_value(snapshot)?;
    value["remaining"] = snapshot.remaining_clock().into();
    value["progress"] = ((snapshot.progress() * 1000.0).round() / 1000.0).into();
    if snapshot.status == TimerStatus::Running {
        let remaining = i64::try_from(snapshot.remaining_secs).unwrap_or(0);
        let ends_at = Local::now() + ChronoDuration::seconds(remaining);
        value["ends_at"] = ends_at.to_rfc3339().into();
    }
    serde_json::to_string_pretty(&value)
}

fn resolve_minutes(
    config: &Config,
    minutes: Option<u32>,
    preset: Option<usize>,
) -> Result<u32, ConfigError> {
    let minutes = match (minutes, preset) {
        (Some(minutes), _) => minutes,
        (None, Some(number)) => config.timer.preset(number)?,
        (None, None) => config.timer.default_minutes,
    };
    config.timer.check_minutes(minutes)
}

pub fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db: Shared = Arc::new(Mutex::new(Database::open()?));

    if let TimerAction::Run { minutes, preset } = action {
        let minutes = resolve_minutes(&config, minutes, preset)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        return runtime.block_on(run_foreground(minutes, &config, &db));
    }

    // Between invocations the session keeps running in wall time, so the
    // catch-up is charged in full; forgiveness only applies to `run`.
    let mut engine = open_engine(&db, &config, DriftPolicy::default())?;
    engine.resync();
    engine.poll();

    let result: Result<Snapshot, Box<dyn std::error::Error>> = match action {
        TimerAction::Start { minutes, preset } => resolve_minutes(&config, minutes, preset)
            .map_err(Into::into)
            .and_then(|minutes| engine.start(minutes).map_err(Into::into)),
        TimerAction::Pause => engine.pause().map_err(Into::into),
        TimerAction::Resume => engine.resume().map_err(Into::into),
        TimerAction::Kill => engine.kill().map_err(Into::into),
        TimerAction::Reset => Ok(engine.reset()),
        TimerAction::Reconcile { seconds } => Ok(engine.reconcile(seconds)),
        TimerAction::Status | TimerAction::Run { .. } => Ok(engine.snapshot()),
    };

    // Persist even when the command was rejected; resync may have moved time.
    save_session(&db, &engine)?;
    println!("{}", render(&result?)?);
    Ok(())
}

async fn run_foreground(
    minutes: u32,
    config: &Config,
    db: &Shared,
) -> Result<(), Box<dyn std::error::Error>> {
    let parked = open_engine(db, config, config.drift)?;
    if parked.status().is_active() {
        return Err("a session is already in progress; reset it first".into());
    }
    let engine = parked.with_session(Session::idle());

    let cancel_token = CancellationToken::new();
    let (handle, task) = spawn_driver(
        engine,
        DriverOptions::from(&config.timer),
        cancel_token.clone(),
    );
    let mut snapshots = handle.subscribe();
    let started = handle.start(minutes).await?;
    println!("{} {}", started.remaining_clock(), started.stage);

    let mut last_stage = started.stage;
    let mut died = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if died {
                    break;
                }
                debug!("Interrupted, killing tree");
                handle.kill().await?;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.stage != last_stage {
                    println!("{} {}", snapshot.remaining_clock(), snapshot.stage);
                    last_stage = snapshot.stage;
                }
                match snapshot.status {
                    TimerStatus::Completed => break,
                    TimerStatus::Dead => died = true,
                    TimerStatus::Idle if died => break,
                    _ => {}
                }
            }
        }
    }

    cancel_token.cancel();
    let engine = task.await?;
    save_session(db, &engine)?;
    println!("{}", render(&engine.snapshot())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minutes_come_from_argument_preset_or_default() {
        let config = Config::default();
        assert_eq!(resolve_minutes(&config, Some(40), None).unwrap(), 40);
        assert_eq!(resolve_minutes(&config, None, Some(2)).unwrap(), 50);
        assert_eq!(resolve_minutes(&config, None, None).unwrap(), 25);
        assert!(resolve_minutes(&config, None, Some(7)).is_err());
        assert!(resolve_minutes(&config, Some(5), None).is_err());
    }

    #[test]
    fn render_adds_clock_and_progress() {
        let mut engine = GrowthEngine::in_memory();
        let snapshot = engine.start(10).unwrap();
        let value: serde_json::Value = serde_json::from_str(&render(&snapshot).unwrap()).unwrap();
        assert_eq!(value["remaining"], "10:00");
        assert_eq!(value["progress"], 0.0);
        assert!(value["ends_at"].is_string());
    }
}
