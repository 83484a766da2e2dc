//! Engine lifecycle through the public API, backed by the SQLite store.

use std::sync::{Arc, Mutex};

use grove_core::{
    ChannelNotifier, CounterStore, Database, DriftPolicy, Event, GrowthEngine, KvCounterStore,
    ManualClock, Session, TimerStatus, TreeStage,
};

fn shared_db() -> Arc<Mutex<Database>> {
    Arc::new(Mutex::new(Database::open_memory().unwrap()))
}

fn engine(db: &Arc<Mutex<Database>>, clock: &ManualClock) -> GrowthEngine {
    GrowthEngine::new(
        Box::new(KvCounterStore::new(db.clone())),
        Box::new(grove_core::NoopNotifier),
        Arc::new(clock.clone()),
    )
    .unwrap()
}

#[test]
fn full_session_grows_through_every_stage() {
    let db = shared_db();
    let clock = ManualClock::new(0);
    let mut engine = engine(&db, &clock);

    engine.start(10).unwrap();
    let mut seen = vec![engine.stage()];
    while engine.status() == TimerStatus::Running {
        clock.advance_secs(1);
        let snapshot = engine.tick();
        if seen.last() != Some(&snapshot.stage) {
            seen.push(snapshot.stage);
        }
    }

    assert_eq!(
        seen,
        vec![
            TreeStage::Seed,
            TreeStage::Sapling,
            TreeStage::Plant,
            TreeStage::Tree,
            TreeStage::Fruiting,
        ]
    );
    assert_eq!(engine.status(), TimerStatus::Completed);
    assert_eq!(engine.completed_count(), 1);
}

#[test]
fn completed_count_survives_a_new_engine() {
    let db = shared_db();
    let clock = ManualClock::new(0);

    let mut first = engine(&db, &clock);
    first.start(1).unwrap();
    first.reconcile(60);
    assert_eq!(first.status(), TimerStatus::Completed);
    drop(first);

    let second = engine(&db, &clock);
    assert_eq!(second.completed_count(), 1);
    let store = KvCounterStore::new(db);
    assert_eq!(store.load().unwrap(), 1);
}

#[test]
fn parked_session_catches_up_on_resync() {
    let db = shared_db();
    let clock = ManualClock::new(1_000_000);

    let mut engine_a = engine(&db, &clock);
    engine_a.start(10).unwrap();
    let parked = serde_json::to_string(engine_a.session()).unwrap();
    drop(engine_a);

    clock.advance_ms(90_500);
    let session: Session = serde_json::from_str(&parked).unwrap();
    let mut engine_b = engine(&db, &clock).with_session(session);
    assert_eq!(engine_b.resync().remaining_secs, 600 - 90);

    // The half second carried over completes on the next resync.
    clock.advance_ms(500);
    assert_eq!(engine_b.resync().remaining_secs, 600 - 91);
}

#[test]
fn forgiveness_absorbs_short_gaps() {
    let db = shared_db();
    let clock = ManualClock::new(0);
    let mut engine = engine(&db, &clock).with_drift_policy(DriftPolicy {
        forgiveness_secs: 5,
    });

    engine.start(10).unwrap();
    clock.advance_secs(4);
    assert_eq!(engine.resync().remaining_secs, 600);
    // The forgiven 4 s stay pending and count toward the next gap.
    clock.advance_secs(20);
    assert_eq!(engine.resync().remaining_secs, 600 - 19);
}

#[test]
fn death_resets_after_delay_and_notifies() {
    let db = shared_db();
    let clock = ManualClock::new(0);
    let (notifier, mut events) = ChannelNotifier::new(8);
    let mut engine = GrowthEngine::new(
        Box::new(KvCounterStore::new(db)),
        Box::new(notifier),
        Arc::new(clock.clone()),
    )
    .unwrap();

    engine.start(10).unwrap();
    engine.pause().unwrap();
    engine.resume().unwrap();
    let dead = engine.pause().unwrap();
    assert_eq!(dead.status, TimerStatus::Dead);
    assert_eq!(dead.stage, TreeStage::Dead);

    assert_eq!(events.try_recv().unwrap(), Event::Paused);
    assert_eq!(events.try_recv().unwrap(), Event::Killed);
    assert!(events.try_recv().is_err());

    clock.advance_ms(2_999);
    assert_eq!(engine.poll().status, TimerStatus::Dead);
    clock.advance_ms(1);
    let reset = engine.poll();
    assert_eq!(reset.status, TimerStatus::Idle);
    assert_eq!(reset.stage, TreeStage::Empty);
    assert!(!reset.pause_used);
    assert_eq!(engine.completed_count(), 0);
}
