//! # Grove Core Library
//!
//! Core logic for Grove, a focus timer where a tree grows while you stay
//! focused and dies if you break focus twice. The CLI is a thin layer over
//! this crate.
//!
//! ## Architecture
//!
//! - **Growth Engine**: a synchronous state machine; the caller invokes
//!   `tick()` once per second while a session runs
//! - **Driver**: an async task that owns the engine, ticks it, fires the
//!   post-death auto reset and serialises commands from any number of handles
//! - **Ports**: [`Notifier`] for lifecycle events, [`Clock`] for drift
//!   correction, [`CounterStore`] for the completed-session counter
//! - **Storage**: SQLite key-value store and TOML configuration
//!
//! ## Key Components
//!
//! - [`GrowthEngine`]: Core timer state machine
//! - [`DriverHandle`]: Handle to a running tick driver
//! - [`Database`]: Key-value persistence
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod notify;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use error::{ConfigError, CoreError, DatabaseError, EngineError};
pub use events::Event;
pub use notify::{ChannelNotifier, NoopNotifier, Notifier, TracingNotifier};
pub use storage::{Config, CounterStore, Database, KvCounterStore, MemoryCounterStore};
pub use timer::{
    spawn_driver, DriftPolicy, DriverError, DriverHandle, DriverOptions, GrowthEngine, Session,
    Snapshot, TimerStatus, TreeStage,
};
