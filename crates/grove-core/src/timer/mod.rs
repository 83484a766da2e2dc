pub mod driver;
mod engine;
mod session;
mod stage;

pub use driver::{spawn_driver, DriverError, DriverHandle, DriverOptions};
pub use engine::{DriftPolicy, GrowthEngine, AUTO_RESET_DELAY};
pub use session::{Command, PendingReset, Session, Snapshot, TimerStatus};
pub use stage::{
    derive_stage, progress, TreeStage, PLANT_UNTIL, SAPLING_UNTIL, SEED_UNTIL, TREE_UNTIL,
};
