//! Tree growth stages.
//!
//! The stage is never stored. It is recomputed from the session's status and
//! progress every time it is read.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::session::TimerStatus;

/// Upper bound (exclusive) of the Seed stage.
pub const SEED_UNTIL: f64 = 0.4;
/// Upper bound (exclusive) of the Sapling stage.
pub const SAPLING_UNTIL: f64 = 0.7;
/// Upper bound (exclusive) of the Plant stage.
pub const PLANT_UNTIL: f64 = 0.9;
/// Upper bound (exclusive) of the Tree stage; Fruiting from here on.
pub const TREE_UNTIL: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStage {
    Empty,
    Seed,
    Sapling,
    Plant,
    Tree,
    Fruiting,
    Dead,
}

impl TreeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreeStage::Empty => "empty",
            TreeStage::Seed => "seed",
            TreeStage::Sapling => "sapling",
            TreeStage::Plant => "plant",
            TreeStage::Tree => "tree",
            TreeStage::Fruiting => "fruiting",
            TreeStage::Dead => "dead",
        }
    }
}

impl fmt::Display for TreeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 0.0 .. 1.0 fraction of the session already elapsed.
///
/// Zero when there is no duration.
pub fn progress(remaining_secs: u64, duration_secs: u64) -> f64 {
    if duration_secs == 0 {
        return 0.0;
    }
    1.0 - (remaining_secs as f64 / duration_secs as f64)
}

/// Derive the stage for a `(status, remaining, duration)` triple.
pub fn derive_stage(status: TimerStatus, remaining_secs: u64, duration_secs: u64) -> TreeStage {
    match status {
        TimerStatus::Dead => return TreeStage::Dead,
        TimerStatus::Completed => return TreeStage::Fruiting,
        TimerStatus::Idle => return TreeStage::Empty,
        TimerStatus::Running | TimerStatus::Paused => {}
    }
    if duration_secs == 0 {
        return TreeStage::Empty;
    }

    let progress = progress(remaining_secs, duration_secs);
    if progress < SEED_UNTIL {
        TreeStage::Seed
    } else if progress < SAPLING_UNTIL {
        TreeStage::Sapling
    } else if progress < PLANT_UNTIL {
        TreeStage::Plant
    } else if progress < TREE_UNTIL {
        TreeStage::Tree
    } else {
        TreeStage::Fruiting
    }
}
