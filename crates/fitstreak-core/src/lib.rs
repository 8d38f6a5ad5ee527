//! Core streak engine for fitstreak
//!
//! This crate contains:
//! - The streak calculator (workout history -> snapshot, full or incremental)
//! - The milestone evaluator (streak length -> badge, fire-once detection)
//! - The update orchestrator (NoHistory -> Active -> Broken -> Active)

mod calculator;
mod engine;
mod events;
mod milestones;

pub use calculator::*;
pub use engine::*;
pub use events::*;
pub use milestones::*;
