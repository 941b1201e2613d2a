//! Timer-driven batch passes over active monitors.
//!
//! Each tick takes the least-recently-checked active monitors, bounded by the
//! governor's current batch size, and processes them one after another. At
//! most one batch runs at a time.

mod batch;

pub use batch::{BatchOutcome, BatchScheduler, SchedulerConfig};
