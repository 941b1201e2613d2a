//! Domain layer for autoreply.
//!
//! Entities, value objects and the pure comment evaluation logic.

pub mod comment;
pub mod filter;
pub mod monitor;
pub mod response;
pub mod rule;
pub mod value_objects;

pub use comment::IncomingComment;
pub use monitor::{Monitor, MonitorStatus};
pub use response::{DispatchError, DispatchOutcome, ResponseRecord};
pub use rule::{MatchMode, Rule, ScheduleWindow};
pub use value_objects::*;
