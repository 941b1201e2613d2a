//! Monitor processing.

pub mod events;
mod outcome;
mod processor;

pub use events::{EngineEvent, EngineEventBroadcaster};
pub use outcome::{CommentOutcome, PostReport, ProcessReport, SkipReason};
pub use processor::{MonitorProcessor, ProcessorConfig};
