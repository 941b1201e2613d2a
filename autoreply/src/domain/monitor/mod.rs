//! Monitor aggregate.

mod entity;
mod status;

pub use entity::{
    FilterConfig, LastError, Monitor, MonitorProgress, MonitorStats, MonitoredPost, PostSelection,
    RateLimitSettings, ResponseBehavior, RetentionSettings,
};
pub use status::MonitorStatus;
