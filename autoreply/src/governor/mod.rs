//! Rate governor and load monitor.

mod load;
mod service;
mod window;

pub use load::{LoadDecision, LoadMonitor, LoadMonitorConfig};
pub use service::{
    AdmissionDenied, AdmissionPermit, BATCH_SIZE_DEFAULT, BATCH_SIZE_MAX, BATCH_SIZE_MIN,
    GovernorSnapshot, RateGovernor,
};
