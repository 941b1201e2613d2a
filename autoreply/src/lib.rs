//! autoreply library crate.
//!
//! Watches page posts for new comments and answers them through keyword
//! rules, under global, per-owner and per-monitor throughput ceilings.

pub mod analysis;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod governor;
pub mod limits;
pub mod logging;
pub mod monitor;
pub mod platform;
pub mod response;
pub mod retention;
pub mod scheduler;

pub use error::{Error, Result};
