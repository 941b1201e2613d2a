//! Database models for autoreply.
//!
//! These models map directly to the database schema and handle
//! serialization/deserialization of JSON fields.

pub mod monitor;
pub mod response;
pub mod rule;

pub use monitor::*;
pub use response::*;
pub use rule::*;
