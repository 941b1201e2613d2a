//! Reply generation.

mod generator;
mod template;

pub use generator::{FALLBACK_RESPONSE, GeneratedResponse, RotationUpdate, generate};
pub use template::TemplateVars;
