//! Repository layer for database access.
//!
//! Every store sits behind an `async_trait` so the engine runs unchanged on
//! SQLite or on the in-memory implementations.

pub mod memory;
pub mod monitor;
pub mod owner;
pub mod response;
pub mod rule;

pub use memory::*;
pub use monitor::*;
pub use owner::*;
pub use response::*;
pub use rule::*;

use std::sync::Arc;

use crate::database::DbPool;
use crate::domain::SubscriptionTier;

/// The stores the engine works against.
#[derive(Clone)]
pub struct Repositories {
    pub monitors: Arc<dyn MonitorRepository>,
    pub rules: Arc<dyn RuleRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub owners: Arc<dyn OwnerDirectory>,
}

impl Repositories {
    /// SQLite-backed stores sharing one pool.
    pub fn sqlite(pool: DbPool, default_tier: SubscriptionTier) -> Self {
        Self {
            monitors: Arc::new(SqlxMonitorRepository::new(pool.clone())),
            rules: Arc::new(SqlxRuleRepository::new(pool.clone())),
            responses: Arc::new(SqlxResponseRepository::new(pool.clone())),
            owners: Arc::new(SqlxOwnerDirectory::new(pool, default_tier)),
        }
    }

    /// Fresh in-memory stores.
    pub fn memory(default_tier: SubscriptionTier) -> Self {
        Self {
            monitors: Arc::new(MemoryMonitorRepository::new()),
            rules: Arc::new(MemoryRuleRepository::new()),
            responses: Arc::new(MemoryResponseRepository::new()),
            owners: Arc::new(StaticOwnerDirectory::new(default_tier)),
        }
    }
}
