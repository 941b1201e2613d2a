//! Owner subscription lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::time::datetime_to_ms;
use crate::domain::SubscriptionTier;

/// Source of owner subscription tiers.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    async fn subscription_tier(&self, owner_id: &str) -> Result<SubscriptionTier>;
}

/// SQLx implementation of OwnerDirectory. Unknown owners get the default tier.
pub struct SqlxOwnerDirectory {
    pool: SqlitePool,
    default_tier: SubscriptionTier,
}

impl SqlxOwnerDirectory {
    pub fn new(pool: SqlitePool, default_tier: SubscriptionTier) -> Self {
        Self { pool, default_tier }
    }

    pub async fn set_tier(&self, owner_id: &str, tier: SubscriptionTier) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO owners (id, subscription_tier, created_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET subscription_tier = excluded.subscription_tier
            "#,
        )
        .bind(owner_id)
        .bind(tier.as_str())
        .bind(datetime_to_ms(chrono::Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OwnerDirectory for SqlxOwnerDirectory {
    async fn subscription_tier(&self, owner_id: &str) -> Result<SubscriptionTier> {
        let tier: Option<String> =
            sqlx::query_scalar("SELECT subscription_tier FROM owners WHERE id = ?")
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(tier
            .as_deref()
            .and_then(SubscriptionTier::parse)
            .unwrap_or(self.default_tier))
    }
}

/// In-process owner directory.
#[derive(Debug, Default)]
pub struct StaticOwnerDirectory {
    tiers: RwLock<HashMap<String, SubscriptionTier>>,
    default_tier: SubscriptionTier,
}

impl StaticOwnerDirectory {
    pub fn new(default_tier: SubscriptionTier) -> Self {
        Self {
            tiers: RwLock::new(HashMap::new()),
            default_tier,
        }
    }

    pub fn set_tier(&self, owner_id: impl Into<String>, tier: SubscriptionTier) {
        self.tiers.write().insert(owner_id.into(), tier);
    }
}

#[async_trait]
impl OwnerDirectory for StaticOwnerDirectory {
    async fn subscription_tier(&self, owner_id: &str) -> Result<SubscriptionTier> {
        Ok(self
            .tiers
            .read()
            .get(owner_id)
            .copied()
            .unwrap_or(self.default_tier))
    }
}
