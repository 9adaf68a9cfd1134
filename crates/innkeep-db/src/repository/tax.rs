//! # Tax Slab Repository
//!
//! At most one tax slab is active at a time. When none is, the recalculation
//! pipeline freezes each bill's tax at its last computed value — deactivating
//! tax is an explicit operating mode, not an error.

use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use innkeep_core::TaxSlab;

/// Repository for tax slab database operations.
#[derive(Debug, Clone)]
pub struct TaxSlabRepository {
    pool: SqlitePool,
}

impl TaxSlabRepository {
    /// Creates a new TaxSlabRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TaxSlabRepository { pool }
    }

    /// Creates a tax slab, initially inactive.
    pub async fn create(&self, label: &str, rate_bps: i64) -> DbResult<TaxSlab> {
        let slab = TaxSlab {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            rate_bps,
            is_active: false,
        };

        debug!(id = %slab.id, label = %slab.label, rate_bps = slab.rate_bps, "Creating tax slab");

        sqlx::query(
            r#"
            INSERT INTO tax_slabs (id, label, rate_bps, is_active)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&slab.id)
        .bind(&slab.label)
        .bind(slab.rate_bps)
        .bind(slab.is_active)
        .execute(&self.pool)
        .await?;

        Ok(slab)
    }

    /// Gets a slab by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TaxSlab>> {
        let slab = sqlx::query_as::<_, TaxSlab>(
            "SELECT id, label, rate_bps, is_active FROM tax_slabs WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(slab)
    }

    /// Gets the active slab, if any.
    pub async fn get_active(&self) -> DbResult<Option<TaxSlab>> {
        let slab = sqlx::query_as::<_, TaxSlab>(
            "SELECT id, label, rate_bps, is_active FROM tax_slabs WHERE is_active = 1 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(slab)
    }

    /// Lists all slabs.
    pub async fn list(&self) -> DbResult<Vec<TaxSlab>> {
        let slabs = sqlx::query_as::<_, TaxSlab>(
            "SELECT id, label, rate_bps, is_active FROM tax_slabs ORDER BY label",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(slabs)
    }

    /// Activates a slab, deactivating all others atomically.
    pub async fn set_active(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE tax_slabs SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE tax_slabs SET is_active = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("TaxSlab", id));
        }

        tx.commit().await?;

        info!(id = %id, "Tax slab activated");
        Ok(())
    }

    /// Deactivates every slab. Bills keep their last computed tax from here
    /// on (the freeze fallback).
    pub async fn deactivate_all(&self) -> DbResult<()> {
        sqlx::query("UPDATE tax_slabs SET is_active = 0 WHERE is_active = 1")
            .execute(&self.pool)
            .await?;

        info!("All tax slabs deactivated");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_active_is_exclusive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tax_slabs();

        let gst5 = repo.create("GST 5%", 500).await.unwrap();
        let gst12 = repo.create("GST 12%", 1200).await.unwrap();

        repo.set_active(&gst5.id).await.unwrap();
        repo.set_active(&gst12.id).await.unwrap();

        let active = repo.get_active().await.unwrap().unwrap();
        assert_eq!(active.id, gst12.id);
        assert_eq!(active.rate().bps(), 1200);
    }

    #[tokio::test]
    async fn test_deactivate_all() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.tax_slabs();

        let gst5 = repo.create("GST 5%", 500).await.unwrap();
        repo.set_active(&gst5.id).await.unwrap();
        repo.deactivate_all().await.unwrap();

        assert!(repo.get_active().await.unwrap().is_none());
    }
}
