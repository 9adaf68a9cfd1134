//! # Checkout Policy Repository
//!
//! Persistence for the three checkout billing modes. The default flag obeys
//! the same exclusivity rule as the active financial year: at most one, and
//! changing it is a single transaction.

use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use innkeep_core::CheckoutPolicy;

/// Repository for checkout policy database operations.
#[derive(Debug, Clone)]
pub struct CheckoutPolicyRepository {
    pool: SqlitePool,
}

impl CheckoutPolicyRepository {
    /// Creates a new CheckoutPolicyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CheckoutPolicyRepository { pool }
    }

    /// Creates a checkout policy.
    ///
    /// `hours` and `fixed_time` are mutually exclusive (also enforced by a
    /// CHECK constraint); rows violating neither-column fall through to the
    /// base-rate billing mode rather than erroring.
    pub async fn create(
        &self,
        label: &str,
        hours: Option<i64>,
        fixed_time: Option<&str>,
    ) -> DbResult<CheckoutPolicy> {
        let policy = CheckoutPolicy {
            id: Uuid::new_v4().to_string(),
            label: label.to_string(),
            hours,
            fixed_time: fixed_time.map(str::to_string),
            is_default: false,
        };

        debug!(id = %policy.id, label = %policy.label, "Creating checkout policy");

        sqlx::query(
            r#"
            INSERT INTO checkout_policies (id, label, hours, fixed_time, is_default)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.label)
        .bind(policy.hours)
        .bind(&policy.fixed_time)
        .bind(policy.is_default)
        .execute(&self.pool)
        .await?;

        Ok(policy)
    }

    /// Gets a policy by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CheckoutPolicy>> {
        let policy = sqlx::query_as::<_, CheckoutPolicy>(
            r#"
            SELECT id, label, hours, fixed_time, is_default
            FROM checkout_policies
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy)
    }

    /// Gets the default policy for new check-ins, if one is set.
    pub async fn get_default(&self) -> DbResult<Option<CheckoutPolicy>> {
        let policy = sqlx::query_as::<_, CheckoutPolicy>(
            r#"
            SELECT id, label, hours, fixed_time, is_default
            FROM checkout_policies
            WHERE is_default = 1
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy)
    }

    /// Lists all policies.
    pub async fn list(&self) -> DbResult<Vec<CheckoutPolicy>> {
        let policies = sqlx::query_as::<_, CheckoutPolicy>(
            r#"
            SELECT id, label, hours, fixed_time, is_default
            FROM checkout_policies
            ORDER BY label
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(policies)
    }

    /// Makes a policy the default, clearing the flag everywhere else.
    pub async fn set_default(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE checkout_policies SET is_default = 0 WHERE is_default = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE checkout_policies SET is_default = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CheckoutPolicy", id));
        }

        tx.commit().await?;

        info!(id = %id, "Default checkout policy changed");
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
    async fn test_default_is_exclusive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.checkout_policies();

        let day = repo.create("24 Hours", Some(24), None).await.unwrap();
        let noon = repo.create("12 Noon", None, Some("12:00")).await.unwrap();

        repo.set_default(&day.id).await.unwrap();
        repo.set_default(&noon.id).await.unwrap();

        let default = repo.get_default().await.unwrap().unwrap();
        assert_eq!(default.id, noon.id);

        let day = repo.get_by_id(&day.id).await.unwrap().unwrap();
        assert!(!day.is_default);
    }

    #[tokio::test]
    async fn test_mutually_exclusive_columns_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.checkout_policies();

        let err = repo.create("Broken", Some(24), Some("12:00")).await;
        assert!(err.is_err());
    }
}
