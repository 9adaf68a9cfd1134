//! # Stay Repository
//!
//! Persistence for guest stays. A stay is inserted at check-in and mutated
//! exactly once afterwards: the checkout orchestrator stamps
//! `check_out_time` and flips the status to COMPLETED. Everything else on
//! the row is a frozen snapshot.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use innkeep_core::Stay;

/// Repository for stay database operations.
#[derive(Debug, Clone)]
pub struct StayRepository {
    pool: SqlitePool,
}

impl StayRepository {
    /// Creates a new StayRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StayRepository { pool }
    }

    /// Inserts a stay inside the caller's check-in transaction.
    pub async fn insert(&self, conn: &mut SqliteConnection, stay: &Stay) -> DbResult<()> {
        debug!(id = %stay.id, room_id = %stay.room_id, "Inserting stay");

        sqlx::query(
            r#"
            INSERT INTO stays (
                id, guest_id, room_id,
                check_in_time, expected_check_out_time, check_out_time,
                checkout_policy_id, rate_applied_cents, grace_minutes,
                status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&stay.id)
        .bind(&stay.guest_id)
        .bind(&stay.room_id)
        .bind(stay.check_in_time)
        .bind(stay.expected_check_out_time)
        .bind(stay.check_out_time)
        .bind(&stay.checkout_policy_id)
        .bind(stay.rate_applied_cents)
        .bind(stay.grace_minutes)
        .bind(stay.status)
        .bind(stay.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets a stay by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Stay>> {
        let stay = sqlx::query_as::<_, Stay>(
            r#"
            SELECT id, guest_id, room_id,
                   check_in_time, expected_check_out_time, check_out_time,
                   checkout_policy_id, rate_applied_cents, grace_minutes,
                   status, created_at
            FROM stays
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stay)
    }

    /// Lists all active stays, oldest check-in first. The daily sweep walks
    /// this list.
    pub async fn list_active(&self) -> DbResult<Vec<Stay>> {
        let stays = sqlx::query_as::<_, Stay>(
            r#"
            SELECT id, guest_id, room_id,
                   check_in_time, expected_check_out_time, check_out_time,
                   checkout_policy_id, rate_applied_cents, grace_minutes,
                   status, created_at
            FROM stays
            WHERE status = 'active'
            ORDER BY check_in_time
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(stays)
    }

    /// Completes a stay and releases its room, atomically.
    ///
    /// Returns false when the stay was not ACTIVE — the status guard that
    /// makes a second checkout fail fast instead of silently re-running.
    pub async fn complete(
        &self,
        stay_id: &str,
        room_id: &str,
        check_out: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE stays
            SET status = 'completed', check_out_time = ?2
            WHERE id = ?1 AND status = 'active'
            "#,
        )
        .bind(stay_id)
        .bind(check_out)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE rooms SET status = 'available' WHERE id = ?1")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(id = %stay_id, room_id = %room_id, "Stay completed, room released");
        Ok(true)
    }
}
