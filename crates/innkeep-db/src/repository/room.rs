//! # Room Repository
//!
//! Minimal room persistence: the billing engine needs rooms for rate
//! snapshots and the AVAILABLE/OCCUPIED flip around check-in and checkout.
//! Full room administration lives outside this engine.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use innkeep_core::{Room, RoomStatus};

/// Repository for room database operations.
#[derive(Debug, Clone)]
pub struct RoomRepository {
    pool: SqlitePool,
}

impl RoomRepository {
    /// Creates a new RoomRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RoomRepository { pool }
    }

    /// Creates a room, initially available.
    pub async fn create(
        &self,
        number: &str,
        day_rate_cents: i64,
        hourly_rate_cents: i64,
    ) -> DbResult<Room> {
        let room = Room {
            id: Uuid::new_v4().to_string(),
            number: number.to_string(),
            day_rate_cents,
            hourly_rate_cents,
            status: RoomStatus::Available,
            created_at: Utc::now(),
        };

        debug!(id = %room.id, number = %room.number, "Creating room");

        sqlx::query(
            r#"
            INSERT INTO rooms (id, number, day_rate_cents, hourly_rate_cents, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&room.id)
        .bind(&room.number)
        .bind(room.day_rate_cents)
        .bind(room.hourly_rate_cents)
        .bind(room.status)
        .bind(room.created_at)
        .execute(&self.pool)
        .await?;

        Ok(room)
    }

    /// Gets a room by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Room>> {
        let room = sqlx::query_as::<_, Room>(
            r#"
            SELECT id, number, day_rate_cents, hourly_rate_cents, status, created_at
            FROM rooms
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(room)
    }

    /// Lists all rooms ordered by door number.
    pub async fn list(&self) -> DbResult<Vec<Room>> {
        let rooms = sqlx::query_as::<_, Room>(
            r#"
            SELECT id, number, day_rate_cents, hourly_rate_cents, status, created_at
            FROM rooms
            ORDER BY number
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rooms)
    }

    /// Sets a room's status unconditionally.
    pub async fn set_status(&self, id: &str, status: RoomStatus) -> DbResult<()> {
        let result = sqlx::query("UPDATE rooms SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Room", id));
        }

        Ok(())
    }

    /// Flips an AVAILABLE room to OCCUPIED inside the caller's transaction.
    ///
    /// Returns false when the room was not available — the guard that stops
    /// two concurrent check-ins from sharing a room.
    pub async fn try_occupy(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE rooms SET status = 'occupied' WHERE id = ?1 AND status = 'available'",
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Releases a room back to AVAILABLE inside the caller's transaction.
    /// Used by the checkout orchestrator together with the stay completion.
    pub async fn release(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE rooms SET status = 'available' WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Room", id));
        }

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
    async fn test_create_and_fetch() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.rooms();

        let room = repo.create("101", 200_000, 15_000).await.unwrap();
        let fetched = repo.get_by_id(&room.id).await.unwrap().unwrap();

        assert_eq!(fetched.number, "101");
        assert_eq!(fetched.day_rate_cents, 200_000);
        assert_eq!(fetched.status, RoomStatus::Available);
    }

    #[tokio::test]
    async fn test_duplicate_number_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.rooms();

        repo.create("101", 200_000, 0).await.unwrap();
        let err = repo.create("101", 180_000, 0).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_try_occupy_guards_double_check_in() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.rooms();

        let room = repo.create("101", 200_000, 0).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(repo.try_occupy(&mut conn, &room.id).await.unwrap());
        assert!(!repo.try_occupy(&mut conn, &room.id).await.unwrap());

        repo.release(&mut conn, &room.id).await.unwrap();
        assert!(repo.try_occupy(&mut conn, &room.id).await.unwrap());
    }
}
