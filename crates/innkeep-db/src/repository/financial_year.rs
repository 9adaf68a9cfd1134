//! # Financial Year Repository
//!
//! Owns the active accounting period and the per-year invoice counter.
//!
//! ## Invoice Numbering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  next_invoice_number (inside the bill-creation transaction)             │
//! │                                                                         │
//! │  UPDATE financial_years                                                 │
//! │     SET current_invoice_no = current_invoice_no + 1                     │
//! │   WHERE id = ?                                                          │
//! │  RETURNING current_invoice_no, invoice_prefix                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  "HTL-000042"  (prefix falls back to the financial year id)             │
//! │                                                                         │
//! │  Because the increment and the bill INSERT commit together, two         │
//! │  concurrent check-ins can never receive the same number.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use innkeep_core::{FinancialYear, SEQUENCE_WIDTH};

/// Input for creating a financial year.
#[derive(Debug, Clone)]
pub struct NewFinancialYear {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub invoice_prefix: Option<String>,
}

/// Repository for financial year database operations.
#[derive(Debug, Clone)]
pub struct FinancialYearRepository {
    pool: SqlitePool,
}

impl FinancialYearRepository {
    /// Creates a new FinancialYearRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FinancialYearRepository { pool }
    }

    /// Creates a financial year. New years start inactive with a zeroed
    /// invoice counter; use [`FinancialYearRepository::set_active`] to open it.
    pub async fn create(&self, input: &NewFinancialYear) -> DbResult<FinancialYear> {
        let fy = FinancialYear {
            id: Uuid::new_v4().to_string(),
            name: input.name.clone(),
            start_date: input.start_date,
            end_date: input.end_date,
            invoice_prefix: input.invoice_prefix.clone(),
            current_invoice_no: 0,
            is_active: false,
            created_at: Utc::now(),
        };

        debug!(id = %fy.id, name = %fy.name, "Creating financial year");

        sqlx::query(
            r#"
            INSERT INTO financial_years (
                id, name, start_date, end_date,
                invoice_prefix, current_invoice_no, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&fy.id)
        .bind(&fy.name)
        .bind(fy.start_date)
        .bind(fy.end_date)
        .bind(&fy.invoice_prefix)
        .bind(fy.current_invoice_no)
        .bind(fy.is_active)
        .bind(fy.created_at)
        .execute(&self.pool)
        .await?;

        Ok(fy)
    }

    /// Gets a financial year by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<FinancialYear>> {
        let fy = sqlx::query_as::<_, FinancialYear>(
            r#"
            SELECT id, name, start_date, end_date,
                   invoice_prefix, current_invoice_no, is_active, created_at
            FROM financial_years
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(fy)
    }

    /// Gets the active financial year, if any.
    pub async fn get_active(&self) -> DbResult<Option<FinancialYear>> {
        let fy = sqlx::query_as::<_, FinancialYear>(
            r#"
            SELECT id, name, start_date, end_date,
                   invoice_prefix, current_invoice_no, is_active, created_at
            FROM financial_years
            WHERE is_active = 1
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(fy)
    }

    /// Lists all financial years, newest period first.
    pub async fn list(&self) -> DbResult<Vec<FinancialYear>> {
        let years = sqlx::query_as::<_, FinancialYear>(
            r#"
            SELECT id, name, start_date, end_date,
                   invoice_prefix, current_invoice_no, is_active, created_at
            FROM financial_years
            ORDER BY start_date DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(years)
    }

    /// Activates a financial year, deactivating all others.
    ///
    /// ## Atomicity
    /// Deactivate-all and activate-one commit together: there is never a
    /// window with zero or multiple active years visible to readers.
    pub async fn set_active(&self, id: &str) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE financial_years SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE financial_years SET is_active = 1 WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            // Transaction drops without commit: prior active year survives.
            return Err(DbError::not_found("FinancialYear", id));
        }

        tx.commit().await?;

        info!(id = %id, "Financial year activated");
        Ok(())
    }

    /// Atomically increments the invoice counter and formats the next
    /// invoice number.
    ///
    /// ## MUST run inside the bill-creation transaction
    /// Callers pass the open transaction's connection; the counter bump only
    /// becomes visible when the bill insert commits with it.
    pub async fn next_invoice_number(
        &self,
        conn: &mut SqliteConnection,
        fy_id: &str,
    ) -> DbResult<String> {
        let row = sqlx::query_as::<_, (i64, Option<String>)>(
            r#"
            UPDATE financial_years
            SET current_invoice_no = current_invoice_no + 1
            WHERE id = ?1
            RETURNING current_invoice_no, invoice_prefix
            "#,
        )
        .bind(fy_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (counter, prefix) = row.ok_or_else(|| DbError::not_found("FinancialYear", fy_id))?;
        let tag = prefix.unwrap_or_else(|| fy_id.to_string());

        Ok(format!("{tag}-{counter:0width$}", width = SEQUENCE_WIDTH))
    }

    /// Administrative counter reset.
    ///
    /// No uniqueness guarantee survives a reset: numbers issued afterwards
    /// can collide with numbers issued before (and will be rejected by the
    /// unique index on bills.invoice_no). Documented operator risk.
    pub async fn reset_counter(&self, fy_id: &str) -> DbResult<()> {
        warn!(id = %fy_id, "Resetting invoice counter");

        let result =
            sqlx::query("UPDATE financial_years SET current_invoice_no = 0 WHERE id = ?1")
                .bind(fy_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("FinancialYear", fy_id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
