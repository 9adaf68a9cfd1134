//! # Bill Repository
//!
//! Database operations for bills and their two child collections: extra
//! charge lines and the append-only payment ledger (plus the money receipts
//! issued against it).
//!
//! ## Derived-Field Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Source facts                      Derived snapshot (bills row)         │
//! │  ──────────────                    ────────────────────────────         │
//! │  stay + room + policy   ────┐                                           │
//! │  extra_charges rows     ────┤      room_charge_cents                    │
//! │  payments rows          ────┼───►  extra_charge_cents, tax_cents,       │
//! │  active tax slab        ────┤      final_amount_cents, advance/total    │
//! │  discount_cents (input) ────┘      paid, balance_cents, payment_status  │
//! │                                                                         │
//! │  Writers on this repository touch SOURCE rows (and discount_cents).     │
//! │  The derived snapshot is written ONLY by write_totals(), and only the   │
//! │  recalculation pipeline calls it.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use innkeep_core::{
    Bill, ExtraChargeLine, MoneyReceipt, Payment, PaymentStatus, MR_PREFIX, SEQUENCE_WIDTH,
};

/// The derived monetary fields written back by one recalculation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillTotals {
    pub room_charge_cents: i64,
    pub extra_charge_cents: i64,
    pub tax_cents: i64,
    pub final_amount_cents: i64,
    pub advance_paid_cents: i64,
    pub total_paid_cents: i64,
    pub balance_cents: i64,
    pub payment_status: PaymentStatus,
}

impl BillTotals {
    /// True when a bill row already carries exactly these values, in which
    /// case the pipeline skips the write entirely (recalculation is
    /// idempotent down to `updated_at`).
    pub fn matches(&self, bill: &Bill) -> bool {
        self.room_charge_cents == bill.room_charge_cents
            && self.extra_charge_cents == bill.extra_charge_cents
            && self.tax_cents == bill.tax_cents
            && self.final_amount_cents == bill.final_amount_cents
            && self.advance_paid_cents == bill.advance_paid_cents
            && self.total_paid_cents == bill.total_paid_cents
            && self.balance_cents == bill.balance_cents
            && self.payment_status == bill.payment_status
    }
}

/// Repository for bill database operations.
#[derive(Debug, Clone)]
pub struct BillRepository {
    pool: SqlitePool,
}

impl BillRepository {
    /// Creates a new BillRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BillRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Bill rows
    // -------------------------------------------------------------------------

    /// Inserts a bill inside the caller's transaction — the same transaction
    /// that incremented the invoice counter, so numbers and bills commit
    /// together.
    pub async fn insert(&self, conn: &mut SqliteConnection, bill: &Bill) -> DbResult<()> {
        debug!(id = %bill.id, invoice_no = %bill.invoice_no, "Inserting bill");

        sqlx::query(
            r#"
            INSERT INTO bills (
                id, stay_id, financial_year_id, invoice_no,
                room_charge_cents, extra_charge_cents, discount_cents, tax_cents,
                final_amount_cents, advance_paid_cents, total_paid_cents, balance_cents,
                payment_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&bill.id)
        .bind(&bill.stay_id)
        .bind(&bill.financial_year_id)
        .bind(&bill.invoice_no)
        .bind(bill.room_charge_cents)
        .bind(bill.extra_charge_cents)
        .bind(bill.discount_cents)
        .bind(bill.tax_cents)
        .bind(bill.final_amount_cents)
        .bind(bill.advance_paid_cents)
        .bind(bill.total_paid_cents)
        .bind(bill.balance_cents)
        .bind(bill.payment_status)
        .bind(bill.created_at)
        .bind(bill.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets a bill by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, stay_id, financial_year_id, invoice_no,
                   room_charge_cents, extra_charge_cents, discount_cents, tax_cents,
                   final_amount_cents, advance_paid_cents, total_paid_cents, balance_cents,
                   payment_status, created_at, updated_at
            FROM bills
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bill)
    }

    /// Gets the bill belonging to a stay (one-to-one).
    pub async fn get_by_stay(&self, stay_id: &str) -> DbResult<Option<Bill>> {
        let bill = sqlx::query_as::<_, Bill>(
            r#"
            SELECT id, stay_id, financial_year_id, invoice_no,
                   room_charge_cents, extra_charge_cents, discount_cents, tax_cents,
                   final_amount_cents, advance_paid_cents, total_paid_cents, balance_cents,
                   payment_status, created_at, updated_at
            FROM bills
            WHERE stay_id = ?1
            "#,
        )
        .bind(stay_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(bill)
    }

    /// Lists the bills of all ACTIVE stays — the daily sweep's work list.
    pub async fn list_for_active_stays(&self) -> DbResult<Vec<Bill>> {
        let bills = sqlx::query_as::<_, Bill>(
            r#"
            SELECT b.id, b.stay_id, b.financial_year_id, b.invoice_no,
                   b.room_charge_cents, b.extra_charge_cents, b.discount_cents, b.tax_cents,
                   b.final_amount_cents, b.advance_paid_cents, b.total_paid_cents, b.balance_cents,
                   b.payment_status, b.created_at, b.updated_at
            FROM bills b
            JOIN stays s ON s.id = b.stay_id
            WHERE s.status = 'active'
            ORDER BY s.check_in_time
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(bills)
    }

    /// Sets the discount, the one hand-entered monetary field on a bill.
    /// The caller has already resolved percent input to a currency amount.
    pub async fn set_discount(&self, bill_id: &str, discount_cents: i64) -> DbResult<()> {
        let result = sqlx::query("UPDATE bills SET discount_cents = ?2 WHERE id = ?1")
            .bind(bill_id)
            .bind(discount_cents)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bill", bill_id));
        }

        Ok(())
    }

    /// Writes one consistent derived snapshot back to the bill row.
    ///
    /// A single UPDATE: readers see either the previous snapshot or the new
    /// one, never a half-written mix.
    pub async fn write_totals(
        &self,
        bill_id: &str,
        totals: &BillTotals,
        updated_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bills SET
                room_charge_cents = ?2,
                extra_charge_cents = ?3,
                tax_cents = ?4,
                final_amount_cents = ?5,
                advance_paid_cents = ?6,
                total_paid_cents = ?7,
                balance_cents = ?8,
                payment_status = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(bill_id)
        .bind(totals.room_charge_cents)
        .bind(totals.extra_charge_cents)
        .bind(totals.tax_cents)
        .bind(totals.final_amount_cents)
        .bind(totals.advance_paid_cents)
        .bind(totals.total_paid_cents)
        .bind(totals.balance_cents)
        .bind(totals.payment_status)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Bill", bill_id));
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Extra charge lines
    // -------------------------------------------------------------------------

    /// Inserts an extra charge line.
    pub async fn add_extra_charge(&self, line: &ExtraChargeLine) -> DbResult<()> {
        debug!(bill_id = %line.bill_id, charge_type = %line.charge_type, "Adding extra charge");

        sqlx::query(
            r#"
            INSERT INTO extra_charges (
                id, bill_id, charge_type, description,
                unit_amount_cents, quantity, total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&line.id)
        .bind(&line.bill_id)
        .bind(&line.charge_type)
        .bind(&line.description)
        .bind(line.unit_amount_cents)
        .bind(line.quantity)
        .bind(line.total_cents)
        .bind(line.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets one extra charge line, scoped to its bill.
    pub async fn get_extra_charge(
        &self,
        bill_id: &str,
        line_id: &str,
    ) -> DbResult<Option<ExtraChargeLine>> {
        let line = sqlx::query_as::<_, ExtraChargeLine>(
            r#"
            SELECT id, bill_id, charge_type, description,
                   unit_amount_cents, quantity, total_cents, created_at
            FROM extra_charges
            WHERE bill_id = ?1 AND id = ?2
            "#,
        )
        .bind(bill_id)
        .bind(line_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(line)
    }

    /// Rewrites an extra charge line's amount fields.
    pub async fn update_extra_charge(
        &self,
        bill_id: &str,
        line_id: &str,
        description: &str,
        unit_amount_cents: i64,
        quantity: i64,
        total_cents: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE extra_charges
            SET description = ?3, unit_amount_cents = ?4, quantity = ?5, total_cents = ?6
            WHERE bill_id = ?1 AND id = ?2
            "#,
        )
        .bind(bill_id)
        .bind(line_id)
        .bind(description)
        .bind(unit_amount_cents)
        .bind(quantity)
        .bind(total_cents)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ExtraChargeLine", line_id));
        }

        Ok(())
    }

    /// Deletes an extra charge line.
    pub async fn remove_extra_charge(&self, bill_id: &str, line_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM extra_charges WHERE bill_id = ?1 AND id = ?2")
            .bind(bill_id)
            .bind(line_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("ExtraChargeLine", line_id));
        }

        Ok(())
    }

    /// Lists a bill's extra charge lines in entry order.
    pub async fn list_extra_charges(&self, bill_id: &str) -> DbResult<Vec<ExtraChargeLine>> {
        let lines = sqlx::query_as::<_, ExtraChargeLine>(
            r#"
            SELECT id, bill_id, charge_type, description,
                   unit_amount_cents, quantity, total_cents, created_at
            FROM extra_charges
            WHERE bill_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Sums a bill's extra charge line totals.
    pub async fn sum_extra_charges(&self, bill_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM extra_charges WHERE bill_id = ?1",
        )
        .bind(bill_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    // -------------------------------------------------------------------------
    // Payments and money receipts
    // -------------------------------------------------------------------------

    /// Appends a payment to the ledger and, for ADVANCE/FINAL kinds, issues
    /// its money receipt in the same transaction.
    ///
    /// The receipt number comes from the global counter row; incrementing it
    /// inside this transaction is what makes MR numbers gapless per commit.
    /// REFUND entries get no receipt.
    pub async fn insert_payment(&self, payment: &Payment) -> DbResult<Option<MoneyReceipt>> {
        debug!(
            bill_id = %payment.bill_id,
            kind = ?payment.kind,
            amount = payment.amount_cents,
            "Recording payment"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, bill_id, guest_id, kind,
                amount_cents, method, reference, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.bill_id)
        .bind(&payment.guest_id)
        .bind(payment.kind)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(&payment.reference)
        .bind(payment.created_at)
        .execute(&mut *tx)
        .await?;

        let receipt = if payment.kind.counts_toward_paid() {
            let counter: i64 = sqlx::query_scalar(
                r#"
                UPDATE counters SET value = value + 1
                WHERE name = 'money_receipt'
                RETURNING value
                "#,
            )
            .fetch_one(&mut *tx)
            .await?;

            let receipt = MoneyReceipt {
                id: Uuid::new_v4().to_string(),
                mr_no: format!("{MR_PREFIX}-{counter:0width$}", width = SEQUENCE_WIDTH),
                bill_id: payment.bill_id.clone(),
                guest_id: payment.guest_id.clone(),
                amount_cents: payment.amount_cents,
                method: payment.method,
                kind: payment.kind,
                created_at: payment.created_at,
            };

            sqlx::query(
                r#"
                INSERT INTO money_receipts (
                    id, mr_no, bill_id, guest_id,
                    amount_cents, method, kind, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&receipt.id)
            .bind(&receipt.mr_no)
            .bind(&receipt.bill_id)
            .bind(&receipt.guest_id)
            .bind(receipt.amount_cents)
            .bind(receipt.method)
            .bind(receipt.kind)
            .bind(receipt.created_at)
            .execute(&mut *tx)
            .await?;

            Some(receipt)
        } else {
            None
        };

        tx.commit().await?;

        Ok(receipt)
    }

    /// Lists a bill's payments in ledger order.
    pub async fn list_payments(&self, bill_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT id, bill_id, guest_id, kind,
                   amount_cents, method, reference, created_at
            FROM payments
            WHERE bill_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Lists a bill's money receipts.
    pub async fn list_receipts(&self, bill_id: &str) -> DbResult<Vec<MoneyReceipt>> {
        let receipts = sqlx::query_as::<_, MoneyReceipt>(
            r#"
            SELECT id, mr_no, bill_id, guest_id,
                   amount_cents, method, kind, created_at
            FROM money_receipts
            WHERE bill_id = ?1
            ORDER BY mr_no
            "#,
        )
        .bind(bill_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(receipts)
    }

    /// Sums the paid totals for a bill: (advance + final, advance only).
    /// Refund rows are deliberately excluded from both.
    pub async fn sum_payments(&self, bill_id: &str) -> DbResult<(i64, i64)> {
        let sums = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind IN ('advance', 'final') THEN amount_cents END), 0),
                COALESCE(SUM(CASE WHEN kind = 'advance' THEN amount_cents END), 0)
            FROM payments
            WHERE bill_id = ?1
            "#,
        )
        .bind(bill_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sums)
    }
}
