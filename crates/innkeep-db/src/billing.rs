//! # Billing Service
//!
//! The stateful heart of the engine: every stay mutation funnels through
//! here and ends in one recalculation of the affected bill.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Billing Service                                    │
//! │                                                                         │
//! │  check_in ───────────► room occupy + stay + invoice no + zeroed bill   │
//! │  add_extra_charge ──┐        (one transaction)                          │
//! │  add_payment ───────┤                                                   │
//! │  set_discount ──────┼──► mutate source rows ──► RECALCULATE            │
//! │  check_out ─────────┘                                │                  │
//! │                                                      ▼                  │
//! │   RECALCULATE: read stay/room/policy/extras/payments/tax slab,          │
//! │   resolve the room charge, derive the seven totals + payment            │
//! │   status, write ONE consistent snapshot back to the bill row.           │
//! │                                                                         │
//! │   Per-bill async mutex: mutations to the SAME bill are serialized       │
//! │   (no lost-update interleavings); different bills run in parallel.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::Database;
use crate::repository::bill::BillTotals;
use innkeep_core::{
    expected_checkout, resolve_room_charge, validation, Bill, DiscountKind, ExtraChargeLine,
    FinancialYear, Money, Payment, PaymentKind, PaymentMethod, PaymentStatus, PolicyMode, Stay,
    StayStatus, ValidationError,
};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by the billing service.
///
/// ## Taxonomy
/// - `NotFound` / `Validation`: recoverable, shown to the operator verbatim
/// - `State`: a workflow bug upstream (e.g. checking out a completed stay);
///   logged loudly, never silently absorbed
/// - `Db`: infrastructure failure
#[derive(Debug, Error)]
pub enum BillingError {
    /// A referenced bill, stay, room or financial year does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Operator input failed a business rule.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The operation is not valid for the aggregate's current state.
    #[error("invalid state: {message}")]
    State { message: String },

    /// Underlying database failure.
    #[error(transparent)]
    Db(DbError),
}

impl BillingError {
    fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        BillingError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    fn state(message: impl Into<String>) -> Self {
        BillingError::State {
            message: message.into(),
        }
    }
}

impl From<DbError> for BillingError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => BillingError::NotFound { entity, id },
            other => BillingError::Db(other),
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::from(DbError::from(err))
    }
}

/// Result type for billing operations.
pub type BillingResult<T> = Result<T, BillingError>;

// =============================================================================
// Requests and Outcomes
// =============================================================================

/// Input for checking a guest in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInRequest {
    pub guest_id: String,
    pub room_id: String,

    /// Policy for this stay; falls back to the configured default.
    pub checkout_policy_id: Option<String>,

    /// Overstay tolerance in minutes before a new block is charged.
    pub grace_minutes: i64,

    /// Negotiated rate; when absent the room's rate is snapshotted
    /// (hourly rate under an hourly policy, day rate otherwise).
    pub rate_override_cents: Option<i64>,
}

/// A fresh stay and its (already recalculated) bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckInOutcome {
    pub stay: Stay,
    pub bill: Bill,
}

/// Input for a new extra charge line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExtraCharge {
    pub charge_type: String,
    pub description: String,
    pub unit_amount_cents: i64,
    pub quantity: i64,
}

/// Input for editing an existing extra charge line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraChargeUpdate {
    pub description: String,
    pub unit_amount_cents: i64,
    pub quantity: i64,
}

/// Input for recording a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub kind: PaymentKind,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

/// Input for the checkout orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Settlement captured at the desk, if any.
    pub final_payment_cents: Option<i64>,
    pub method: PaymentMethod,
    pub reference: Option<String>,

    /// When true, any overpayment is returned as a REFUND ledger entry.
    pub auto_refund: bool,
}

/// The result of a completed checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub stay: Stay,
    pub bill: Bill,

    /// Amount refunded by auto-refund, when it fired.
    pub refund_cents: Option<i64>,
}

/// Tally of one daily sweep run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub examined: u64,
    pub recalculated: u64,
    pub failed: u64,
}

// =============================================================================
// Billing Service
// =============================================================================

/// Orchestrates bill mutations, recalculation and checkout.
///
/// Cloning shares the lock table, so every clone serializes against the same
/// per-bill critical sections.
#[derive(Debug, Clone)]
pub struct BillingService {
    db: Database,

    /// One async mutex per bill id. The outer mutex only guards the map;
    /// it is never held across I/O.
    bill_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl BillingService {
    /// Creates a billing service on top of a database handle.
    pub fn new(db: Database) -> Self {
        BillingService {
            db,
            bill_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the underlying database handle (for read-side collaborators).
    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn bill_lock(&self, bill_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.bill_locks.lock().await;
        locks.entry(bill_id.to_string()).or_default().clone()
    }

    // -------------------------------------------------------------------------
    // Check-in and bill creation
    // -------------------------------------------------------------------------

    /// Checks a guest in: occupies the room, snapshots the rate, assigns the
    /// next invoice number and creates the stay's bill — all in one
    /// transaction — then recalculates.
    ///
    /// Refuses outright when no financial year is active or today falls
    /// outside its range: bills must never be numbered into the wrong
    /// accounting period.
    pub async fn check_in(&self, request: CheckInRequest) -> BillingResult<CheckInOutcome> {
        let now = Utc::now();
        let fy = self.active_financial_year(now).await?;

        let guest_id = request.guest_id.trim();
        if guest_id.is_empty() {
            return Err(ValidationError::Required {
                field: "guest id".to_string(),
            }
            .into());
        }
        validation::validate_grace_minutes(request.grace_minutes)?;

        let room = self
            .db
            .rooms()
            .get_by_id(&request.room_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Room", &request.room_id))?;

        let policy = match &request.checkout_policy_id {
            Some(id) => self
                .db
                .checkout_policies()
                .get_by_id(id)
                .await?
                .ok_or_else(|| BillingError::not_found("CheckoutPolicy", id))?,
            None => self
                .db
                .checkout_policies()
                .get_default()
                .await?
                .ok_or(BillingError::Validation(ValidationError::Required {
                    field: "checkout policy".to_string(),
                }))?,
        };

        let rate_applied_cents = match request.rate_override_cents {
            Some(cents) => {
                validation::validate_amount_cents("rate", cents)?;
                cents
            }
            None => match policy.mode() {
                PolicyMode::Hourly if room.hourly_rate_cents > 0 => room.hourly_rate_cents,
                _ => room.day_rate_cents,
            },
        };

        let stay = Stay {
            id: Uuid::new_v4().to_string(),
            guest_id: guest_id.to_string(),
            room_id: room.id.clone(),
            check_in_time: now,
            expected_check_out_time: expected_checkout(now, &policy),
            check_out_time: None,
            checkout_policy_id: policy.id.clone(),
            rate_applied_cents,
            grace_minutes: request.grace_minutes,
            status: StayStatus::Active,
            created_at: now,
        };

        let mut tx = self.db.pool().begin().await?;

        if !self.db.rooms().try_occupy(&mut tx, &room.id).await? {
            return Err(BillingError::state(format!(
                "room {} is occupied",
                room.number
            )));
        }
        self.db.stays().insert(&mut tx, &stay).await?;

        let invoice_no = self
            .db
            .financial_years()
            .next_invoice_number(&mut tx, &fy.id)
            .await?;
        let bill = zeroed_bill(&stay.id, &fy.id, invoice_no, now);
        self.db.bills().insert(&mut tx, &bill).await?;

        tx.commit().await?;

        info!(
            stay_id = %stay.id,
            room = %room.number,
            invoice_no = %bill.invoice_no,
            "Guest checked in"
        );

        let bill = self.recalculate_at(&bill.id, now).await?;
        Ok(CheckInOutcome { stay, bill })
    }

    /// Creates the bill for a stay that was inserted by an external stay
    /// lifecycle service. Zeroed, numbered, then recalculated.
    pub async fn create_bill(&self, stay_id: &str) -> BillingResult<Bill> {
        let now = Utc::now();

        let stay = self
            .db
            .stays()
            .get_by_id(stay_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Stay", stay_id))?;

        if self.db.bills().get_by_stay(&stay.id).await?.is_some() {
            return Err(BillingError::state(format!(
                "stay {stay_id} already has a bill"
            )));
        }

        let fy = self.active_financial_year(now).await?;

        let mut tx = self.db.pool().begin().await?;
        let invoice_no = self
            .db
            .financial_years()
            .next_invoice_number(&mut tx, &fy.id)
            .await?;
        let bill = zeroed_bill(&stay.id, &fy.id, invoice_no, now);
        self.db.bills().insert(&mut tx, &bill).await?;
        tx.commit().await?;

        info!(stay_id = %stay.id, invoice_no = %bill.invoice_no, "Bill created");

        self.recalculate_at(&bill.id, now).await
    }

    // -------------------------------------------------------------------------
    // Recalculation pipeline
    // -------------------------------------------------------------------------

    /// Recalculates a bill from its source facts at the current instant.
    pub async fn recalculate(&self, bill_id: &str) -> BillingResult<Bill> {
        self.recalculate_at(bill_id, Utc::now()).await
    }

    /// Recalculates a bill with an injected `now` (testability, and the
    /// checkout orchestrator passes the instant the stay closes at).
    pub async fn recalculate_at(&self, bill_id: &str, now: DateTime<Utc>) -> BillingResult<Bill> {
        let lock = self.bill_lock(bill_id).await;
        let _guard = lock.lock().await;
        self.recalculate_locked(bill_id, now).await
    }

    /// The pipeline body. Callers hold the bill's lock.
    ///
    /// Reads current source-of-truth rows (never cached state), derives the
    /// full monetary snapshot, and writes it back in one statement. When the
    /// derived snapshot equals the stored one the write is skipped, so a
    /// repeated run is byte-identical down to `updated_at`.
    async fn recalculate_locked(
        &self,
        bill_id: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<Bill> {
        let bills = self.db.bills();

        let bill = bills
            .get_by_id(bill_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Bill", bill_id))?;
        let stay = self
            .db
            .stays()
            .get_by_id(&bill.stay_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Stay", &bill.stay_id))?;
        let room = self
            .db
            .rooms()
            .get_by_id(&stay.room_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Room", &stay.room_id))?;
        // A deleted policy row degrades to base-rate billing, it does not
        // fail the pipeline.
        let policy = self
            .db
            .checkout_policies()
            .get_by_id(&stay.checkout_policy_id)
            .await?;

        let room_charge = resolve_room_charge(&stay, &room, policy.as_ref(), now);
        let extra_total = Money::from_cents(bills.sum_extra_charges(bill_id).await?);
        let discount = Money::from_cents(bill.discount_cents);
        let taxable = room_charge + extra_total - discount;

        // Freeze fallback: with no active slab, the previous tax stands
        // rather than dropping to zero.
        let tax = match self.db.tax_slabs().get_active().await? {
            Some(slab) => taxable.calculate_tax(slab.rate()),
            None => Money::from_cents(bill.tax_cents),
        };

        let final_amount = taxable + tax;
        let (paid_cents, advance_cents) = bills.sum_payments(bill_id).await?;
        let paid = Money::from_cents(paid_cents);
        let balance = final_amount - paid;

        let payment_status = if paid >= final_amount {
            PaymentStatus::Paid
        } else if paid.is_positive() {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Unpaid
        };

        let totals = BillTotals {
            room_charge_cents: room_charge.cents(),
            extra_charge_cents: extra_total.cents(),
            tax_cents: tax.cents(),
            final_amount_cents: final_amount.cents(),
            advance_paid_cents: advance_cents,
            total_paid_cents: paid.cents(),
            balance_cents: balance.cents(),
            payment_status,
        };

        if totals.matches(&bill) {
            debug!(bill_id = %bill_id, "Recalculation produced no changes");
            return Ok(bill);
        }

        bills.write_totals(bill_id, &totals, now).await?;

        debug!(
            bill_id = %bill_id,
            room_charge = totals.room_charge_cents,
            final_amount = totals.final_amount_cents,
            balance = totals.balance_cents,
            status = ?totals.payment_status,
            "Bill recalculated"
        );

        bills
            .get_by_id(bill_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Bill", bill_id))
    }

    // -------------------------------------------------------------------------
    // Extra charges
    // -------------------------------------------------------------------------

    /// Adds an extra charge line and returns the recalculated bill.
    pub async fn add_extra_charge(
        &self,
        bill_id: &str,
        input: NewExtraCharge,
    ) -> BillingResult<Bill> {
        validation::validate_description(&input.description)?;
        validation::validate_amount_cents("unit amount", input.unit_amount_cents)?;
        validation::validate_quantity(input.quantity)?;

        let lock = self.bill_lock(bill_id).await;
        let _guard = lock.lock().await;

        let (bill, _stay) = self.open_bill(bill_id).await?;
        let now = Utc::now();

        let line = ExtraChargeLine {
            id: Uuid::new_v4().to_string(),
            bill_id: bill.id.clone(),
            charge_type: input.charge_type,
            description: input.description.trim().to_string(),
            unit_amount_cents: input.unit_amount_cents,
            quantity: input.quantity,
            total_cents: input.unit_amount_cents * input.quantity,
            created_at: now,
        };
        self.db.bills().add_extra_charge(&line).await?;

        info!(
            bill_id = %bill.id,
            charge_type = %line.charge_type,
            total = line.total_cents,
            "Extra charge added"
        );

        self.recalculate_locked(bill_id, now).await
    }

    /// Edits an extra charge line and returns the recalculated bill.
    pub async fn update_extra_charge(
        &self,
        bill_id: &str,
        line_id: &str,
        input: ExtraChargeUpdate,
    ) -> BillingResult<Bill> {
        validation::validate_description(&input.description)?;
        validation::validate_amount_cents("unit amount", input.unit_amount_cents)?;
        validation::validate_quantity(input.quantity)?;

        let lock = self.bill_lock(bill_id).await;
        let _guard = lock.lock().await;

        self.open_bill(bill_id).await?;
        let now = Utc::now();

        self.db
            .bills()
            .update_extra_charge(
                bill_id,
                line_id,
                input.description.trim(),
                input.unit_amount_cents,
                input.quantity,
                input.unit_amount_cents * input.quantity,
            )
            .await?;

        self.recalculate_locked(bill_id, now).await
    }

    /// Deletes an extra charge line and returns the recalculated bill.
    pub async fn remove_extra_charge(
        &self,
        bill_id: &str,
        line_id: &str,
    ) -> BillingResult<Bill> {
        let lock = self.bill_lock(bill_id).await;
        let _guard = lock.lock().await;

        self.open_bill(bill_id).await?;
        let now = Utc::now();

        self.db.bills().remove_extra_charge(bill_id, line_id).await?;

        self.recalculate_locked(bill_id, now).await
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    /// Appends a payment to the bill's ledger (issuing a money receipt for
    /// ADVANCE/FINAL kinds) and returns the recalculated bill.
    ///
    /// ADVANCE and FINAL payments require an open stay; REFUND entries are
    /// also accepted after completion, since corrections are expressed as
    /// refunds rather than edits.
    pub async fn add_payment(
        &self,
        bill_id: &str,
        request: PaymentRequest,
    ) -> BillingResult<Bill> {
        validation::validate_payment_amount(request.amount_cents)?;

        let lock = self.bill_lock(bill_id).await;
        let _guard = lock.lock().await;

        let (bill, stay) = self.bill_with_stay(bill_id).await?;
        if request.kind.counts_toward_paid() && stay.status != StayStatus::Active {
            return Err(BillingError::state(format!(
                "stay {} is completed; only refunds may be recorded",
                stay.id
            )));
        }

        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4().to_string(),
            bill_id: bill.id.clone(),
            guest_id: stay.guest_id.clone(),
            kind: request.kind,
            amount_cents: request.amount_cents,
            method: request.method,
            reference: request.reference,
            created_at: now,
        };

        let receipt = self.db.bills().insert_payment(&payment).await?;
        if let Some(receipt) = &receipt {
            info!(
                bill_id = %bill.id,
                mr_no = %receipt.mr_no,
                amount = receipt.amount_cents,
                kind = ?receipt.kind,
                "Payment recorded, money receipt issued"
            );
        } else {
            info!(
                bill_id = %bill.id,
                amount = payment.amount_cents,
                "Refund recorded"
            );
        }

        self.recalculate_locked(bill_id, now).await
    }

    // -------------------------------------------------------------------------
    // Discount
    // -------------------------------------------------------------------------

    /// Sets the bill's discount and returns the recalculated bill.
    ///
    /// `value` is cents for FLAT, basis points for PERCENT (1000 = 10%).
    /// A percent discount is resolved against (room charge + extras) as of
    /// this call and stored as a currency amount — a later charge change
    /// does NOT retroactively rescale it. Point-in-time by design.
    pub async fn set_discount(
        &self,
        bill_id: &str,
        value: i64,
        kind: DiscountKind,
    ) -> BillingResult<Bill> {
        let lock = self.bill_lock(bill_id).await;
        let _guard = lock.lock().await;

        self.open_bill(bill_id).await?;
        let now = Utc::now();

        // Refresh totals first so the percent base is the room charge as of
        // this call, not of the last mutation.
        let bill = self.recalculate_locked(bill_id, now).await?;
        let payable = bill.payable_before_tax();

        let discount = match kind {
            DiscountKind::Flat => {
                validation::validate_amount_cents("discount", value)?;
                Money::from_cents(value)
            }
            DiscountKind::Percent => {
                validation::validate_discount_percent_bps(value)?;
                payable.percent_of(value as u32)
            }
        };
        validation::validate_discount(discount, payable)?;

        self.db.bills().set_discount(bill_id, discount.cents()).await?;

        info!(
            bill_id = %bill_id,
            discount = discount.cents(),
            kind = ?kind,
            "Discount applied"
        );

        self.recalculate_locked(bill_id, now).await
    }

    // -------------------------------------------------------------------------
    // Checkout orchestration
    // -------------------------------------------------------------------------

    /// Checks a stay out.
    ///
    /// ## Sequence
    /// 1. Capture the final payment (with its money receipt), if supplied
    /// 2. Recalculate at the closing instant
    /// 3. If auto-refund is on and the bill is overpaid, append a REFUND
    ///    entry and recalculate again
    /// 4. Complete the stay and release the room — last, and unconditional
    ///    once 1-3 succeeded
    ///
    /// Calling this on a completed stay is a caller error and fails fast;
    /// the ACTIVE → COMPLETED transition is terminal.
    pub async fn check_out(
        &self,
        stay_id: &str,
        request: CheckoutRequest,
    ) -> BillingResult<CheckoutOutcome> {
        let stay = self
            .db
            .stays()
            .get_by_id(stay_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Stay", stay_id))?;

        if stay.status == StayStatus::Completed {
            return Err(BillingError::state(format!(
                "stay {stay_id} is already completed"
            )));
        }

        let bill = self
            .db
            .bills()
            .get_by_stay(stay_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Bill for stay", stay_id))?;

        let lock = self.bill_lock(&bill.id).await;
        let _guard = lock.lock().await;

        // One instant for the whole orchestration: the recalculated room
        // charge and the recorded check_out_time always agree.
        let now = Utc::now();

        if let Some(amount) = request.final_payment_cents {
            validation::validate_payment_amount(amount)?;

            let payment = Payment {
                id: Uuid::new_v4().to_string(),
                bill_id: bill.id.clone(),
                guest_id: stay.guest_id.clone(),
                kind: PaymentKind::Final,
                amount_cents: amount,
                method: request.method,
                reference: request.reference.clone(),
                created_at: now,
            };
            let receipt = self.db.bills().insert_payment(&payment).await?;
            if let Some(receipt) = &receipt {
                info!(
                    bill_id = %bill.id,
                    mr_no = %receipt.mr_no,
                    amount = amount,
                    "Final payment captured"
                );
            }
        }

        let mut bill = self.recalculate_locked(&bill.id, now).await?;

        let mut refund_cents = None;
        if request.auto_refund && bill.total_paid_cents > bill.final_amount_cents {
            let overage = bill.total_paid_cents - bill.final_amount_cents;

            let refund = Payment {
                id: Uuid::new_v4().to_string(),
                bill_id: bill.id.clone(),
                guest_id: stay.guest_id.clone(),
                kind: PaymentKind::Refund,
                amount_cents: overage,
                method: request.method,
                reference: None,
                created_at: now,
            };
            self.db.bills().insert_payment(&refund).await?;

            info!(bill_id = %bill.id, refund = overage, "Overpayment refunded");

            refund_cents = Some(overage);
            bill = self.recalculate_locked(&bill.id, now).await?;
        }

        let completed = self.db.stays().complete(stay_id, &stay.room_id, now).await?;
        if !completed {
            // The status flipped between our read and the guarded update.
            return Err(BillingError::state(format!(
                "stay {stay_id} is already completed"
            )));
        }

        let stay = self
            .db
            .stays()
            .get_by_id(stay_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Stay", stay_id))?;

        info!(
            stay_id = %stay.id,
            invoice_no = %bill.invoice_no,
            final_amount = bill.final_amount_cents,
            "Checkout complete"
        );

        Ok(CheckoutOutcome {
            stay,
            bill,
            refund_cents,
        })
    }

    // -------------------------------------------------------------------------
    // Daily sweep
    // -------------------------------------------------------------------------

    /// Recalculates every bill attached to an ACTIVE stay, sequentially.
    ///
    /// One failing bill is logged and counted, never allowed to abort the
    /// batch — the scheduler re-runs tomorrow regardless.
    pub async fn run_daily_sweep(&self) -> SweepSummary {
        let bills = match self.db.bills().list_for_active_stays().await {
            Ok(bills) => bills,
            Err(err) => {
                error!(error = %err, "Sweep could not list active bills");
                return SweepSummary::default();
            }
        };

        let mut summary = SweepSummary {
            examined: bills.len() as u64,
            ..SweepSummary::default()
        };

        for bill in bills {
            match self.recalculate(&bill.id).await {
                Ok(_) => summary.recalculated += 1,
                Err(err) => {
                    error!(
                        bill_id = %bill.id,
                        invoice_no = %bill.invoice_no,
                        error = %err,
                        "Sweep recalculation failed"
                    );
                    summary.failed += 1;
                }
            }
        }

        info!(
            examined = summary.examined,
            recalculated = summary.recalculated,
            failed = summary.failed,
            "Daily sweep finished"
        );

        summary
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn active_financial_year(&self, now: DateTime<Utc>) -> BillingResult<FinancialYear> {
        let fy = self
            .db
            .financial_years()
            .get_active()
            .await?
            .ok_or(BillingError::Validation(
                ValidationError::NoActiveFinancialYear,
            ))?;

        let today = now.date_naive();
        if !fy.contains(today) {
            return Err(BillingError::Validation(
                ValidationError::OutsideFinancialYear {
                    date: today.to_string(),
                    name: fy.name.clone(),
                },
            ));
        }

        Ok(fy)
    }

    /// Loads a bill with its stay.
    async fn bill_with_stay(&self, bill_id: &str) -> BillingResult<(Bill, Stay)> {
        let bill = self
            .db
            .bills()
            .get_by_id(bill_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Bill", bill_id))?;
        let stay = self
            .db
            .stays()
            .get_by_id(&bill.stay_id)
            .await?
            .ok_or_else(|| BillingError::not_found("Stay", &bill.stay_id))?;

        Ok((bill, stay))
    }

    /// Loads a bill with its stay, requiring the stay to still be open.
    async fn open_bill(&self, bill_id: &str) -> BillingResult<(Bill, Stay)> {
        let (bill, stay) = self.bill_with_stay(bill_id).await?;
        if stay.status != StayStatus::Active {
            return Err(BillingError::state(format!(
                "stay {} is completed; bill {} is closed",
                stay.id, bill.id
            )));
        }

        Ok((bill, stay))
    }
}

/// A freshly numbered bill with all derived fields zeroed; the pipeline
/// fills them in immediately after the creating transaction commits.
fn zeroed_bill(stay_id: &str, fy_id: &str, invoice_no: String, now: DateTime<Utc>) -> Bill {
    Bill {
        id: Uuid::new_v4().to_string(),
        stay_id: stay_id.to_string(),
        financial_year_id: fy_id.to_string(),
        invoice_no,
        room_charge_cents: 0,
        extra_charge_cents: 0,
        discount_cents: 0,
        tax_cents: 0,
        final_amount_cents: 0,
        advance_paid_cents: 0,
        total_paid_cents: 0,
        balance_cents: 0,
        payment_status: PaymentStatus::Unpaid,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::financial_year::NewFinancialYear;
    use chrono::Duration;
    use innkeep_core::{CheckoutPolicy, RoomStatus};

    async fn service() -> BillingService {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        BillingService::new(db)
    }

    /// Creates and activates a financial year spanning today.
    async fn active_fy(svc: &BillingService, prefix: Option<&str>) -> FinancialYear {
        let today = Utc::now().date_naive();
        let fy = svc
            .database()
            .financial_years()
            .create(&NewFinancialYear {
                name: "2024-2025".to_string(),
                start_date: today - Duration::days(180),
                end_date: today + Duration::days(185),
                invoice_prefix: prefix.map(str::to_string),
            })
            .await
            .unwrap();
        svc.database().financial_years().set_active(&fy.id).await.unwrap();
        fy
    }

    async fn policy_24h(svc: &BillingService) -> CheckoutPolicy {
        svc.database()
            .checkout_policies()
            .create("24 Hours", Some(24), None)
            .await
            .unwrap()
    }

    async fn activate_gst(svc: &BillingService, bps: i64) {
        let slab = svc
            .database()
            .tax_slabs()
            .create("GST", bps)
            .await
            .unwrap();
        svc.database().tax_slabs().set_active(&slab.id).await.unwrap();
    }

    fn check_in_request(room_id: &str, policy_id: &str) -> CheckInRequest {
        CheckInRequest {
            guest_id: "guest-1".to_string(),
            room_id: room_id.to_string(),
            checkout_policy_id: Some(policy_id.to_string()),
            grace_minutes: 0,
            rate_override_cents: None,
        }
    }

    /// The conservation invariant holds after every mutation.
    fn assert_conserved(bill: &Bill) {
        assert_eq!(
            bill.final_amount_cents,
            bill.room_charge_cents + bill.extra_charge_cents - bill.discount_cents
                + bill.tax_cents
        );
        assert_eq!(bill.balance_cents, bill.final_amount_cents - bill.total_paid_cents);
    }

    /// Full walk through one stay: check-in at 2000/24h, dinner for 500,
    /// 5% GST, 1000 advance, checkout settling the rest.
    #[tokio::test]
    async fn end_to_end_scenario() {
        let svc = service().await;
        active_fy(&svc, Some("HTL")).await;
        activate_gst(&svc, 500).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;

        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();
        assert_eq!(outcome.bill.invoice_no, "HTL-000001");
        assert_eq!(outcome.bill.room_charge_cents, 200_000);
        assert_eq!(outcome.stay.rate_applied_cents, 200_000);
        assert_conserved(&outcome.bill);
        assert_eq!(
            svc.database().rooms().get_by_id(&room.id).await.unwrap().unwrap().status,
            RoomStatus::Occupied
        );

        let bill = svc
            .add_extra_charge(
                &outcome.bill.id,
                NewExtraCharge {
                    charge_type: "restaurant".to_string(),
                    description: "Dinner".to_string(),
                    unit_amount_cents: 50_000,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.extra_charge_cents, 50_000);
        assert_eq!(bill.tax_cents, 12_500);
        assert_eq!(bill.final_amount_cents, 262_500);
        assert_eq!(bill.payment_status, PaymentStatus::Unpaid);
        assert_conserved(&bill);

        let bill = svc
            .add_payment(
                &bill.id,
                PaymentRequest {
                    kind: PaymentKind::Advance,
                    amount_cents: 100_000,
                    method: PaymentMethod::Cash,
                    reference: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.balance_cents, 162_500);
        assert_eq!(bill.advance_paid_cents, 100_000);
        assert_eq!(bill.payment_status, PaymentStatus::Partial);
        assert_conserved(&bill);

        let outcome = svc
            .check_out(
                &outcome.stay.id,
                CheckoutRequest {
                    final_payment_cents: Some(162_500),
                    method: PaymentMethod::Card,
                    reference: None,
                    auto_refund: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(outcome.bill.total_paid_cents, 262_500);
        assert_eq!(outcome.bill.balance_cents, 0);
        assert_eq!(outcome.bill.payment_status, PaymentStatus::Paid);
        assert_eq!(outcome.refund_cents, None);
        assert_eq!(outcome.stay.status, StayStatus::Completed);
        assert!(outcome.stay.check_out_time.is_some());
        assert_conserved(&outcome.bill);
        assert_eq!(
            svc.database().rooms().get_by_id(&room.id).await.unwrap().unwrap().status,
            RoomStatus::Available
        );

        // One money receipt per ADVANCE/FINAL payment, numbered in sequence.
        let receipts = svc.database().bills().list_receipts(&outcome.bill.id).await.unwrap();
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].mr_no, "MR-000001");
        assert_eq!(receipts[1].mr_no, "MR-000002");
    }

    #[tokio::test]
    async fn recalculation_is_idempotent() {
        let svc = service().await;
        active_fy(&svc, None).await;
        activate_gst(&svc, 500).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        let bill = svc
            .add_payment(
                &outcome.bill.id,
                PaymentRequest {
                    kind: PaymentKind::Advance,
                    amount_cents: 50_000,
                    method: PaymentMethod::Upi,
                    reference: Some("upi-123".to_string()),
                },
            )
            .await
            .unwrap();

        let now = Utc::now();
        let first = svc.recalculate_at(&bill.id, now).await.unwrap();
        let second = svc.recalculate_at(&bill.id, now).await.unwrap();

        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn percent_discount_is_resolved_once() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        // 10% of the current payable (200000) = 20000, stored flat.
        let bill = svc
            .set_discount(&outcome.bill.id, 1000, DiscountKind::Percent)
            .await
            .unwrap();
        assert_eq!(bill.discount_cents, 20_000);
        assert_conserved(&bill);

        // A later charge does NOT rescale the stored discount.
        let bill = svc
            .add_extra_charge(
                &bill.id,
                NewExtraCharge {
                    charge_type: "laundry".to_string(),
                    description: "Laundry".to_string(),
                    unit_amount_cents: 50_000,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.discount_cents, 20_000);
        assert_conserved(&bill);
    }

    #[tokio::test]
    async fn discount_cannot_exceed_payable() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        let err = svc
            .set_discount(&outcome.bill.id, 300_000, DiscountKind::Flat)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::DiscountExceedsPayable { .. })
        ));
    }

    #[tokio::test]
    async fn tax_freezes_when_no_slab_is_active() {
        let svc = service().await;
        active_fy(&svc, None).await;
        activate_gst(&svc, 500).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();
        assert_eq!(outcome.bill.tax_cents, 10_000);

        svc.database().tax_slabs().deactivate_all().await.unwrap();

        // New charges recalculate everything else; tax stays at its last
        // computed value instead of dropping to zero.
        let bill = svc
            .add_extra_charge(
                &outcome.bill.id,
                NewExtraCharge {
                    charge_type: "minibar".to_string(),
                    description: "Minibar".to_string(),
                    unit_amount_cents: 50_000,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.extra_charge_cents, 50_000);
        assert_eq!(bill.tax_cents, 10_000);
        assert_conserved(&bill);
    }

    #[tokio::test]
    async fn refund_is_excluded_from_paid_totals() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        // Overpay up front: 3000 against a 2000 bill.
        svc.add_payment(
            &outcome.bill.id,
            PaymentRequest {
                kind: PaymentKind::Advance,
                amount_cents: 300_000,
                method: PaymentMethod::Cash,
                reference: None,
            },
        )
        .await
        .unwrap();

        let checked_out = svc
            .check_out(
                &outcome.stay.id,
                CheckoutRequest {
                    final_payment_cents: None,
                    method: PaymentMethod::Cash,
                    reference: None,
                    auto_refund: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(checked_out.refund_cents, Some(100_000));

        // The refund is in the ledger but not in total_paid, so the bill
        // still reads overpaid. Observed source behavior, kept deliberately.
        let bill = checked_out.bill;
        assert_eq!(bill.total_paid_cents, 300_000);
        assert_eq!(bill.balance_cents, -100_000);
        assert_eq!(bill.payment_status, PaymentStatus::Paid);

        let payments = svc.database().bills().list_payments(&bill.id).await.unwrap();
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().any(|p| p.kind == PaymentKind::Refund));

        // No money receipt for the refund.
        let receipts = svc.database().bills().list_receipts(&bill.id).await.unwrap();
        assert_eq!(receipts.len(), 1);
    }

    #[tokio::test]
    async fn checkout_twice_fails_fast() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        let request = CheckoutRequest {
            final_payment_cents: Some(200_000),
            method: PaymentMethod::Cash,
            reference: None,
            auto_refund: false,
        };
        svc.check_out(&outcome.stay.id, request.clone()).await.unwrap();

        let err = svc.check_out(&outcome.stay.id, request).await.unwrap_err();
        assert!(matches!(err, BillingError::State { .. }));
    }

    #[tokio::test]
    async fn completed_stay_accepts_only_refunds() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        svc.check_out(
            &outcome.stay.id,
            CheckoutRequest {
                final_payment_cents: Some(200_000),
                method: PaymentMethod::Cash,
                reference: None,
                auto_refund: false,
            },
        )
        .await
        .unwrap();

        let err = svc
            .add_payment(
                &outcome.bill.id,
                PaymentRequest {
                    kind: PaymentKind::Advance,
                    amount_cents: 10_000,
                    method: PaymentMethod::Cash,
                    reference: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::State { .. }));

        // A correction refund is still recordable.
        let bill = svc
            .add_payment(
                &outcome.bill.id,
                PaymentRequest {
                    kind: PaymentKind::Refund,
                    amount_cents: 10_000,
                    method: PaymentMethod::Cash,
                    reference: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.total_paid_cents, 200_000);
    }

    #[tokio::test]
    async fn check_in_requires_active_financial_year() {
        let svc = service().await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;

        let err = svc
            .check_in(check_in_request(&room.id, &policy.id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::NoActiveFinancialYear)
        ));
    }

    #[tokio::test]
    async fn check_in_rejects_out_of_range_financial_year() {
        let svc = service().await;

        // Active year that ended well before today: hard stop.
        let today = Utc::now().date_naive();
        let fy = svc
            .database()
            .financial_years()
            .create(&NewFinancialYear {
                name: "2020-2021".to_string(),
                start_date: today - Duration::days(900),
                end_date: today - Duration::days(535),
                invoice_prefix: None,
            })
            .await
            .unwrap();
        svc.database().financial_years().set_active(&fy.id).await.unwrap();

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;

        let err = svc
            .check_in(check_in_request(&room.id, &policy.id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::Validation(ValidationError::OutsideFinancialYear { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_check_ins_get_distinct_invoice_numbers() {
        let svc = service().await;
        active_fy(&svc, Some("HTL")).await;
        let policy = policy_24h(&svc).await;

        let mut rooms = Vec::new();
        for i in 0..6 {
            rooms.push(
                svc.database()
                    .rooms()
                    .create(&format!("10{i}"), 200_000, 0)
                    .await
                    .unwrap(),
            );
        }

        let mut handles = Vec::new();
        for room in rooms {
            let svc = svc.clone();
            let policy_id = policy.id.clone();
            handles.push(tokio::spawn(async move {
                svc.check_in(check_in_request(&room.id, &policy_id))
                    .await
                    .unwrap()
                    .bill
                    .invoice_no
            }));
        }

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort();

        // Distinct AND contiguous: no duplicates, no gaps.
        let expected: Vec<String> = (1..=6).map(|n| format!("HTL-{n:06}")).collect();
        assert_eq!(numbers, expected);
    }

    #[tokio::test]
    async fn extra_charge_edits_recalculate() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        let bill = svc
            .add_extra_charge(
                &outcome.bill.id,
                NewExtraCharge {
                    charge_type: "laundry".to_string(),
                    description: "Laundry".to_string(),
                    unit_amount_cents: 50_000,
                    quantity: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.extra_charge_cents, 100_000);

        let line_id = svc
            .database()
            .bills()
            .list_extra_charges(&bill.id)
            .await
            .unwrap()[0]
            .id
            .clone();

        let bill = svc
            .update_extra_charge(
                &bill.id,
                &line_id,
                ExtraChargeUpdate {
                    description: "Laundry".to_string(),
                    unit_amount_cents: 50_000,
                    quantity: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(bill.extra_charge_cents, 50_000);
        assert_conserved(&bill);

        let bill = svc.remove_extra_charge(&bill.id, &line_id).await.unwrap();
        assert_eq!(bill.extra_charge_cents, 0);
        assert_conserved(&bill);
    }

    #[tokio::test]
    async fn create_bill_is_one_to_one_with_stay() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let room = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let policy = policy_24h(&svc).await;
        let outcome = svc.check_in(check_in_request(&room.id, &policy.id)).await.unwrap();

        let err = svc.create_bill(&outcome.stay.id).await.unwrap_err();
        assert!(matches!(err, BillingError::State { .. }));

        let err = svc.create_bill("missing-stay").await.unwrap_err();
        assert!(matches!(err, BillingError::NotFound { .. }));
    }

    #[tokio::test]
    async fn daily_sweep_covers_active_stays() {
        let svc = service().await;
        active_fy(&svc, None).await;

        let policy = policy_24h(&svc).await;
        let room_a = svc.database().rooms().create("101", 200_000, 0).await.unwrap();
        let room_b = svc.database().rooms().create("102", 180_000, 0).await.unwrap();
        let room_c = svc.database().rooms().create("103", 150_000, 0).await.unwrap();

        svc.check_in(check_in_request(&room_a.id, &policy.id)).await.unwrap();
        svc.check_in(check_in_request(&room_b.id, &policy.id)).await.unwrap();
        let done = svc.check_in(check_in_request(&room_c.id, &policy.id)).await.unwrap();
        svc.check_out(
            &done.stay.id,
            CheckoutRequest {
                final_payment_cents: Some(150_000),
                method: PaymentMethod::Cash,
                reference: None,
                auto_refund: false,
            },
        )
        .await
        .unwrap();

        let summary = svc.run_daily_sweep().await;
        assert_eq!(summary.examined, 2);
        assert_eq!(summary.recalculated, 2);
        assert_eq!(summary.failed, 0);
    }
}
