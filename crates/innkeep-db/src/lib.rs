//! # innkeep-db: Database Layer for Innkeep
//!
//! This crate provides database access for the Innkeep billing engine, plus
//! the two orchestrations that live directly on top of the store: the bill
//! recalculation pipeline and the checkout flow.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Innkeep Data Flow                                │
//! │                                                                         │
//! │  Caller (front desk UI / lifecycle service / daily scheduler)          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     innkeep-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │BillingService │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (billing.rs)  │───►│ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ recalculate   │    │ bills, stays, │    │ 001_init.sql │  │   │
//! │  │   │ check_in/out  │    │ rooms, years, │    │ ...          │  │   │
//! │  │   │ daily sweep   │    │ policies, tax │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                               │   │
//! │  └────────────────────────────────┼───────────────────────────────┘   │
//! │                                   ▼                                    │
//! │                          SQLite Database (WAL)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (bill, stay, room, ...)
//! - [`billing`] - The billing service: recalculation, checkout, sweep
//!
//! ## Usage
//!
//! ```rust,ignore
//! use innkeep_db::{BillingService, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/innkeep.db")).await?;
//! let billing = BillingService::new(db);
//!
//! let outcome = billing.check_in(request).await?;
//! let bill = billing.add_payment(&outcome.bill.id, payment).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod billing;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use billing::{BillingError, BillingResult, BillingService};
pub use error::DbError;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::bill::BillRepository;
pub use repository::financial_year::FinancialYearRepository;
pub use repository::policy::CheckoutPolicyRepository;
pub use repository::room::RoomRepository;
pub use repository::stay::StayRepository;
pub use repository::tax::TaxSlabRepository;
