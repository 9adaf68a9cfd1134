//! # innkeep-core: Pure Billing Logic for Innkeep
//!
//! This crate is the **heart** of the Innkeep billing engine. It contains the
//! stay-rate algorithm and all billing rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Innkeep Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │        External collaborators (front desk UI, reports,          │   │
//! │  │        stay/room lifecycle service, daily scheduler)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 innkeep-db (BillingService)                     │   │
//! │  │   check_in, add_extra_charge, add_payment, set_discount,        │   │
//! │  │   recalculate, check_out, run_daily_sweep                       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ innkeep-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   rate    │  │ validation│  │   │
//! │  │   │ Stay,Bill │  │   Money   │  │  policy   │  │   rules   │  │   │
//! │  │   │ Payment.. │  │  TaxCalc  │  │ resolver  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO WALL CLOCK • PURE FUNCTIONS        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Stay, Bill, Payment, CheckoutPolicy, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`rate`] - The Rate Policy Resolver (elapsed time → room charge)
//! - [`error`] - Validation error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: `now` is always injected - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid
//!    rounding drift across repeated recalculation
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use innkeep_core::money::Money;
//! use innkeep_core::types::TaxRate;
//!
//! // 2500.00 taxable at 5% GST
//! let taxable = Money::from_cents(250_000);
//! let tax = taxable.calculate_tax(TaxRate::from_bps(500));
//! assert_eq!(tax.cents(), 12_500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod rate;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use innkeep_core::Money` instead of
// `use innkeep_core::money::Money`

pub use error::ValidationError;
pub use money::Money;
pub use rate::{expected_checkout, resolve_room_charge};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single extra-charge line
///
/// ## Business Reason
/// Prevents accidental over-entry (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Prefix for money-receipt numbers ("MR-000042").
pub const MR_PREFIX: &str = "MR";

/// Width of the zero-padded counter in invoice and receipt numbers.
pub const SEQUENCE_WIDTH: usize = 6;
