//! # Error Types
//!
//! Domain-specific error types for innkeep-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  innkeep-core errors (this file)                                        │
//! │  └── ValidationError  - Input validation failures (recoverable)         │
//! │                                                                         │
//! │  innkeep-db errors (separate crate)                                     │
//! │  ├── DbError          - Database operation failures                     │
//! │  └── BillingError     - NotFound / Validation / State taxonomy the      │
//! │                         billing service surfaces to callers             │
//! │                                                                         │
//! │  Flow: ValidationError → BillingError → caller-facing message           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, bounds, ids)
//! 3. Errors are enum variants, never String
//! 4. Validation failures are always recoverable by the caller

use thiserror::Error;

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur when operator input doesn't meet requirements, before any
/// business logic runs. They are surfaced verbatim as user-facing messages.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, unparseable clock time).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A discount larger than what the bill can absorb.
    #[error("discount {discount_cents} exceeds payable amount {payable_cents}")]
    DiscountExceedsPayable {
        discount_cents: i64,
        payable_cents: i64,
    },

    /// Check-in attempted with no active financial year configured.
    #[error("no active financial year")]
    NoActiveFinancialYear,

    /// Check-in attempted outside the active financial year's date range.
    /// A hard stop, not a warning: invoices must never be numbered into the
    /// wrong accounting period.
    #[error("date {date} is outside financial year {name}")]
    OutsideFinancialYear { date: String, name: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        };
        assert_eq!(err.to_string(), "payment amount must be positive");

        let err = ValidationError::DiscountExceedsPayable {
            discount_cents: 300_000,
            payable_cents: 250_000,
        };
        assert_eq!(
            err.to_string(),
            "discount 300000 exceeds payable amount 250000"
        );
    }
}
