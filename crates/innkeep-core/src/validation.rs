//! # Validation Module
//!
//! Business-rule validation for operator input.
//!
//! All mutating operations in the billing service validate through these
//! functions before touching the database; the database's own NOT NULL /
//! CHECK constraints are the second line of defense.

use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::MAX_LINE_QUANTITY;

// =============================================================================
// Monetary Validators
// =============================================================================

/// Validates a payment amount in cents.
///
/// ## Rules
/// - Must be positive (> 0); zero and negative payments are rejected.
///   Refunds are positive amounts with kind REFUND, never negative rows.
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a rate or unit amount in cents.
///
/// Zero is allowed (complimentary rooms, waived charges).
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates that a resolved discount does not exceed what the bill can
/// absorb (room charge + extras).
pub fn validate_discount(discount: Money, payable: Money) -> ValidationResult<()> {
    if discount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    if discount > payable {
        return Err(ValidationError::DiscountExceedsPayable {
            discount_cents: discount.cents(),
            payable_cents: payable.cents(),
        });
    }

    Ok(())
}

/// Validates a percent-discount input, in basis points (0% to 100%).
pub fn validate_discount_percent_bps(bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "discount percent".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an extra-charge line quantity.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a grace period in minutes.
///
/// Anything from zero up to one full day is accepted; grace longer than a
/// day would swallow whole billing blocks.
pub fn validate_grace_minutes(minutes: i64) -> ValidationResult<()> {
    if !(0..=1440).contains(&minutes) {
        return Err(ValidationError::OutOfRange {
            field: "grace minutes".to_string(),
            min: 0,
            max: 1440,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: i64) -> ValidationResult<()> {
    if !(0..=10_000).contains(&bps) {
        return Err(ValidationError::OutOfRange {
            field: "tax rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an invoice prefix.
///
/// ## Rules
/// - Optional; when present, 1-10 characters, alphanumeric only (it is
///   embedded into invoice numbers like "HTL-000042").
pub fn validate_invoice_prefix(prefix: &str) -> ValidationResult<()> {
    let prefix = prefix.trim();

    if prefix.is_empty() {
        return Err(ValidationError::Required {
            field: "invoice prefix".to_string(),
        });
    }

    if prefix.len() > 10 {
        return Err(ValidationError::TooLong {
            field: "invoice prefix".to_string(),
            max: 10,
        });
    }

    if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "invoice prefix".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates a UUID string (bill/stay/room references from callers).
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates a description field (extra charge lines).
pub fn validate_description(description: &str) -> ValidationResult<()> {
    let description = description.trim();

    if description.is_empty() {
        return Err(ValidationError::Required {
            field: "description".to_string(),
        });
    }

    if description.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: 200,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(1).is_ok());
        assert!(validate_payment_amount(100_000).is_ok());
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_payment_amount(-500).is_err());
    }

    #[test]
    fn test_validate_discount() {
        let payable = Money::from_cents(250_000);
        assert!(validate_discount(Money::from_cents(0), payable).is_ok());
        assert!(validate_discount(Money::from_cents(250_000), payable).is_ok());
        assert!(validate_discount(Money::from_cents(250_001), payable).is_err());
        assert!(validate_discount(Money::from_cents(-1), payable).is_err());
    }

    #[test]
    fn test_validate_discount_percent_bps() {
        assert!(validate_discount_percent_bps(0).is_ok());
        assert!(validate_discount_percent_bps(10_000).is_ok());
        assert!(validate_discount_percent_bps(10_001).is_err());
        assert!(validate_discount_percent_bps(-1).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_grace_minutes() {
        assert!(validate_grace_minutes(0).is_ok());
        assert!(validate_grace_minutes(30).is_ok());
        assert!(validate_grace_minutes(1440).is_ok());
        assert!(validate_grace_minutes(-1).is_err());
        assert!(validate_grace_minutes(1441).is_err());
    }

    #[test]
    fn test_validate_invoice_prefix() {
        assert!(validate_invoice_prefix("HTL").is_ok());
        assert!(validate_invoice_prefix("FY25").is_ok());
        assert!(validate_invoice_prefix("").is_err());
        assert!(validate_invoice_prefix("HTL-2024-XXX").is_err());
        assert!(validate_invoice_prefix("HT L").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn test_validate_description() {
        assert!(validate_description("Laundry").is_ok());
        assert!(validate_description("  ").is_err());
        assert!(validate_description(&"x".repeat(201)).is_err());
    }
}
