//! # Error Types
//!
//! Domain-specific error types for kasse-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  kasse-core errors (this file)                                         │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  kasse-db errors                                                       │
//! │  ├── DbError          - Store operation failures                       │
//! │  └── LedgerError      - NotFound / InsufficientFunds / Storage         │
//! │                                                                         │
//! │  App errors                                                            │
//! │  ├── PaymentError     - What the terminal shows the patron             │
//! │  └── ApiError         - What back-office clients see (serialized)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Purchase quantity outside `1..=MAX_PURCHASE_QUANTITY`.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// `price × quantity` does not fit the money representation.
    #[error("Amount overflow computing {price} x {quantity}")]
    AmountOverflow { price: i64, quantity: i64 },

    /// A wager move targets an occupied or out-of-range cell.
    #[error("Cell {cell} is not available")]
    CellUnavailable { cell: usize },

    /// A wager move arrives after the game already finished.
    #[error("The game is already over")]
    GameOver,

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before anything reaches the store: staff edits in the back office,
/// quantities on the terminal.
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

    /// Invalid format (e.g., non-numeric PIN, unparsable date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A catalog page already holds its maximum number of products.
    #[error("Page {page} already holds {capacity} products")]
    PageFull { page: i64, capacity: i64 },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Required`].
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::QuantityTooLarge {
            requested: 12,
            max: 10,
        };
        assert_eq!(err.to_string(), "Quantity 12 exceeds maximum allowed (10)");

        let err = ValidationError::PageFull {
            page: 2,
            capacity: 9,
        };
        assert_eq!(err.to_string(), "Page 2 already holds 9 products");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::required("name").into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "Validation error: name is required");
    }
}
