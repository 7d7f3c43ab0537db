//! # Validation Module
//!
//! Input validation for staff edits and patron choices.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Terminal / back-office handlers                              │
//! │  └── THIS MODULE: quantities, drafts, settings values                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger Engine (kasse-db)                                     │
//! │  └── overdraft floor, active flag, validity window                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── UNIQUE token, single cash-sink row                                │
//! │  └── Foreign keys on log rows                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::types::{AccountCategory, AccountDraft, ProductDraft, SettingKey};
use crate::{MAX_PURCHASE_QUANTITY, PAGE_CAPACITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 100;
const MAX_TOKEN_LEN: usize = 64;
const MAX_PIN_LEN: usize = 12;

// =============================================================================
// Patron Choices
// =============================================================================

/// Validates a purchase quantity (`1..=MAX_PURCHASE_QUANTITY`).
///
/// ## Example
/// ```rust
/// use kasse_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(10).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(11).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if !(1..=MAX_PURCHASE_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_PURCHASE_QUANTITY,
        });
    }
    Ok(())
}

// =============================================================================
// Staff Edits
// =============================================================================

/// Validates a display name (non-empty after trimming, bounded length).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::required(field));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }
    Ok(())
}

/// Validates an identity token as typed by staff or read from a reader.
pub fn validate_token(token: &str) -> ValidationResult<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ValidationError::required("token"));
    }
    if token.len() > MAX_TOKEN_LEN {
        return Err(ValidationError::TooLong {
            field: "token".to_string(),
            max: MAX_TOKEN_LEN,
        });
    }
    if token.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "token".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }
    Ok(())
}

/// Validates an account draft before insert or update.
///
/// ## Rules
/// - Name required
/// - Token, when present, well-formed
/// - `valid_from <= valid_until` when both are set
/// - The cash sink is created by bootstrap only
pub fn validate_account_draft(draft: &AccountDraft) -> ValidationResult<()> {
    validate_name("name", &draft.name)?;

    if let Some(token) = &draft.token {
        validate_token(token)?;
    }

    if let (Some(from), Some(until)) = (draft.valid_from, draft.valid_until) {
        if from > until {
            return Err(ValidationError::InvalidFormat {
                field: "valid_until".to_string(),
                reason: format!("{} is before valid_from {}", until, from),
            });
        }
    }

    if draft.category == AccountCategory::CashSink {
        return Err(ValidationError::NotAllowed {
            field: "category".to_string(),
            allowed: vec![
                AccountCategory::Standard.as_str().to_string(),
                AccountCategory::Event.as_str().to_string(),
                AccountCategory::Admin.as_str().to_string(),
            ],
        });
    }

    Ok(())
}

/// Validates a product draft before insert or update.
pub fn validate_product_draft(draft: &ProductDraft) -> ValidationResult<()> {
    validate_name("name", &draft.name)?;

    if draft.price_cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price_cents".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    if draft.min_stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "min_stock".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    if draft.page < 1 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }

    Ok(())
}

/// Rejects placing another product on a page that already holds
/// `PAGE_CAPACITY` active products.
///
/// ## Arguments
/// * `page` - Target page
/// * `occupied` - Active products already on that page, excluding the one being moved
pub fn validate_page_capacity(page: i64, occupied: i64) -> ValidationResult<()> {
    if occupied >= PAGE_CAPACITY {
        return Err(ValidationError::PageFull {
            page,
            capacity: PAGE_CAPACITY,
        });
    }
    Ok(())
}

/// Validates a positive amount (top-ups, restock quantities).
pub fn validate_positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a settings value for its key.
///
/// ## Rules
/// | Key               | Accepted values                     |
/// |-------------------|-------------------------------------|
/// | `overdraft_limit` | non-negative integer                |
/// | `admin_pin`       | 1 to 12 ASCII digits                |
/// | `wager_enabled`   | `"0"` or `"1"`                      |
/// | others            | any string                          |
pub fn validate_setting(key: SettingKey, value: &str) -> ValidationResult<()> {
    match key {
        SettingKey::OverdraftLimit => match value.trim().parse::<i64>() {
            Ok(limit) if limit >= 0 => Ok(()),
            _ => Err(ValidationError::InvalidFormat {
                field: key.as_str().to_string(),
                reason: "must be a non-negative integer".to_string(),
            }),
        },
        SettingKey::AdminPin => {
            if value.is_empty()
                || value.len() > MAX_PIN_LEN
                || !value.chars().all(|c| c.is_ascii_digit())
            {
                return Err(ValidationError::InvalidFormat {
                    field: key.as_str().to_string(),
                    reason: format!("must be 1 to {} digits", MAX_PIN_LEN),
                });
            }
            Ok(())
        }
        SettingKey::WagerEnabled => {
            if value == "0" || value == "1" {
                Ok(())
            } else {
                Err(ValidationError::NotAllowed {
                    field: key.as_str().to_string(),
                    allowed: vec!["0".to_string(), "1".to_string()],
                })
            }
        }
        SettingKey::AutoTopupToken | SettingKey::MessagingToken | SettingKey::MessagingChat => {
            Ok(())
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_PURCHASE_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_PURCHASE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_token_rules() {
        assert!(validate_token("TESTCARD123").is_ok());
        assert!(validate_token("   ").is_err());
        assert!(validate_token("AB CD").is_err());
        assert!(validate_token(&"X".repeat(65)).is_err());
    }

    #[test]
    fn test_account_draft_window_order() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 5, day).unwrap();
        let ok = AccountDraft::standard("Fest")
            .with_category(AccountCategory::Event)
            .with_window(Some(d(1)), Some(d(3)));
        assert!(validate_account_draft(&ok).is_ok());

        let reversed = ok.clone().with_window(Some(d(3)), Some(d(1)));
        assert!(validate_account_draft(&reversed).is_err());
    }

    #[test]
    fn test_cash_sink_cannot_be_created_by_staff() {
        let draft = AccountDraft::standard("Kasse").with_category(AccountCategory::CashSink);
        assert!(matches!(
            validate_account_draft(&draft),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_product_draft_rules() {
        assert!(validate_product_draft(&ProductDraft::new("Wasser", 150)).is_ok());
        assert!(validate_product_draft(&ProductDraft::new("", 150)).is_err());
        assert!(validate_product_draft(&ProductDraft::new("Wasser", -1)).is_err());
        assert!(validate_product_draft(&ProductDraft::new("Wasser", 150).on_page(0)).is_err());
        // Negative opening stock is a recorded deficit, not an error
        assert!(validate_product_draft(&ProductDraft::new("Wasser", 150).with_stock(-3)).is_ok());
    }

    #[test]
    fn test_page_capacity() {
        assert!(validate_page_capacity(1, PAGE_CAPACITY - 1).is_ok());
        assert!(matches!(
            validate_page_capacity(1, PAGE_CAPACITY),
            Err(ValidationError::PageFull { page: 1, .. })
        ));
    }

    #[test]
    fn test_setting_values() {
        assert!(validate_setting(SettingKey::OverdraftLimit, "500").is_ok());
        assert!(validate_setting(SettingKey::OverdraftLimit, "-1").is_err());
        assert!(validate_setting(SettingKey::OverdraftLimit, "abc").is_err());

        assert!(validate_setting(SettingKey::AdminPin, "0000").is_ok());
        assert!(validate_setting(SettingKey::AdminPin, "12a4").is_err());
        assert!(validate_setting(SettingKey::AdminPin, "").is_err());

        assert!(validate_setting(SettingKey::WagerEnabled, "1").is_ok());
        assert!(validate_setting(SettingKey::WagerEnabled, "yes").is_err());

        assert!(validate_setting(SettingKey::AutoTopupToken, "").is_ok());
    }
}
