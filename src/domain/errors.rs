use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced by the ledger engine.
///
/// The first four variants are recoverable by the caller; `Storage` means the
/// enclosing transaction rolled back and no partial ledger state was
/// committed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("{entity} not found")]
    NotFound { entity: String },

    #[error("conflict: {reason}")]
    Conflict { reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl LedgerError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }
}
