//! Error types for wallet storage.

use facility_wallet_core::WalletError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Key that was looked up.
        id: String,
    },

    /// Lock wait timed out, or a unique key was already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain rule rejected the mutation inside the transaction.
    #[error(transparent)]
    Domain(#[from] WalletError),
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(inner) => inner,
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Database(_) | StoreError::Serialization(_) | StoreError::Conflict(_) => {
                Self::Persistence(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // unique_violation, lock_not_available, serialization_failure
                Some("23505" | "55P03" | "40001") => Self::Conflict(db.message().to_string()),
                _ => Self::Database(err.to_string()),
            },
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Serialization(err.to_string())
            }
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn domain_errors_pass_through() {
        let err = StoreError::from(WalletError::InsufficientBalance {
            balance: dec!(0),
            required: dec!(10),
        });
        assert_eq!(
            WalletError::from(err),
            WalletError::InsufficientBalance {
                balance: dec!(0),
                required: dec!(10),
            }
        );
    }

    #[test]
    fn storage_failures_become_persistence_errors() {
        let err = WalletError::from(StoreError::Conflict("lock timeout".into()));
        assert!(matches!(err, WalletError::Persistence(_)));

        let err = WalletError::from(StoreError::not_found("wallet", "abc"));
        assert_eq!(err, WalletError::not_found("wallet", "abc"));
    }
}
