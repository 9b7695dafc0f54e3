// error.rs
use thiserror::Error;

/// One variant per error kind in the error taxonomy: validation, lookup,
/// balance, security, risk, idempotency, state-machine, chain-integrity,
/// external-collaborator and catch-all internal failures. Callers match on
/// the variant rather than on a formatted message.
#[derive(Debug, Error)]
pub enum KydError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient balance for wallet {wallet_id}: needed {needed}, available {available}")]
    InsufficientBalance {
        wallet_id: String,
        needed: String,
        available: String,
    },

    #[error("security restricted: {0}")]
    SecurityRestricted(String),

    #[error("risk blocked: {0}")]
    RiskBlocked(String),

    #[error("transaction already exists: {reference}")]
    TransactionAlreadyExists { reference: String },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, KydError>;

impl KydError {
    /// Maps a unique-constraint violation on `transactions.reference` to
    /// `TransactionAlreadyExists`; any other database error passes through
    /// unchanged. Callers use this at the one call site (TransactionStore::create)
    /// where that constraint can fire.
    pub fn from_create_transaction_db_error(err: sqlx::Error, reference: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.constraint() == Some("transactions_reference_key")
                || db_err.code().as_deref() == Some("23505")
            {
                return KydError::TransactionAlreadyExists {
                    reference: reference.to_string(),
                };
            }
        }
        KydError::Database(err)
    }
}
