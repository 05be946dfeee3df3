//! Error types for the ledger engine.

use crate::domain::{AccountId, Currency};

/// Domain-level errors (invariant and precondition violations).
///
/// Business outcomes such as insufficient funds are not errors: they are
/// recorded as failed transactions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    #[error("Currency mismatch: account currency {expected}, operation currency {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Account {0} is not active")]
    AccountNotActive(AccountId),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    /// Optimistic concurrency conflict: another writer committed first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timed out waiting for lock on {0}")]
    LockTimeout(String),

    #[error("Reference id already used: {0}")]
    DuplicateReference(String),

    #[error("Client document already registered: {0}")]
    DuplicateDocument(String),
}

impl RepoError {
    /// Transient failures that a fresh attempt may clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, RepoError::Conflict(_) | RepoError::LockTimeout(_))
    }
}

/// Errors raised while orchestrating a ledger operation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input, rejected before any persistence access.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller misuse: inactive account, currency mismatch, missing transfer
    /// target, bad reversal source.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Attempt timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

impl LedgerError {
    /// Whether the retry policy should make another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Repo(e) => e.is_transient(),
            LedgerError::TimedOut(_) => true,
            _ => false,
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ValidationError(msg) => LedgerError::Validation(msg),
            DomainError::NegativeAmount | DomainError::InvalidCurrency(_) => {
                LedgerError::Validation(err.to_string())
            }
            DomainError::CurrencyMismatch { .. } | DomainError::AccountNotActive(_) => {
                LedgerError::Precondition(err.to_string())
            }
        }
    }
}

/// Application-level errors (caller facing).
///
/// Maps cleanly to 4xx/5xx style outcomes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::ValidationError(msg) => AppError::BadRequest(msg),
            e => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::DuplicateDocument(doc) => {
                AppError::Conflict(format!("Client document already registered: {}", doc))
            }
            RepoError::DuplicateReference(r) => {
                AppError::Conflict(format!("Reference id already used: {}", r))
            }
            RepoError::Database(e) | RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) | RepoError::LockTimeout(e) => AppError::Internal(e),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) | LedgerError::Precondition(msg) => {
                AppError::BadRequest(msg)
            }
            LedgerError::NotFound(msg) => AppError::NotFound(msg),
            LedgerError::Repo(e) => e.into(),
            e @ (LedgerError::Cancelled | LedgerError::TimedOut(_)) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}
