//! Transaction domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::id::uuid_id;
use super::money::Money;
use crate::error::DomainError;

uuid_id!(
    /// Unique identifier for a Transaction.
    TransactionId
);

/// Opaque caller-supplied key/value data carried by a transaction.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Metadata key a reversal uses to point at the transaction it undoes.
pub const ORIGINAL_REFERENCE_KEY: &str = "original_reference_id";

/// Kind of ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Credit,
    Debit,
    Reserve,
    Capture,
    Reversal,
    Transfer,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Credit => "credit",
            Operation::Debit => "debit",
            Operation::Reserve => "reserve",
            Operation::Capture => "capture",
            Operation::Reversal => "reversal",
            Operation::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(Operation::Credit),
            "debit" => Ok(Operation::Debit),
            "reserve" => Ok(Operation::Reserve),
            "capture" => Ok(Operation::Capture),
            "reversal" => Ok(Operation::Reversal),
            "transfer" => Ok(Operation::Transfer),
            other => Err(DomainError::ValidationError(format!(
                "Invalid operation type: '{}'",
                other
            ))),
        }
    }
}

/// Outcome of a mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Invalid transaction status: '{}'",
                other
            ))),
        }
    }
}

/// Balances of an account right after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceSnapshot {
    pub balance: Decimal,
    pub reserved_balance: Decimal,
    pub available_balance: Decimal,
}

/// A recorded ledger operation, successful or not.
///
/// Transactions are immutable once created - they represent
/// a historical record of what happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: TransactionId,
    /// Account the operation was applied to
    pub account_id: AccountId,
    pub operation: Operation,
    /// Amount and currency requested
    pub amount: Money,
    /// Caller-supplied idempotency key, globally unique
    pub reference_id: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub metadata: Metadata,
    pub balance_after: Decimal,
    pub reserved_balance_after: Decimal,
    pub available_balance_after: Decimal,
    /// Reason for a failed outcome
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl Transaction {
    /// Records an operation outcome against the given balances.
    pub fn record(
        account_id: AccountId,
        operation: Operation,
        amount: Money,
        reference_id: String,
        metadata: Metadata,
        snapshot: BalanceSnapshot,
        outcome: Result<(), String>,
    ) -> Self {
        let (status, error_message) = match outcome {
            Ok(()) => (TransactionStatus::Success, None),
            Err(reason) => (TransactionStatus::Failed, Some(reason)),
        };

        Self {
            id: TransactionId::new(),
            account_id,
            operation,
            amount,
            reference_id,
            status,
            metadata,
            balance_after: snapshot.balance,
            reserved_balance_after: snapshot.reserved_balance,
            available_balance_after: snapshot.available_balance,
            error_message,
            processed_at: Utc::now(),
        }
    }

    /// A failed outcome that never reached an account (e.g. the account does
    /// not exist). Balances are reported as zero and nothing is persisted.
    pub fn rejected(
        account_id: AccountId,
        operation: Operation,
        amount: Money,
        reference_id: String,
        reason: impl Into<String>,
    ) -> Self {
        Self::record(
            account_id,
            operation,
            amount,
            reference_id,
            Metadata::new(),
            BalanceSnapshot::default(),
            Err(reason.into()),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Returns the balances captured when the operation was applied.
    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            balance: self.balance_after,
            reserved_balance: self.reserved_balance_after,
            available_balance: self.available_balance_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Currency;
    use rust_decimal_macros::dec;

    #[test]
    fn test_operation_parses_case_insensitively() {
        assert_eq!("Credit".parse::<Operation>().unwrap(), Operation::Credit);
        assert_eq!(" TRANSFER ".parse::<Operation>().unwrap(), Operation::Transfer);
        assert!(matches!(
            "refund".parse::<Operation>(),
            Err(DomainError::ValidationError(_))
        ));
    }

    #[test]
    fn test_failed_record_carries_reason() {
        let amount = Money::new(dec!(10), Currency::BRL).unwrap();
        let tx = Transaction::record(
            AccountId::new(),
            Operation::Debit,
            amount,
            "REF-1".to_string(),
            Metadata::new(),
            BalanceSnapshot {
                balance: dec!(5),
                reserved_balance: dec!(0),
                available_balance: dec!(5),
            },
            Err("insufficient funds".to_string()),
        );

        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.error_message.as_deref(), Some("insufficient funds"));
        assert_eq!(tx.balance_after, dec!(5));
        assert!(!tx.is_success());
    }

    #[test]
    fn test_rejected_has_zero_snapshot() {
        let amount = Money::new(dec!(1), Currency::USD).unwrap();
        let tx = Transaction::rejected(
            AccountId::new(),
            Operation::Credit,
            amount,
            "REF-9".to_string(),
            "account not found",
        );
        assert_eq!(tx.snapshot(), BalanceSnapshot::default());
        assert_eq!(tx.status, TransactionStatus::Failed);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&Operation::Reserve).unwrap(),
            "\"reserve\""
        );
    }
}
