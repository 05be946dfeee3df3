//! Data Transfer Objects (DTOs) for requests and responses.
//!
//! Monetary amounts cross this boundary as integer minor units (cents) and
//! are converted to decimal major units here, never inside the core.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, AccountId, AccountStatus, ClientId, Currency, Metadata, Money, Operation,
    Transaction, TransactionId, TransactionStatus,
};
use crate::error::DomainError;

/// Longest accepted reference id.
pub const MAX_REFERENCE_LEN: usize = 100;

/// Message attached to failed responses produced for unexpected errors.
pub const PROCESSING_ERROR: &str = "internal error processing transaction";

/// Message attached to failed batch items rejected before processing.
pub const BATCH_ITEM_ERROR: &str = "processing error";

/// Converts a decimal major-unit amount to minor units, truncating extra
/// precision toward zero.
pub fn to_minor(amount: Decimal, currency: Currency) -> i64 {
    let scaled = (amount * Decimal::from(10_i64.pow(currency.decimal_places()))).trunc();
    scaled.to_i64().unwrap_or(if scaled.is_sign_negative() {
        i64::MIN
    } else {
        i64::MAX
    })
}

fn parse_id<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, DomainError> {
    value.trim().parse().map_err(|_| {
        DomainError::ValidationError(format!("{} must be a valid UUID: '{}'", field, value))
    })
}

fn parse_currency(code: &str) -> Result<Currency, DomainError> {
    let currency = Currency::new(code)?;
    if !currency.is_supported() {
        return Err(DomainError::InvalidCurrency(format!(
            "'{}' is not supported",
            currency
        )));
    }
    Ok(currency)
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to apply one ledger operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// One of credit, debit, reserve, capture, reversal, transfer
    pub operation: String,
    pub account_id: String,
    /// Amount in smallest currency unit
    pub amount: i64,
    pub currency: String,
    /// Idempotency key, globally unique
    pub reference_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Destination account, required for transfers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_account_id: Option<String>,
}

/// A validated, typed ledger operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessCommand {
    pub operation: Operation,
    pub account_id: AccountId,
    pub amount: Money,
    pub reference_id: String,
    pub metadata: Metadata,
    pub target_account_id: Option<AccountId>,
}

impl TransactionRequest {
    /// Checks the request shape and converts it into a [`ProcessCommand`].
    pub fn validate(&self) -> Result<ProcessCommand, DomainError> {
        let operation: Operation = self.operation.parse()?;
        let account_id: AccountId = parse_id("account_id", &self.account_id)?;

        if self.amount <= 0 {
            return Err(DomainError::ValidationError(
                "amount must be greater than zero".into(),
            ));
        }
        let currency = parse_currency(&self.currency)?;

        let reference_id = self.reference_id.trim();
        if reference_id.is_empty() {
            return Err(DomainError::ValidationError(
                "reference_id is required".into(),
            ));
        }
        if reference_id.chars().count() > MAX_REFERENCE_LEN {
            return Err(DomainError::ValidationError(format!(
                "reference_id cannot exceed {} characters",
                MAX_REFERENCE_LEN
            )));
        }

        let target_account_id = match self.target_account_id.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                Some(parse_id::<AccountId>("target_account_id", raw)?)
            }
            _ => None,
        };
        if operation == Operation::Transfer {
            match target_account_id {
                None => {
                    return Err(DomainError::ValidationError(
                        "target_account_id is required for transfer".into(),
                    ));
                }
                Some(target) if target == account_id => {
                    return Err(DomainError::ValidationError(
                        "target_account_id must differ from account_id".into(),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(ProcessCommand {
            operation,
            account_id,
            amount: Money::from_minor(self.amount, currency)?,
            reference_id: reference_id.to_string(),
            metadata: self.metadata.clone().unwrap_or_default(),
            target_account_id,
        })
    }
}

/// Outcome of a processed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,
    /// Balances after the operation, in smallest currency unit
    pub balance: i64,
    pub reserved_balance: i64,
    pub available_balance: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransactionResponse {
    /// A failed response that is not backed by any stored transaction.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            transaction_id: TransactionId::new(),
            status: TransactionStatus::Failed,
            balance: 0,
            reserved_balance: 0,
            available_balance: 0,
            timestamp: Utc::now(),
            error_message: Some(message.into()),
        }
    }
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        let currency = tx.amount.currency();
        Self {
            transaction_id: tx.id,
            status: tx.status,
            balance: to_minor(tx.balance_after, currency),
            reserved_balance: to_minor(tx.reserved_balance_after, currency),
            available_balance: to_minor(tx.available_balance_after, currency),
            timestamp: tx.processed_at,
            error_message: tx.error_message.clone(),
        }
    }
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self::from(&tx)
    }
}

/// Read model of a stored transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub operation: Operation,
    /// Amount in smallest currency unit
    pub amount: i64,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub reference_id: String,
    pub processed_at: DateTime<Utc>,
    pub balance_after: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Transaction> for TransactionDetails {
    fn from(tx: &Transaction) -> Self {
        let currency = tx.amount.currency();
        Self {
            transaction_id: tx.id,
            account_id: tx.account_id,
            operation: tx.operation,
            amount: to_minor(tx.amount.amount(), currency),
            currency,
            status: tx.status,
            reference_id: tx.reference_id.clone(),
            processed_at: tx.processed_at,
            balance_after: to_minor(tx.balance_after, currency),
            error_message: tx.error_message.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Account DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to open an account for a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub client_id: String,
    /// Opening balance in smallest currency unit
    #[serde(default)]
    pub initial_balance: i64,
    /// Overdraft allowance in smallest currency unit
    #[serde(default)]
    pub credit_limit: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    Currency::BRL.to_string()
}

/// A validated account opening.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAccountCommand {
    pub client_id: ClientId,
    pub initial_balance: Money,
    pub credit_limit: Money,
}

impl CreateAccountRequest {
    pub fn validate(&self) -> Result<CreateAccountCommand, DomainError> {
        let client_id = parse_id("client_id", &self.client_id)?;
        let currency = parse_currency(&self.currency)?;

        if self.initial_balance < 0 {
            return Err(DomainError::ValidationError(
                "initial_balance cannot be negative".into(),
            ));
        }
        if self.credit_limit < 0 {
            return Err(DomainError::ValidationError(
                "credit_limit cannot be negative".into(),
            ));
        }

        Ok(CreateAccountCommand {
            client_id,
            initial_balance: Money::from_minor(self.initial_balance, currency)?,
            credit_limit: Money::from_minor(self.credit_limit, currency)?,
        })
    }
}

/// Account state as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account_id: AccountId,
    pub client_id: ClientId,
    /// Balances in smallest currency unit
    pub balance: i64,
    pub reserved_balance: i64,
    pub available_balance: i64,
    pub credit_limit: i64,
    pub currency: Currency,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        let currency = account.currency();
        Self {
            account_id: account.id(),
            client_id: account.client_id(),
            balance: to_minor(account.balance(), currency),
            reserved_balance: to_minor(account.reserved_balance(), currency),
            available_balance: to_minor(account.available_balance(), currency),
            credit_limit: to_minor(account.credit_limit(), currency),
            currency,
            status: account.status(),
            created_at: account.created_at(),
        }
    }
}
