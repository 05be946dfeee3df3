//! Account aggregate.
//!
//! The account is the only place balances change. Every mutation is pure and
//! in-memory: it returns a [`Mutation`] holding the recorded transaction and
//! the events to publish once the change is committed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::client::ClientId;
use super::events::DomainEvent;
use super::id::uuid_id;
use super::money::{Currency, Money};
use super::transaction::{BalanceSnapshot, Metadata, Operation, Transaction};
use crate::error::DomainError;

uuid_id!(
    /// Unique identifier for an Account.
    AccountId
);

pub const INSUFFICIENT_FUNDS: &str = "insufficient funds";
pub const INSUFFICIENT_AVAILABLE: &str = "insufficient available balance";
pub const INSUFFICIENT_RESERVED: &str = "insufficient reserved balance";

/// Account lifecycle status. `Active ⇄ Blocked`, no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Blocked,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AccountStatus::Active),
            "blocked" => Ok(AccountStatus::Blocked),
            other => Err(DomainError::ValidationError(format!(
                "Invalid account status: '{}'",
                other
            ))),
        }
    }
}

/// Result of applying one balance operation.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// The recorded outcome, success or failure.
    pub transaction: Transaction,
    /// Events raised by the change. Empty for failed outcomes.
    pub events: Vec<DomainEvent>,
}

/// A ledger account with overdraft bounded by its credit limit.
///
/// # Invariants
/// - `reserved_balance >= 0`
/// - `balance >= -credit_limit`
/// - balance operations require `status == Active` and a matching currency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    client_id: ClientId,
    balance: Decimal,
    reserved_balance: Decimal,
    credit_limit: Decimal,
    currency: Currency,
    status: AccountStatus,
    /// Optimistic concurrency token, bumped by the store on every write.
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    /// Transactions recorded on this instance since it was loaded.
    #[serde(skip)]
    transactions: Vec<Transaction>,
}

impl Account {
    /// Opens a new active account.
    pub fn open(
        client_id: ClientId,
        initial_balance: Money,
        credit_limit: Money,
    ) -> Result<Self, DomainError> {
        if initial_balance.currency() != credit_limit.currency() {
            return Err(DomainError::CurrencyMismatch {
                expected: initial_balance.currency(),
                got: credit_limit.currency(),
            });
        }

        Ok(Self {
            id: AccountId::new(),
            client_id,
            balance: initial_balance.amount(),
            reserved_balance: Decimal::ZERO,
            credit_limit: credit_limit.amount(),
            currency: initial_balance.currency(),
            status: AccountStatus::Active,
            version: 0,
            created_at: Utc::now(),
            updated_at: None,
            transactions: Vec::new(),
        })
    }

    /// Creates an account with all fields specified (for database reconstruction).
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: AccountId,
        client_id: ClientId,
        balance: Decimal,
        reserved_balance: Decimal,
        credit_limit: Decimal,
        currency: Currency,
        status: AccountStatus,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            client_id,
            balance,
            reserved_balance,
            credit_limit,
            currency,
            status,
            version,
            created_at,
            updated_at,
            transactions: Vec::new(),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn reserved_balance(&self) -> Decimal {
        self.reserved_balance
    }

    pub fn credit_limit(&self) -> Decimal {
        self.credit_limit
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Sets the version after a successful write. Store adapters only.
    pub fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// `balance - reserved_balance`
    pub fn available_balance(&self) -> Decimal {
        self.balance - self.reserved_balance
    }

    /// `available_balance + credit_limit`
    pub fn total_available(&self) -> Decimal {
        self.available_balance() + self.credit_limit
    }

    /// Transactions recorded on this instance, oldest first.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            balance: self.balance,
            reserved_balance: self.reserved_balance,
            available_balance: self.available_balance(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Balance operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Adds funds. Never fails as a business outcome.
    pub fn credit(
        &mut self,
        amount: Money,
        reference_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Mutation, DomainError> {
        self.ensure_operable(&amount)?;

        self.balance += amount.amount();
        Ok(self.settle(Operation::Credit, amount, reference_id.into(), metadata))
    }

    /// Removes funds, allowing overdraft up to the credit limit.
    pub fn debit(
        &mut self,
        amount: Money,
        reference_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Mutation, DomainError> {
        self.ensure_operable(&amount)?;

        if self.total_available() < amount.amount() {
            return Ok(self.refuse(
                Operation::Debit,
                amount,
                reference_id.into(),
                metadata,
                INSUFFICIENT_FUNDS,
            ));
        }

        self.balance -= amount.amount();
        Ok(self.settle(Operation::Debit, amount, reference_id.into(), metadata))
    }

    /// Earmarks funds without debiting them. Credit limit does not count.
    pub fn reserve(
        &mut self,
        amount: Money,
        reference_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Mutation, DomainError> {
        self.ensure_operable(&amount)?;

        if self.available_balance() < amount.amount() {
            return Ok(self.refuse(
                Operation::Reserve,
                amount,
                reference_id.into(),
                metadata,
                INSUFFICIENT_AVAILABLE,
            ));
        }

        self.reserved_balance += amount.amount();
        Ok(self.settle(Operation::Reserve, amount, reference_id.into(), metadata))
    }

    /// Finalizes a debit against previously reserved funds.
    pub fn capture(
        &mut self,
        amount: Money,
        reference_id: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Mutation, DomainError> {
        self.ensure_operable(&amount)?;

        if self.reserved_balance < amount.amount() {
            return Ok(self.refuse(
                Operation::Capture,
                amount,
                reference_id.into(),
                metadata,
                INSUFFICIENT_RESERVED,
            ));
        }

        self.reserved_balance -= amount.amount();
        self.balance -= amount.amount();
        Ok(self.settle(Operation::Capture, amount, reference_id.into(), metadata))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────────

    /// Blocks the account. Re-blocking raises the event again.
    pub fn block(&mut self) -> DomainEvent {
        self.status = AccountStatus::Blocked;
        self.touch();
        DomainEvent::account_blocked(self.id)
    }

    /// Reactivates the account. Re-activating raises the event again.
    pub fn unblock(&mut self) -> DomainEvent {
        self.status = AccountStatus::Active;
        self.touch();
        DomainEvent::account_unblocked(self.id)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────────

    fn ensure_operable(&self, amount: &Money) -> Result<(), DomainError> {
        if !self.is_active() {
            return Err(DomainError::AccountNotActive(self.id));
        }
        if amount.currency() != self.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: amount.currency(),
            });
        }
        Ok(())
    }

    fn settle(
        &mut self,
        operation: Operation,
        amount: Money,
        reference_id: String,
        metadata: Metadata,
    ) -> Mutation {
        self.touch();
        let transaction = self.record(operation, amount, reference_id, metadata, Ok(()));
        Mutation {
            events: vec![DomainEvent::transaction_processed(transaction.clone())],
            transaction,
        }
    }

    fn refuse(
        &mut self,
        operation: Operation,
        amount: Money,
        reference_id: String,
        metadata: Metadata,
        reason: &str,
    ) -> Mutation {
        let transaction = self.record(
            operation,
            amount,
            reference_id,
            metadata,
            Err(reason.to_string()),
        );
        Mutation {
            transaction,
            events: Vec::new(),
        }
    }

    fn record(
        &mut self,
        operation: Operation,
        amount: Money,
        reference_id: String,
        metadata: Metadata,
        outcome: Result<(), String>,
    ) -> Transaction {
        let transaction = Transaction::record(
            self.id,
            operation,
            amount,
            reference_id,
            metadata,
            self.snapshot(),
            outcome,
        );
        self.transactions.push(transaction.clone());
        transaction
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
