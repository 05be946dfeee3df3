//! Domain events raised by aggregates and published after commit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::{Account, AccountId};
use super::client::ClientId;
use super::transaction::Transaction;

/// A fact about a completed state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    AccountCreated {
        account_id: AccountId,
        client_id: ClientId,
        initial_balance: Decimal,
        credit_limit: Decimal,
        occurred_on: DateTime<Utc>,
    },
    AccountBlocked {
        account_id: AccountId,
        occurred_on: DateTime<Utc>,
    },
    AccountUnblocked {
        account_id: AccountId,
        occurred_on: DateTime<Utc>,
    },
    TransactionProcessed {
        transaction: Box<Transaction>,
        occurred_on: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn account_created(account: &Account) -> Self {
        DomainEvent::AccountCreated {
            account_id: account.id(),
            client_id: account.client_id(),
            initial_balance: account.balance(),
            credit_limit: account.credit_limit(),
            occurred_on: Utc::now(),
        }
    }

    pub fn account_blocked(account_id: AccountId) -> Self {
        DomainEvent::AccountBlocked {
            account_id,
            occurred_on: Utc::now(),
        }
    }

    pub fn account_unblocked(account_id: AccountId) -> Self {
        DomainEvent::AccountUnblocked {
            account_id,
            occurred_on: Utc::now(),
        }
    }

    pub fn transaction_processed(transaction: Transaction) -> Self {
        DomainEvent::TransactionProcessed {
            transaction: Box::new(transaction),
            occurred_on: Utc::now(),
        }
    }

    /// Stable event name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::AccountCreated { .. } => "account_created",
            DomainEvent::AccountBlocked { .. } => "account_blocked",
            DomainEvent::AccountUnblocked { .. } => "account_unblocked",
            DomainEvent::TransactionProcessed { .. } => "transaction_processed",
        }
    }

    pub fn account_id(&self) -> AccountId {
        match self {
            DomainEvent::AccountCreated { account_id, .. }
            | DomainEvent::AccountBlocked { account_id, .. }
            | DomainEvent::AccountUnblocked { account_id, .. } => *account_id,
            DomainEvent::TransactionProcessed { transaction, .. } => transaction.account_id,
        }
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::AccountCreated { occurred_on, .. }
            | DomainEvent::AccountBlocked { occurred_on, .. }
            | DomainEvent::AccountUnblocked { occurred_on, .. }
            | DomainEvent::TransactionProcessed { occurred_on, .. } => *occurred_on,
        }
    }
}
