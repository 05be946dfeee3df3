//! Domain models for the ledger engine.

mod id;

pub mod account;
pub mod client;
pub mod events;
pub mod money;
pub mod transaction;

pub use account::{AccountId, Account, AccountStatus, Mutation};
pub use client::{Client, ClientId};
pub use events::DomainEvent;
pub use money::{Currency, Money, SUPPORTED_CURRENCIES};
pub use transaction::{
    BalanceSnapshot, Metadata, ORIGINAL_REFERENCE_KEY, Operation, Transaction, TransactionId,
    TransactionStatus,
};
