//! # Ledger Types
//!
//! Domain types and port traits for the ledger engine.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Account, Transaction, Client, events)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects and minor-unit conversion
//! - `error/` - Domain, store, orchestration and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Account, AccountId, AccountStatus, BalanceSnapshot, Client, ClientId, Currency, DomainEvent,
    Metadata, Money, Mutation, ORIGINAL_REFERENCE_KEY, Operation, Transaction, TransactionId,
    TransactionStatus,
};
pub use dto::*;
pub use error::{AppError, DomainError, LedgerError, RepoError};
pub use ports::{EventPublisher, LedgerStore, PublishError, UnitOfWork};
