//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod publisher;
mod store;

pub use publisher::{EventPublisher, PublishError};
pub use store::{LedgerStore, UnitOfWork};
