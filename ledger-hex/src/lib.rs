//! # Ledger Hex
//!
//! Application service layer and outbound adapters for the ledger engine.
//!
//! ## Architecture
//!
//! - `service/` - Transaction orchestrator (orchestrates domain operations)
//! - `retry/` - Bounded exponential backoff for transient store failures
//! - `outbound/` - Event publishers (log, broadcast channel, retrying wrapper)
//!
//! The service is generic over `S: LedgerStore` and `P: EventPublisher`,
//! allowing different store and publisher implementations to be injected.

pub mod outbound;
pub mod retry;
pub mod service;


pub use outbound::{BroadcastPublisher, LogPublisher, RetryingPublisher};
pub use retry::RetryPolicy;
pub use service::{ACCOUNT_NOT_FOUND, LedgerService, OPERATION_CANCELLED, ServiceSettings};
