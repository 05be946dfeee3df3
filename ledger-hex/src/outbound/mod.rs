//! Outbound event publishers.

mod broadcast;
mod log;
mod retrying;

pub use broadcast::BroadcastPublisher;
pub use log::LogPublisher;
pub use retrying::RetryingPublisher;
