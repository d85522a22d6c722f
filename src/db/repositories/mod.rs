//! Repository pattern implementations
//!
//! Data access objects for DynamoDB tables.

pub mod outcome;
pub mod users;

pub use outcome::Outcome;
pub use users::{UserRepository, TABLE_POLL_ATTEMPTS, TABLE_POLL_INTERVAL};
