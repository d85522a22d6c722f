//! Data access layer for a DynamoDB `users` table
//!
//! [`UserRepository`] exposes table lifecycle operations, which fail fast,
//! and record operations, which log failures and return an [`Outcome`].

pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use config::Settings;
pub use db::{Outcome, UserRecord, UserRepository};
pub use error::DbError;
