//! Database module
//!
//! Contains the DynamoDB client, an in-memory stand-in and the data access
//! layer for the users table.

pub mod api;
pub mod dynamodb;
pub mod expression;
pub mod memory;
pub mod models;
pub mod repositories;

pub use api::{DynamoDbApi, Item};
pub use dynamodb::DynamoDbClient;
pub use memory::InMemoryDynamoDb;
pub use models::{TableRef, TableState, UserRecord};
pub use repositories::{Outcome, UserRepository};
