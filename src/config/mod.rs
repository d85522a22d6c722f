//! Configuration management module
//!
//! Loads settings from environment variables and `.env` files and builds the
//! DynamoDB connection from them.

pub mod aws;
pub mod settings;

pub use aws::{build_connection, build_sdk_config, AwsConfigBuilder};
pub use settings::{Settings, AWS_REGION, DEFAULT_NAME_INDEX, DEFAULT_USERS_TABLE};
