//! Application settings
//!
//! Settings are read once from the environment and passed explicitly to the
//! connector; nothing here is held in process-wide state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Region every connection is made in.
pub const AWS_REGION: &str = "us-east-1";

/// Default name of the users table.
pub const DEFAULT_USERS_TABLE: &str = "users";

/// Secondary index used for lookups by `name`.
pub const DEFAULT_NAME_INDEX: &str = "name-index";

/// Main application settings
#[derive(Clone, Deserialize, Serialize)]
pub struct Settings {
    pub app_name: String,
    pub app_version: String,
    pub log_level: String,

    // AWS settings
    pub aws_region: String,
    #[serde(skip_serializing)]
    pub aws_access_key_id: Option<String>,
    #[serde(skip_serializing)]
    pub aws_secret_access_key: Option<String>,
    pub dynamodb_endpoint_url: Option<String>,

    // Table layout
    pub users_table: String,
    pub name_index: String,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let settings = Self {
            app_name: env_or_default("APP_NAME", "user-store"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            aws_region: AWS_REGION.to_string(),
            aws_access_key_id: non_empty_var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: non_empty_var("AWS_SECRET_ACCESS_KEY"),
            dynamodb_endpoint_url: non_empty_var("DYNAMODB_ENDPOINT_URL"),

            users_table: env_or_default("USERS_TABLE", DEFAULT_USERS_TABLE),
            name_index: DEFAULT_NAME_INDEX.to_string(),
        };

        settings.validate().context("Invalid settings")?;

        Ok(settings)
    }

    /// Validate settings
    ///
    /// Credentials are deliberately not checked here: a missing key only
    /// shows up on the first remote call.
    fn validate(&self) -> Result<()> {
        if self.users_table.trim().is_empty() {
            anyhow::bail!("USERS_TABLE cannot be empty");
        }
        if let Some(url) = &self.dynamodb_endpoint_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("DYNAMODB_ENDPOINT_URL must be an http(s) URL, got {}", url);
            }
        }
        Ok(())
    }

    /// Both halves of a static credential pair, if configured.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (&self.aws_access_key_id, &self.aws_secret_access_key) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret.as_str())),
            _ => None,
        }
    }

    /// Describe where requests will go, for startup logs.
    pub fn target_display(&self) -> String {
        match &self.dynamodb_endpoint_url {
            Some(url) => format!("DynamoDB Local ({})", url),
            None => format!("AWS DynamoDB (region: {})", self.aws_region),
        }
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("app_name", &self.app_name)
            .field("app_version", &self.app_version)
            .field("log_level", &self.log_level)
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &self.aws_access_key_id.as_ref().map(|_| "<redacted>"))
            .field("aws_secret_access_key", &self.aws_secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("dynamodb_endpoint_url", &self.dynamodb_endpoint_url)
            .field("users_table", &self.users_table)
            .field("name_index", &self.name_index)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "user-store".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            aws_region: AWS_REGION.to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            dynamodb_endpoint_url: None,
            users_table: DEFAULT_USERS_TABLE.to_string(),
            name_index: DEFAULT_NAME_INDEX.to_string(),
        }
    }
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.aws_region, "us-east-1");
        assert_eq!(settings.users_table, "users");
        assert_eq!(settings.name_index, "name-index");
        assert!(settings.static_credentials().is_none());
    }

    #[test]
    fn test_static_credentials_need_both_halves() {
        let mut settings = Settings::default();
        settings.aws_access_key_id = Some("AKIDEXAMPLE".to_string());
        assert!(settings.static_credentials().is_none());

        settings.aws_secret_access_key = Some("secret".to_string());
        assert_eq!(
            settings.static_credentials(),
            Some(("AKIDEXAMPLE", "secret"))
        );
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut settings = Settings::default();
        settings.aws_access_key_id = Some("AKIDEXAMPLE".to_string());
        settings.aws_secret_access_key = Some("top-secret".to_string());

        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("AKIDEXAMPLE"));
        assert!(!json.contains("top-secret"));

        let debug = format!("{:?}", settings);
        assert!(!debug.contains("top-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut settings = Settings::default();
        settings.dynamodb_endpoint_url = Some("localhost:8000".to_string());
        assert!(settings.validate().is_err());

        settings.dynamodb_endpoint_url = Some("http://localhost:8000".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_target_display() {
        let mut settings = Settings::default();
        assert_eq!(settings.target_display(), "AWS DynamoDB (region: us-east-1)");

        settings.dynamodb_endpoint_url = Some("http://localhost:8000".to_string());
        assert_eq!(settings.target_display(), "DynamoDB Local (http://localhost:8000)");
    }
}
