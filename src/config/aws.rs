//! AWS SDK configuration
//!
//! Builds the DynamoDB connection handle from [`Settings`]. Nothing in here
//! talks to the network: credentials are only exercised on the first request.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::Client as DynamoDbSdkClient;

use crate::config::Settings;
use crate::db::DynamoDbClient;

/// Provider name attached to credentials taken from settings.
const SETTINGS_CREDENTIALS_PROVIDER: &str = "user-store-settings";

/// AWS configuration builder
///
/// Applies the fixed region, the static credentials from settings (when both
/// halves are present) and an optional custom endpoint for DynamoDB Local.
pub struct AwsConfigBuilder<'a> {
    settings: &'a Settings,
}

impl<'a> AwsConfigBuilder<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Build the base AWS SDK configuration
    ///
    /// Without static credentials the SDK default chain stays in place and is
    /// resolved lazily.
    pub async fn build_sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.settings.aws_region.clone()));

        if let Some((access_key_id, secret_access_key)) = self.settings.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                SETTINGS_CREDENTIALS_PROVIDER,
            ));
        } else {
            tracing::debug!("No static AWS credentials configured, using the default chain");
        }

        loader.load().await
    }

    /// Create the SDK client, honouring `DYNAMODB_ENDPOINT_URL`.
    pub async fn build_sdk_client(&self) -> DynamoDbSdkClient {
        let sdk_config = self.build_sdk_config().await;

        if let Some(endpoint_url) = &self.settings.dynamodb_endpoint_url {
            tracing::info!(endpoint = %endpoint_url, "Using custom DynamoDB endpoint");

            let dynamodb_config = aws_sdk_dynamodb::config::Builder::from(&sdk_config)
                .endpoint_url(endpoint_url)
                .build();

            DynamoDbSdkClient::from_conf(dynamodb_config)
        } else {
            DynamoDbSdkClient::new(&sdk_config)
        }
    }
}

/// Build AWS SDK config from settings (convenience function)
pub async fn build_sdk_config(settings: &Settings) -> SdkConfig {
    AwsConfigBuilder::new(settings).build_sdk_config().await
}

/// Build an authenticated connection handle to DynamoDB.
pub async fn build_connection(settings: &Settings) -> DynamoDbClient {
    let client = AwsConfigBuilder::new(settings).build_sdk_client().await;
    DynamoDbClient::new(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_credentials() -> Settings {
        let mut settings = Settings::default();
        settings.aws_access_key_id = Some("AKIDEXAMPLE".to_string());
        settings.aws_secret_access_key = Some("wJalrXUtnFEMI".to_string());
        settings
    }

    #[tokio::test]
    async fn test_region_is_fixed() {
        let config = build_sdk_config(&settings_with_credentials()).await;
        assert_eq!(config.region().unwrap().as_ref(), "us-east-1");
    }

    #[tokio::test]
    async fn test_static_credentials_are_installed() {
        let config = build_sdk_config(&settings_with_credentials()).await;
        assert!(config.credentials_provider().is_some());
    }

    #[tokio::test]
    async fn test_missing_credentials_do_not_fail_construction() {
        let connection = build_connection(&Settings::default()).await;
        assert_eq!(
            connection.client().config().region().unwrap().as_ref(),
            "us-east-1"
        );
    }

    #[tokio::test]
    async fn test_connection_with_custom_endpoint() {
        let mut settings = settings_with_credentials();
        settings.dynamodb_endpoint_url = Some("http://localhost:8000".to_string());

        let connection = build_connection(&settings).await;
        assert_eq!(
            connection.client().config().region().unwrap().as_ref(),
            "us-east-1"
        );
    }
}
