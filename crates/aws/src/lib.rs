//! AWS SDK backed collaborators: S3 for bucket encryption, Config for rule
//! parameters and evaluation results.

use aws_config::{Region, SdkConfig};

mod config;
mod s3;

pub use config::{build_evaluation, truncate_annotation, ConfigComplianceSink, ConfigRuleStore, MAX_ANNOTATION_LEN};
pub use s3::{configuration_from_request, state_from_configuration, S3EncryptionStore, ENCRYPTION_NOT_FOUND_CODE};

/// Overrides on top of the standard AWS environment (profile, env vars, IMDS).
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    /// Custom endpoint, e.g. a local S3/Config emulator.
    pub endpoint_url: Option<String>,
}

pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::from_env();
    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(url) = &settings.endpoint_url {
        loader = loader.endpoint_url(url.as_str());
    }
    loader.load().await
}

/// One client per service, built once per process and shared by both handlers.
#[derive(Debug, Clone)]
pub struct AwsClients {
    pub s3: aws_sdk_s3::Client,
    pub config: aws_sdk_config::Client,
}

impl AwsClients {
    pub async fn load(settings: &AwsSettings) -> Self {
        let sdk = load_sdk_config(settings).await;
        // emulators generally only speak path-style
        let s3_conf = aws_sdk_s3::config::Builder::from(&sdk)
            .force_path_style(settings.endpoint_url.is_some())
            .build();
        Self {
            s3: aws_sdk_s3::Client::from_conf(s3_conf),
            config: aws_sdk_config::Client::new(&sdk),
        }
    }

    pub fn bucket_store(&self) -> S3EncryptionStore { S3EncryptionStore::new(self.s3.clone()) }
    pub fn rule_store(&self) -> ConfigRuleStore { ConfigRuleStore::new(self.config.clone()) }
    pub fn compliance_sink(&self) -> ConfigComplianceSink { ConfigComplianceSink::new(self.config.clone()) }
}
