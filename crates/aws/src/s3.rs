use async_trait::async_trait;
use aws_sdk_s3::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::types::{
    ServerSideEncryption, ServerSideEncryptionByDefault, ServerSideEncryptionConfiguration, ServerSideEncryptionRule,
};
use tracing::debug;

use sse_guard_core::{BucketEncryptionStore, GuardError, ResourceId};
use sse_guard_policy::{BucketEncryptionState, EncryptionConfigurationRequest, SseAlgorithm};

/// Error code S3 returns from GetBucketEncryption when nothing is configured.
pub const ENCRYPTION_NOT_FOUND_CODE: &str = "ServerSideEncryptionConfigurationNotFoundError";

/// Reads the first rule carrying a default-encryption block.
pub fn state_from_configuration(cfg: &ServerSideEncryptionConfiguration) -> BucketEncryptionState {
    cfg.rules()
        .iter()
        .find_map(|rule| rule.apply_server_side_encryption_by_default())
        .map(|d| BucketEncryptionState::new(
            SseAlgorithm::from(d.sse_algorithm().as_str()),
            d.kms_master_key_id().map(str::to_string),
        ))
        .unwrap_or_default()
}

pub fn configuration_from_request(req: &EncryptionConfigurationRequest) -> Result<ServerSideEncryptionConfiguration, BuildError> {
    let by_default = ServerSideEncryptionByDefault::builder()
        .sse_algorithm(ServerSideEncryption::from(req.algorithm.as_str()))
        .set_kms_master_key_id(req.kms_key_id.clone())
        .build()?;
    let rule = ServerSideEncryptionRule::builder()
        .apply_server_side_encryption_by_default(by_default)
        .build();
    ServerSideEncryptionConfiguration::builder().rules(rule).build()
}

#[derive(Debug, Clone)]
pub struct S3EncryptionStore {
    client: aws_sdk_s3::Client,
}

impl S3EncryptionStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self { Self { client } }
}

#[async_trait]
impl BucketEncryptionStore for S3EncryptionStore {
    async fn encryption_state(&self, bucket: &ResourceId) -> Result<Option<BucketEncryptionState>, GuardError> {
        match self.client.get_bucket_encryption().bucket(bucket.as_str()).send().await {
            Ok(out) => Ok(out.server_side_encryption_configuration().map(state_from_configuration)),
            Err(err) if err.as_service_error().and_then(|e| e.code()) == Some(ENCRYPTION_NOT_FOUND_CODE) => {
                debug!(%bucket, "no server side encryption configuration");
                Ok(None)
            }
            Err(err) => Err(GuardError::upstream(
                "GetBucketEncryption",
                anyhow::anyhow!("bucket {}: {}", bucket, DisplayErrorContext(&err)),
            )),
        }
    }

    async fn apply_encryption(&self, bucket: &ResourceId, request: &EncryptionConfigurationRequest) -> Result<(), GuardError> {
        let cfg = configuration_from_request(request).map_err(|e| GuardError::upstream("PutBucketEncryption", e))?;
        self.client
            .put_bucket_encryption()
            .bucket(bucket.as_str())
            .server_side_encryption_configuration(cfg)
            .send()
            .await
            .map_err(|err| GuardError::upstream(
                "PutBucketEncryption",
                anyhow::anyhow!("bucket {}: {}", bucket, DisplayErrorContext(&err)),
            ))?;
        Ok(())
    }
}
