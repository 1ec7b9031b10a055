use serde_json::Value as Json;
use tracing::info;

use sse_guard_policy::{build_encryption_request, EncryptionConfigurationRequest};

use crate::event::{ComplianceChangeEvent, PolicySource};
use crate::evaluator::resolve_policy;
use crate::{BucketEncryptionStore, GuardError, ResourceId, RuleStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    AlreadyCompliant,
    Applied { bucket: ResourceId, request: EncryptionConfigurationRequest },
}

/// Put the rule's encryption configuration on a bucket Config flagged.
#[tracing::instrument(skip_all, fields(bucket = tracing::field::Empty))]
pub async fn remediate(
    event: Json,
    rules: &dyn RuleStore,
    buckets: &dyn BucketEncryptionStore,
) -> Result<RemediationOutcome, GuardError> {
    let event = ComplianceChangeEvent::from_json(event)?;
    let bucket = event.bucket();
    tracing::Span::current().record("bucket", bucket.as_str());

    if event.is_compliant() {
        info!("{} is already compliant with the config rule, skipping", bucket);
        return Ok(RemediationOutcome::AlreadyCompliant);
    }

    let rule_name = event.detail.config_rule_name;
    let policy = resolve_policy(PolicySource::Rule(rule_name), rules).await?;
    let request = build_encryption_request(&policy);
    buckets.apply_encryption(&bucket, &request).await?;
    info!(algorithm = %request.algorithm, "enabled encryption on bucket");

    Ok(RemediationOutcome::Applied { bucket, request })
}
