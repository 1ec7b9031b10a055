use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

use sse_guard_policy::{BucketEncryptionState, EncryptionConfigurationRequest, RuleParameters, Verdict};

pub mod event;
pub mod evaluator;
pub mod remediator;

pub use evaluator::{evaluate, EvaluationOutcome};
pub use remediator::{remediate, RemediationOutcome};
pub use sse_guard_policy::PolicyError;

pub const S3_BUCKET_RESOURCE_TYPE: &str = "AWS::S3::Bucket";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Everything that can end an invocation early. A bucket without encryption
/// is not in here: stores report it as `Ok(None)`.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("{operation} failed: {source}")]
    Upstream {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("policy precondition violated: {0}")]
    Precondition(#[from] PolicyError),
}

impl GuardError {
    pub fn upstream(operation: &'static str, source: impl Into<anyhow::Error>) -> Self {
        GuardError::Upstream { operation, source: source.into() }
    }

    pub fn malformed(msg: impl fmt::Display) -> Self { GuardError::MalformedEvent(msg.to_string()) }
}

/// Identifiers for one evaluation; lives only as long as the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub resource_type: String,
    pub resource_id: ResourceId,
    pub captured_at: DateTime<Utc>,
    pub result_token: String,
}

/// Read-only lookup of a Config rule's parameters.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn rule_parameters(&self, rule_name: &str) -> Result<RuleParameters, GuardError>;
}

#[async_trait]
pub trait BucketEncryptionStore: Send + Sync {
    /// `Ok(None)` when the bucket has no default encryption configuration.
    async fn encryption_state(&self, bucket: &ResourceId) -> Result<Option<BucketEncryptionState>, GuardError>;
    async fn apply_encryption(&self, bucket: &ResourceId, request: &EncryptionConfigurationRequest) -> Result<(), GuardError>;
}

#[async_trait]
pub trait ComplianceSink: Send + Sync {
    async fn submit_evaluation(&self, context: &EvaluationContext, verdict: &Verdict) -> Result<(), GuardError>;
}
