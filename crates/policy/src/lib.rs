use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;

pub const SSE_S3: &str = "SSE-S3";
pub const SSE_KMS: &str = "SSE-KMS";

pub const NO_ENCRYPTION_ANNOTATION: &str = "No encryption configuration present";
pub const COMPLIANT_ANNOTATION: &str = "Bucket is configured with the correct encryption configuration";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("unsupported EncryptionType '{0}' (expected SSE-S3 or SSE-KMS)")]
    UnknownEncryptionType(String),
    #[error("EncryptionType SSE-KMS requires a non-empty KmsKey parameter")]
    MissingKmsKey,
    #[error("rule parameters are invalid: {0}")]
    InvalidParameters(String),
}

/// Parameters as stored on the Config rule, e.g. `{"EncryptionType":"SSE-KMS","KmsKey":"arn:..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleParameters {
    #[serde(rename="EncryptionType")]
    pub encryption_type: String,
    #[serde(rename="KmsKey", default, skip_serializing_if="Option::is_none")]
    pub kms_key: Option<String>,
}

impl RuleParameters {
    /// Config hands parameters around as a JSON document embedded in a string.
    pub fn from_json_str(raw: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(raw).map_err(|e| PolicyError::InvalidParameters(e.to_string()))
    }
}

/// Server-side encryption algorithm as S3 spells it on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SseAlgorithm {
    Aes256,
    AwsKms,
    /// Anything else S3 reports, e.g. `aws:kms:dsse`.
    Other(String),
}

impl SseAlgorithm {
    pub fn as_str(&self) -> &str {
        match self {
            SseAlgorithm::Aes256 => "AES256",
            SseAlgorithm::AwsKms => "aws:kms",
            SseAlgorithm::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for SseAlgorithm {
    fn from(s: &str) -> Self {
        match s {
            "AES256" => SseAlgorithm::Aes256,
            "aws:kms" => SseAlgorithm::AwsKms,
            other => SseAlgorithm::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Required encryption configuration for a bucket.
///
/// SSE-S3 has no key concept, so a key can only exist on the KMS variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    SseS3,
    SseKms { kms_key_id: String },
}

impl Policy {
    pub fn encryption_type(&self) -> &'static str {
        match self {
            Policy::SseS3 => SSE_S3,
            Policy::SseKms { .. } => SSE_KMS,
        }
    }

    /// The single place `SSE-S3`/`SSE-KMS` is translated to an S3 algorithm.
    /// Evaluation and remediation both go through here.
    pub fn expected_algorithm(&self) -> SseAlgorithm {
        match self {
            Policy::SseS3 => SseAlgorithm::Aes256,
            Policy::SseKms { .. } => SseAlgorithm::AwsKms,
        }
    }

    pub fn kms_key_id(&self) -> Option<&str> {
        match self {
            Policy::SseS3 => None,
            Policy::SseKms { kms_key_id } => Some(kms_key_id.as_str()),
        }
    }
}

impl TryFrom<RuleParameters> for Policy {
    type Error = PolicyError;

    fn try_from(params: RuleParameters) -> Result<Self, Self::Error> {
        match params.encryption_type.as_str() {
            // a KmsKey left on an SSE-S3 rule is ignored
            SSE_S3 => Ok(Policy::SseS3),
            SSE_KMS => match params.kms_key {
                Some(k) if !k.trim().is_empty() => Ok(Policy::SseKms { kms_key_id: k }),
                _ => Err(PolicyError::MissingKmsKey),
            },
            other => Err(PolicyError::UnknownEncryptionType(other.to_string())),
        }
    }
}

/// What S3 currently reports for a bucket's default encryption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketEncryptionState {
    /// `None` means the bucket has no encryption configuration.
    pub algorithm: Option<SseAlgorithm>,
    pub kms_key_id: Option<String>,
}

impl BucketEncryptionState {
    pub fn unencrypted() -> Self { Self::default() }

    pub fn new(algorithm: SseAlgorithm, kms_key_id: Option<String>) -> Self {
        Self { algorithm: Some(algorithm), kms_key_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all="SCREAMING_SNAKE_CASE")]
pub enum ComplianceType {
    Compliant,
    NonCompliant,
    NotApplicable,
}

impl ComplianceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceType::Compliant => "COMPLIANT",
            ComplianceType::NonCompliant => "NON_COMPLIANT",
            ComplianceType::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

impl fmt::Display for ComplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub compliance_type: ComplianceType,
    pub annotation: String,
}

impl Verdict {
    pub fn compliant(annotation: impl Into<String>) -> Self {
        Self { compliance_type: ComplianceType::Compliant, annotation: annotation.into() }
    }
    pub fn non_compliant(annotation: impl Into<String>) -> Self {
        Self { compliance_type: ComplianceType::NonCompliant, annotation: annotation.into() }
    }
    pub fn not_applicable(annotation: impl Into<String>) -> Self {
        Self { compliance_type: ComplianceType::NotApplicable, annotation: annotation.into() }
    }
    pub fn is_compliant(&self) -> bool { self.compliance_type == ComplianceType::Compliant }
}

/// Classify a bucket's actual encryption against the policy.
///
/// Branch order matters: each step assumes the ones before it did not match.
pub fn decide(policy: &Policy, actual: &BucketEncryptionState) -> Verdict {
    let Some(algorithm) = actual.algorithm.as_ref() else {
        return Verdict::non_compliant(NO_ENCRYPTION_ANNOTATION);
    };

    let expected = policy.expected_algorithm();
    if *algorithm != expected {
        return Verdict::non_compliant(format!("Bucket encryption configuration is set to {}", algorithm));
    }

    match policy {
        Policy::SseS3 => Verdict::compliant(COMPLIANT_ANNOTATION),
        Policy::SseKms { kms_key_id } => match actual.kms_key_id.as_deref() {
            Some(actual_key) if actual_key == kms_key_id.as_str() => Verdict::compliant(COMPLIANT_ANNOTATION),
            Some(actual_key) => Verdict::non_compliant(format!("Bucket is using wrong KMS key: {}", actual_key)),
            // S3 omits the key id when the AWS managed aws/s3 key is in use
            None => Verdict::non_compliant("Bucket is using the AWS managed KMS key instead of the configured key"),
        },
    }
}

/// Default-encryption payload to put on a bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionConfigurationRequest {
    pub algorithm: SseAlgorithm,
    pub kms_key_id: Option<String>,
}

impl EncryptionConfigurationRequest {
    /// The state a bucket reports once this request has been applied.
    pub fn resulting_state(&self) -> BucketEncryptionState {
        BucketEncryptionState::new(self.algorithm.clone(), self.kms_key_id.clone())
    }
}

pub fn build_encryption_request(policy: &Policy) -> EncryptionConfigurationRequest {
    EncryptionConfigurationRequest {
        algorithm: policy.expected_algorithm(),
        kms_key_id: policy.kms_key_id().map(str::to_string),
    }
}
