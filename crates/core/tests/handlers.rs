use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value as Json};

use sse_guard_core::{
    evaluate, remediate, BucketEncryptionStore, ComplianceSink, EvaluationContext, EvaluationOutcome, GuardError,
    RemediationOutcome, ResourceId, RuleStore,
};
use sse_guard_policy::{
    BucketEncryptionState, ComplianceType, EncryptionConfigurationRequest, PolicyError, RuleParameters, SseAlgorithm,
    Verdict, NO_ENCRYPTION_ANNOTATION,
};

#[derive(Default)]
struct Fakes {
    rules: HashMap<String, RuleParameters>,
    buckets: Mutex<HashMap<String, BucketEncryptionState>>,
    fail_bucket_reads: bool,
    fail_submissions: bool,
    calls: Mutex<Vec<String>>,
    applied: Mutex<Vec<(ResourceId, EncryptionConfigurationRequest)>>,
    submitted: Mutex<Vec<(EvaluationContext, Verdict)>>,
}

impl Fakes {
    fn with_rule(mut self, name: &str, encryption_type: &str, kms_key: Option<&str>) -> Self {
        self.rules.insert(
            name.to_string(),
            RuleParameters { encryption_type: encryption_type.to_string(), kms_key: kms_key.map(str::to_string) },
        );
        self
    }

    fn with_bucket(self, name: &str, state: BucketEncryptionState) -> Self {
        self.buckets.lock().unwrap().insert(name.to_string(), state);
        self
    }

    fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }
}

#[async_trait]
impl RuleStore for Fakes {
    async fn rule_parameters(&self, rule_name: &str) -> Result<RuleParameters, GuardError> {
        self.calls.lock().unwrap().push(format!("describe_config_rules:{}", rule_name));
        self.rules
            .get(rule_name)
            .cloned()
            .ok_or_else(|| GuardError::upstream("DescribeConfigRules", anyhow::anyhow!("NoSuchConfigRuleException")))
    }
}

#[async_trait]
impl BucketEncryptionStore for Fakes {
    async fn encryption_state(&self, bucket: &ResourceId) -> Result<Option<BucketEncryptionState>, GuardError> {
        self.calls.lock().unwrap().push(format!("get_bucket_encryption:{}", bucket));
        if self.fail_bucket_reads {
            return Err(GuardError::upstream("GetBucketEncryption", anyhow::anyhow!("AccessDenied")));
        }
        Ok(self.buckets.lock().unwrap().get(bucket.as_str()).cloned())
    }

    async fn apply_encryption(&self, bucket: &ResourceId, request: &EncryptionConfigurationRequest) -> Result<(), GuardError> {
        self.calls.lock().unwrap().push(format!("put_bucket_encryption:{}", bucket));
        self.buckets.lock().unwrap().insert(bucket.0.clone(), request.resulting_state());
        self.applied.lock().unwrap().push((bucket.clone(), request.clone()));
        Ok(())
    }
}

#[async_trait]
impl ComplianceSink for Fakes {
    async fn submit_evaluation(&self, context: &EvaluationContext, verdict: &Verdict) -> Result<(), GuardError> {
        self.calls.lock().unwrap().push(format!("put_evaluations:{}", context.resource_id));
        if self.fail_submissions {
            return Err(GuardError::upstream("PutEvaluations", anyhow::anyhow!("throttled")));
        }
        self.submitted.lock().unwrap().push((context.clone(), verdict.clone()));
        Ok(())
    }
}

fn rule_event(bucket: &str, params: Option<Json>) -> Json {
    let invoking = json!({
        "messageType": "ConfigurationItemChangeNotification",
        "configurationItem": {
            "resourceType": "AWS::S3::Bucket",
            "resourceId": bucket,
            "configurationItemCaptureTime": "2024-03-01T10:15:30.123Z",
            "configurationItemStatus": "OK",
        }
    });
    let mut ev = json!({
        "invokingEvent": invoking.to_string(),
        "resultToken": "result-token",
        "configRuleName": "s3-encryption",
        "eventLeftScope": false,
    });
    if let Some(p) = params {
        ev["ruleParameters"] = json!(p.to_string());
    }
    ev
}

fn change_event(bucket: &str, compliance: &str) -> Json {
    json!({
        "detail-type": "Config Rules Compliance Change",
        "detail": {
            "resourceId": bucket,
            "configRuleName": "s3-encryption",
            "newEvaluationResult": { "complianceType": compliance }
        }
    })
}

fn kms_state(key: &str) -> BucketEncryptionState {
    BucketEncryptionState::new(SseAlgorithm::AwsKms, Some(key.to_string()))
}

#[tokio::test]
async fn unencrypted_bucket_is_reported_non_compliant() {
    let fakes = Fakes::default();
    let params = json!({ "EncryptionType": "SSE-S3" });
    let out = evaluate(rule_event("plain", Some(params)), &fakes, &fakes, &fakes).await.unwrap();

    let EvaluationOutcome::Submitted { context, verdict } = out else { panic!("expected a submission") };
    assert_eq!(context.resource_id.as_str(), "plain");
    assert_eq!(context.result_token, "result-token");
    assert_eq!(verdict, Verdict::non_compliant(NO_ENCRYPTION_ANNOTATION));
    assert_eq!(fakes.submitted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn matching_kms_key_is_compliant() {
    let fakes = Fakes::default().with_bucket("kms-bucket", kms_state("arn:key-1"));
    let params = json!({ "EncryptionType": "SSE-KMS", "KmsKey": "arn:key-1" });
    let out = evaluate(rule_event("kms-bucket", Some(params)), &fakes, &fakes, &fakes).await.unwrap();

    let EvaluationOutcome::Submitted { verdict, .. } = out else { panic!("expected a submission") };
    assert_eq!(verdict.compliance_type, ComplianceType::Compliant);
}

#[tokio::test]
async fn wrong_kms_key_names_the_key_in_the_submission() {
    let fakes = Fakes::default().with_bucket("kms-bucket", kms_state("arn:key-2"));
    let params = json!({ "EncryptionType": "SSE-KMS", "KmsKey": "arn:key-1" });
    evaluate(rule_event("kms-bucket", Some(params)), &fakes, &fakes, &fakes).await.unwrap();

    let submitted = fakes.submitted.lock().unwrap();
    let (_, verdict) = &submitted[0];
    assert_eq!(verdict.compliance_type, ComplianceType::NonCompliant);
    assert!(verdict.annotation.contains("arn:key-2"));
}

#[tokio::test]
async fn policy_is_looked_up_by_rule_name_when_not_inline() {
    let fakes = Fakes::default()
        .with_rule("s3-encryption", "SSE-S3", None)
        .with_bucket("aes-bucket", BucketEncryptionState::new(SseAlgorithm::Aes256, None));
    let out = evaluate(rule_event("aes-bucket", None), &fakes, &fakes, &fakes).await.unwrap();

    assert!(matches!(out, EvaluationOutcome::Submitted { ref verdict, .. } if verdict.is_compliant()));
    assert_eq!(fakes.calls()[0], "describe_config_rules:s3-encryption");
}

#[tokio::test]
async fn prior_compliant_result_short_circuits_evaluation() {
    let fakes = Fakes::default();
    let mut ev = rule_event("any", Some(json!({ "EncryptionType": "SSE-S3" })));
    ev["newEvaluationResult"] = json!({ "complianceType": "COMPLIANT" });
    let out = evaluate(ev, &fakes, &fakes, &fakes).await.unwrap();

    assert_eq!(out, EvaluationOutcome::AlreadyCompliant);
    assert!(fakes.calls().is_empty());
}

#[tokio::test]
async fn deleted_bucket_is_not_applicable_without_reading_s3() {
    let fakes = Fakes::default();
    let invoking = json!({
        "configurationItem": {
            "resourceType": "AWS::S3::Bucket",
            "resourceId": "gone",
            "configurationItemCaptureTime": "2024-03-01T10:15:30Z",
            "configurationItemStatus": "ResourceDeleted",
        }
    });
    let ev = json!({ "invokingEvent": invoking.to_string(), "resultToken": "t", "configRuleName": "s3-encryption" });
    let out = evaluate(ev, &fakes, &fakes, &fakes).await.unwrap();

    let EvaluationOutcome::Submitted { verdict, .. } = out else { panic!("expected a submission") };
    assert_eq!(verdict.compliance_type, ComplianceType::NotApplicable);
    assert_eq!(fakes.calls(), vec!["put_evaluations:gone".to_string()]);
}

#[tokio::test]
async fn upstream_read_failure_submits_nothing() {
    let fakes = Fakes { fail_bucket_reads: true, ..Fakes::default() };
    let err = evaluate(rule_event("b", Some(json!({ "EncryptionType": "SSE-S3" }))), &fakes, &fakes, &fakes)
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::Upstream { operation: "GetBucketEncryption", .. }));
    assert!(fakes.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn submission_failure_is_surfaced() {
    let fakes = Fakes { fail_submissions: true, ..Fakes::default() };
    let err = evaluate(rule_event("b", Some(json!({ "EncryptionType": "SSE-S3" }))), &fakes, &fakes, &fakes)
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Upstream { operation: "PutEvaluations", .. }));
}

#[tokio::test]
async fn kms_policy_without_key_fails_before_touching_s3() {
    let fakes = Fakes::default();
    let err = evaluate(rule_event("b", Some(json!({ "EncryptionType": "SSE-KMS" }))), &fakes, &fakes, &fakes)
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::Precondition(PolicyError::MissingKmsKey)));
    assert!(fakes.calls().is_empty());
}

#[tokio::test]
async fn incomplete_inline_parameters_fail_like_stored_ones() {
    let fakes = Fakes::default();
    let err = evaluate(rule_event("b", Some(json!({}))), &fakes, &fakes, &fakes).await.unwrap_err();

    assert!(matches!(err, GuardError::Precondition(PolicyError::InvalidParameters(_))));
    assert!(err.to_string().contains("rule parameters are invalid"));
    assert!(fakes.calls().is_empty());
}

#[tokio::test]
async fn malformed_evaluator_event_is_rejected() {
    let fakes = Fakes::default();
    let err = evaluate(json!({ "resultToken": "t" }), &fakes, &fakes, &fakes).await.unwrap_err();
    assert!(matches!(err, GuardError::MalformedEvent(_)));
    assert!(fakes.calls().is_empty());
}

#[tokio::test]
async fn remediator_applies_kms_configuration_from_rule() {
    let fakes = Fakes::default().with_rule("s3-encryption", "SSE-KMS", Some("arn:key-1"));
    let out = remediate(change_event("flagged", "NON_COMPLIANT"), &fakes, &fakes).await.unwrap();

    let expected = EncryptionConfigurationRequest { algorithm: SseAlgorithm::AwsKms, kms_key_id: Some("arn:key-1".into()) };
    assert_eq!(out, RemediationOutcome::Applied { bucket: ResourceId("flagged".into()), request: expected.clone() });
    assert_eq!(fakes.applied.lock().unwrap().as_slice(), &[(ResourceId("flagged".into()), expected)]);
}

#[tokio::test]
async fn remediated_bucket_then_evaluates_compliant() {
    let fakes = Fakes::default().with_rule("s3-encryption", "SSE-KMS", Some("arn:key-1"));
    remediate(change_event("flagged", "NON_COMPLIANT"), &fakes, &fakes).await.unwrap();
    let out = evaluate(rule_event("flagged", None), &fakes, &fakes, &fakes).await.unwrap();

    assert!(matches!(out, EvaluationOutcome::Submitted { ref verdict, .. } if verdict.is_compliant()));
}

#[tokio::test]
async fn remediator_skips_compliant_buckets() {
    let fakes = Fakes::default();
    let out = remediate(change_event("fine", "COMPLIANT"), &fakes, &fakes).await.unwrap();
    assert_eq!(out, RemediationOutcome::AlreadyCompliant);
    assert!(fakes.calls().is_empty());
}

#[tokio::test]
async fn remediator_rejects_unknown_encryption_type() {
    let fakes = Fakes::default().with_rule("s3-encryption", "SSE-C", None);
    let err = remediate(change_event("flagged", "NON_COMPLIANT"), &fakes, &fakes).await.unwrap_err();

    assert!(matches!(err, GuardError::Precondition(PolicyError::UnknownEncryptionType(ref t)) if t == "SSE-C"));
    assert!(fakes.applied.lock().unwrap().is_empty());
}

#[tokio::test]
async fn remediator_propagates_rule_lookup_failure() {
    let fakes = Fakes::default();
    let err = remediate(change_event("flagged", "NON_COMPLIANT"), &fakes, &fakes).await.unwrap_err();
    assert!(matches!(err, GuardError::Upstream { operation: "DescribeConfigRules", .. }));
}
