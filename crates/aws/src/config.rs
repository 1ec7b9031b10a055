use async_trait::async_trait;
use aws_sdk_config::error::{BuildError, DisplayErrorContext};
use aws_sdk_config::primitives::DateTime;
use aws_sdk_config::types::{ComplianceType as SdkComplianceType, Evaluation};

use sse_guard_core::{ComplianceSink, EvaluationContext, GuardError, RuleStore};
use sse_guard_policy::{RuleParameters, Verdict};

/// Config rejects annotations longer than this.
pub const MAX_ANNOTATION_LEN: usize = 256;

pub fn truncate_annotation(annotation: &str) -> &str {
    match annotation.char_indices().nth(MAX_ANNOTATION_LEN) {
        Some((idx, _)) => &annotation[..idx],
        None => annotation,
    }
}

pub fn build_evaluation(context: &EvaluationContext, verdict: &Verdict) -> Result<Evaluation, BuildError> {
    Evaluation::builder()
        .compliance_resource_type(&context.resource_type)
        .compliance_resource_id(context.resource_id.as_str())
        .compliance_type(SdkComplianceType::from(verdict.compliance_type.as_str()))
        .annotation(truncate_annotation(&verdict.annotation))
        .ordering_timestamp(DateTime::from_millis(context.captured_at.timestamp_millis()))
        .build()
}

#[derive(Debug, Clone)]
pub struct ConfigRuleStore {
    client: aws_sdk_config::Client,
}

impl ConfigRuleStore {
    pub fn new(client: aws_sdk_config::Client) -> Self { Self { client } }
}

#[async_trait]
impl RuleStore for ConfigRuleStore {
    async fn rule_parameters(&self, rule_name: &str) -> Result<RuleParameters, GuardError> {
        let out = self.client
            .describe_config_rules()
            .config_rule_names(rule_name)
            .send()
            .await
            .map_err(|err| GuardError::upstream(
                "DescribeConfigRules",
                anyhow::anyhow!("rule {}: {}", rule_name, DisplayErrorContext(&err)),
            ))?;
        let rule = out.config_rules().first().ok_or_else(|| GuardError::upstream(
            "DescribeConfigRules",
            anyhow::anyhow!("rule {} not found", rule_name),
        ))?;
        // a rule registered without parameters has no InputParameters at all
        let raw = rule.input_parameters().unwrap_or("{}");
        Ok(RuleParameters::from_json_str(raw)?)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigComplianceSink {
    client: aws_sdk_config::Client,
}

impl ConfigComplianceSink {
    pub fn new(client: aws_sdk_config::Client) -> Self { Self { client } }
}

#[async_trait]
impl ComplianceSink for ConfigComplianceSink {
    async fn submit_evaluation(&self, context: &EvaluationContext, verdict: &Verdict) -> Result<(), GuardError> {
        let evaluation = build_evaluation(context, verdict).map_err(|e| GuardError::upstream("PutEvaluations", e))?;
        let out = self.client
            .put_evaluations()
            .evaluations(evaluation)
            .result_token(&context.result_token)
            .send()
            .await
            .map_err(|err| GuardError::upstream(
                "PutEvaluations",
                anyhow::anyhow!("resource {}: {}", context.resource_id, DisplayErrorContext(&err)),
            ))?;
        if !out.failed_evaluations().is_empty() {
            return Err(GuardError::upstream(
                "PutEvaluations",
                anyhow::anyhow!("Config rejected {} evaluation(s) for {}", out.failed_evaluations().len(), context.resource_id),
            ));
        }
        Ok(())
    }
}
