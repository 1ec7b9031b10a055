//! Inbound event shapes.
//!
//! The evaluator is invoked by AWS Config as a custom rule; the remediator is
//! fed the EventBridge "Config Rules Compliance Change" event for that rule.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value as Json;

use sse_guard_policy::{ComplianceType, RuleParameters};

use crate::{EvaluationContext, GuardError, ResourceId, S3_BUCKET_RESOURCE_TYPE};

const OVERSIZED_CHANGE: &str = "OversizedConfigurationItemChangeNotification";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all="camelCase")]
pub struct EvaluationResult {
    pub compliance_type: String,
}

impl EvaluationResult {
    pub fn is_compliant(&self) -> bool { self.compliance_type == ComplianceType::Compliant.as_str() }
}

/// Custom rule invocation payload. `invokingEvent` and `ruleParameters` are
/// JSON documents embedded as strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all="camelCase")]
pub struct ConfigRuleEvent {
    pub invoking_event: String,
    #[serde(default)]
    pub rule_parameters: Option<String>,
    pub result_token: String,
    #[serde(default)]
    pub config_rule_name: Option<String>,
    #[serde(default)]
    pub event_left_scope: bool,
    #[serde(default)]
    pub new_evaluation_result: Option<EvaluationResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all="camelCase")]
pub struct InvokingEvent {
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub configuration_item: Option<ConfigurationItem>,
    #[serde(default)]
    pub configuration_item_summary: Option<ConfigurationItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all="camelCase")]
pub struct ConfigurationItem {
    pub resource_type: String,
    pub resource_id: String,
    pub configuration_item_capture_time: DateTime<Utc>,
    #[serde(default)]
    pub configuration_item_status: Option<String>,
}

impl ConfigurationItem {
    pub fn is_deleted(&self) -> bool {
        matches!(self.configuration_item_status.as_deref(), Some("ResourceDeleted") | Some("ResourceDeletedNotRecorded"))
    }
}

/// Where the evaluator gets its policy from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Inline(RuleParameters),
    Rule(String),
}

/// A fully parsed evaluator invocation.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub context: EvaluationContext,
    pub policy_source: PolicySource,
    pub already_compliant: bool,
    /// Set when Config should record NOT_APPLICABLE instead of looking at the bucket.
    pub not_applicable: Option<String>,
}

impl ConfigRuleEvent {
    pub fn from_json(value: Json) -> Result<Self, GuardError> {
        serde_json::from_value(value).map_err(GuardError::malformed)
    }

    pub fn parse(&self) -> Result<EvaluationRequest, GuardError> {
        let invoking: InvokingEvent = serde_json::from_str(&self.invoking_event)
            .map_err(|e| GuardError::malformed(format!("invokingEvent: {}", e)))?;

        let oversized = invoking.message_type.as_deref() == Some(OVERSIZED_CHANGE);
        let item = if oversized {
            invoking.configuration_item_summary.or(invoking.configuration_item)
        } else {
            invoking.configuration_item
        }
        .ok_or_else(|| GuardError::malformed("invokingEvent carries no configuration item"))?;

        let policy_source = match (&self.rule_parameters, &self.config_rule_name) {
            // same class as a bad InputParameters document from the rule store
            (Some(raw), _) => PolicySource::Inline(RuleParameters::from_json_str(raw)?),
            (None, Some(name)) => PolicySource::Rule(name.clone()),
            (None, None) => return Err(GuardError::malformed("neither ruleParameters nor configRuleName present")),
        };

        let not_applicable = if self.event_left_scope {
            Some("Resource is no longer in scope of the rule".to_string())
        } else if item.is_deleted() {
            Some("Resource has been deleted".to_string())
        } else if item.resource_type != S3_BUCKET_RESOURCE_TYPE {
            Some(format!("Resource type {} is not evaluated by this rule", item.resource_type))
        } else {
            None
        };

        Ok(EvaluationRequest {
            context: EvaluationContext {
                resource_type: item.resource_type,
                resource_id: ResourceId(item.resource_id),
                captured_at: item.configuration_item_capture_time,
                result_token: self.result_token.clone(),
            },
            policy_source,
            already_compliant: self.new_evaluation_result.as_ref().is_some_and(EvaluationResult::is_compliant),
            not_applicable,
        })
    }
}

/// EventBridge envelope; only `detail` matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct ComplianceChangeEvent {
    pub detail: ComplianceChangeDetail,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all="camelCase")]
pub struct ComplianceChangeDetail {
    pub resource_id: String,
    pub config_rule_name: String,
    pub new_evaluation_result: EvaluationResult,
}

impl ComplianceChangeEvent {
    pub fn from_json(value: Json) -> Result<Self, GuardError> {
        serde_json::from_value(value).map_err(GuardError::malformed)
    }

    pub fn bucket(&self) -> ResourceId { ResourceId(self.detail.resource_id.clone()) }

    pub fn is_compliant(&self) -> bool { self.detail.new_evaluation_result.is_compliant() }
}
