use serde_json::Value as Json;
use tracing::{info, warn};

use sse_guard_policy::{decide, BucketEncryptionState, Policy, Verdict};

use crate::event::{ConfigRuleEvent, PolicySource};
use crate::{BucketEncryptionStore, ComplianceSink, EvaluationContext, GuardError, RuleStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationOutcome {
    /// The event already reported COMPLIANT; nothing was queried or submitted.
    AlreadyCompliant,
    Submitted { context: EvaluationContext, verdict: Verdict },
}

pub(crate) async fn resolve_policy(source: PolicySource, rules: &dyn RuleStore) -> Result<Policy, GuardError> {
    let params = match source {
        PolicySource::Inline(params) => params,
        PolicySource::Rule(name) => rules.rule_parameters(&name).await?,
    };
    Ok(Policy::try_from(params)?)
}

/// Evaluate one Config custom-rule invocation and submit the verdict.
#[tracing::instrument(skip_all, fields(bucket = tracing::field::Empty))]
pub async fn evaluate(
    event: Json,
    rules: &dyn RuleStore,
    buckets: &dyn BucketEncryptionStore,
    sink: &dyn ComplianceSink,
) -> Result<EvaluationOutcome, GuardError> {
    let request = ConfigRuleEvent::from_json(event)?.parse()?;
    let context = request.context;
    tracing::Span::current().record("bucket", context.resource_id.as_str());

    if request.already_compliant {
        info!("{} is already compliant with the config rule, skipping", context.resource_id);
        return Ok(EvaluationOutcome::AlreadyCompliant);
    }

    let verdict = match request.not_applicable {
        Some(reason) => {
            info!(%reason, "resource not applicable");
            Verdict::not_applicable(reason)
        }
        None => {
            let policy = resolve_policy(request.policy_source, rules).await?;
            let state = match buckets.encryption_state(&context.resource_id).await? {
                Some(state) => state,
                None => {
                    info!("bucket has no encryption configuration");
                    BucketEncryptionState::unencrypted()
                }
            };
            let verdict = decide(&policy, &state);
            if verdict.is_compliant() {
                info!(encryption_type = policy.encryption_type(), "bucket encryption matches the rule");
            } else {
                warn!(encryption_type = policy.encryption_type(), annotation = %verdict.annotation, "bucket is not compliant");
            }
            verdict
        }
    };

    sink.submit_evaluation(&context, &verdict).await?;
    info!(compliance = %verdict.compliance_type, "submitted evaluation");
    Ok(EvaluationOutcome::Submitted { context, verdict })
}
