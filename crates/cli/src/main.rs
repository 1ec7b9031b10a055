use anyhow::{Result, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value as Json};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use sse_guard_aws::{AwsClients, AwsSettings};
use sse_guard_core::{evaluate, remediate, EvaluationOutcome, GuardError, RemediationOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about="sse-guard — S3 bucket encryption compliance for AWS Config")]
struct Cli {
    /// Event document (JSON); read from stdin when omitted
    #[arg(short, long, global = true)]
    event: Option<PathBuf>,

    /// AWS region override
    #[arg(long, global = true)]
    region: Option<String>,

    /// Custom AWS endpoint (local emulators)
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    #[arg(long, default_value_t=Level::INFO, global = true)]
    log_level: Level,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Cmd {
    /// Evaluate a Config custom-rule invocation and submit the result
    Evaluate,
    /// Apply the rule's encryption to a bucket from a compliance-change event
    Remediate,
}

fn read_event(path: Option<&Path>) -> Result<Json> {
    let raw = match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("read event {}", p.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("read event from stdin")?,
    };
    Ok(serde_json::from_str(&raw).map_err(GuardError::malformed)?)
}

/// Malformed input and bad rule configuration are told apart from
/// upstream failures so the caller can decide whether a retry makes sense.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<GuardError>() {
        Some(GuardError::MalformedEvent(_)) => 2,
        Some(GuardError::Precondition(_)) => 3,
        Some(GuardError::Upstream { .. }) | None => 1,
    }
}

async fn run(cli: Cli) -> Result<Json> {
    let event = read_event(cli.event.as_deref())?;
    let clients = AwsClients::load(&AwsSettings { region: cli.region, endpoint_url: cli.endpoint_url }).await;

    let report = match cli.cmd {
        Cmd::Evaluate => {
            let (rules, buckets, sink) = (clients.rule_store(), clients.bucket_store(), clients.compliance_sink());
            match evaluate(event, &rules, &buckets, &sink).await? {
                EvaluationOutcome::AlreadyCompliant => json!({ "outcome": "skipped", "reason": "already compliant" }),
                EvaluationOutcome::Submitted { context, verdict } => json!({
                    "outcome": "submitted",
                    "resourceId": context.resource_id,
                    "complianceType": verdict.compliance_type,
                    "annotation": verdict.annotation,
                }),
            }
        }
        Cmd::Remediate => {
            let (rules, buckets) = (clients.rule_store(), clients.bucket_store());
            match remediate(event, &rules, &buckets).await? {
                RemediationOutcome::AlreadyCompliant => json!({ "outcome": "skipped", "reason": "already compliant" }),
                RemediationOutcome::Applied { bucket, request } => json!({
                    "outcome": "applied",
                    "resourceId": bucket,
                    "sseAlgorithm": request.algorithm.as_str(),
                    "kmsMasterKeyId": request.kms_key_id,
                }),
            }
        }
    };
    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .json()
        .with_max_level(cli.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(report) => {
            println!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{:#}", e), "invocation failed");
            ExitCode::from(exit_code(&e))
        }
    }
}
