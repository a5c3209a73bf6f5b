use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Deserialize;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, StackError};
use crate::services::secrets::SecretBundle;

async fn run_aws(step: &str, args: &[&str], region: &str) -> Result<String> {
    debug!(step, args = %args.join(" "), region, "running aws");
    let output = Command::new("aws")
        .args(args)
        .args(["--region", region, "--no-cli-pager"])
        .output()
        .await
        .map_err(|e| StackError::external(step, format!("failed to run aws: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(StackError::external(
            step,
            format!(
                "aws {} failed (exit {}): {}",
                args.first().copied().unwrap_or_default(),
                output.status.code().unwrap_or(-1),
                stderr.trim()
            ),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Secret material is handed to `aws` as `file://` arguments so it never
/// appears in the process list. The file is readable by the owner only and
/// removed on drop.
fn private_file(contents: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("agentkit-")
        .suffix(".json")
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn file_argument(file: &NamedTempFile) -> String {
    format!("file://{}", file.path().display())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Updated,
    Created,
}

/// Store a bundle as a new secret version, creating the secret when the
/// store does not know it yet.
pub async fn push_secret(bundle: &SecretBundle, region: &str) -> Result<PushOutcome> {
    let file = private_file(&bundle.secret_string()?)?;
    let value = file_argument(&file);
    let updated = run_aws(
        "push secrets",
        &[
            "secretsmanager",
            "put-secret-value",
            "--secret-id",
            &bundle.name,
            "--secret-string",
            &value,
        ],
        region,
    )
    .await;

    match updated {
        Ok(_) => {
            info!(secret = %bundle.name, "updated existing secret");
            Ok(PushOutcome::Updated)
        }
        Err(StackError::ExternalTool { message, .. })
            if message.contains("ResourceNotFoundException") =>
        {
            run_aws(
                "push secrets",
                &[
                    "secretsmanager",
                    "create-secret",
                    "--name",
                    &bundle.name,
                    "--description",
                    bundle.description(),
                    "--secret-string",
                    &value,
                ],
                region,
            )
            .await?;
            info!(secret = %bundle.name, "created new secret");
            Ok(PushOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

/// Account id of the active credentials.
pub async fn caller_account(region: &str) -> Result<String> {
    run_aws(
        "resolve account",
        &[
            "sts",
            "get-caller-identity",
            "--query",
            "Account",
            "--output",
            "text",
        ],
        region,
    )
    .await
}

/// Create or update a stack from a rendered template file. Parameter values
/// are passed through a private file since they may hold secrets.
pub async fn deploy_stack(
    stack_name: &str,
    template_path: &Path,
    parameters: &BTreeMap<String, String>,
    region: &str,
) -> Result<()> {
    let template = template_path.to_string_lossy();
    let mut args: Vec<&str> = vec![
        "cloudformation",
        "deploy",
        "--stack-name",
        stack_name,
        "--template-file",
        template.as_ref(),
        "--capabilities",
        "CAPABILITY_IAM",
        "CAPABILITY_NAMED_IAM",
        "--no-fail-on-empty-changeset",
    ];
    let overrides = if parameters.is_empty() {
        None
    } else {
        let file = private_file(&parameter_overrides(parameters)?)?;
        let argument = file_argument(&file);
        Some((file, argument))
    };
    if let Some((_, argument)) = &overrides {
        args.extend(["--parameter-overrides", argument.as_str()]);
    }
    run_aws("apply", &args, region).await?;
    Ok(())
}

/// `["Name=Value", ...]`, the JSON list form `--parameter-overrides` accepts.
pub fn parameter_overrides(parameters: &BTreeMap<String, String>) -> Result<String> {
    let list: Vec<String> = parameters
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    Ok(serde_json::to_string(&list)?)
}

/// Outputs of a deployed stack, keyed by output name.
pub async fn stack_outputs(stack_name: &str, region: &str) -> Result<BTreeMap<String, String>> {
    let raw = run_aws(
        "describe stack",
        &[
            "cloudformation",
            "describe-stacks",
            "--stack-name",
            stack_name,
            "--query",
            "Stacks[0].Outputs",
            "--output",
            "json",
        ],
        region,
    )
    .await?;
    parse_stack_outputs(&raw)
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackOutput {
    output_key: String,
    output_value: String,
}

pub fn parse_stack_outputs(raw: &str) -> Result<BTreeMap<String, String>> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Ok(BTreeMap::new());
    }
    let outputs: Vec<StackOutput> = serde_json::from_str(raw)?;
    Ok(outputs
        .into_iter()
        .map(|o| (o.output_key, o.output_value))
        .collect())
}
