//! Deployment pipeline: push secrets, bootstrap the environment, then
//! synthesize and apply the stack template.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::stack::StackSpec;
use crate::services::aws::{self, PushOutcome};
use crate::services::config_loader::ConfigFormat;
use crate::services::include::{self, IncludedTemplate};
use crate::services::secrets::{self, SecretBundle, CONFIG_DIR};
use crate::services::{cdk, graph_builder, template};

/// External tools the pipeline drives.
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn push_secret(&self, bundle: &SecretBundle, region: &str) -> Result<PushOutcome>;

    async fn caller_account(&self, region: &str) -> Result<String>;

    async fn bootstrap(&self, account: &str, region: &str) -> Result<()>;

    /// `parameters` may carry secret material and must stay off the
    /// command line.
    async fn deploy_stack(
        &self,
        stack_name: &str,
        template_path: &Path,
        parameters: &BTreeMap<String, String>,
        region: &str,
    ) -> Result<()>;

    async fn stack_outputs(&self, stack_name: &str, region: &str)
        -> Result<BTreeMap<String, String>>;
}

/// The `aws` and `cdk` executables on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsToolchain;

#[async_trait]
impl Toolchain for AwsToolchain {
    async fn push_secret(&self, bundle: &SecretBundle, region: &str) -> Result<PushOutcome> {
        aws::push_secret(bundle, region).await
    }

    async fn caller_account(&self, region: &str) -> Result<String> {
        aws::caller_account(region).await
    }

    async fn bootstrap(&self, account: &str, region: &str) -> Result<()> {
        cdk::bootstrap(account, region).await
    }

    async fn deploy_stack(
        &self,
        stack_name: &str,
        template_path: &Path,
        parameters: &BTreeMap<String, String>,
        region: &str,
    ) -> Result<()> {
        aws::deploy_stack(stack_name, template_path, parameters, region).await
    }

    async fn stack_outputs(
        &self,
        stack_name: &str,
        region: &str,
    ) -> Result<BTreeMap<String, String>> {
        aws::stack_outputs(stack_name, region).await
    }
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub region: String,
    pub prefix: String,
    pub dry_run: bool,
    pub skip_secrets: bool,
    pub skip_bootstrap: bool,
    /// Parsed `.env` values. Only classified keys are pushed.
    pub secret_values: BTreeMap<String, String>,
    /// Where the rendered template is written before apply.
    pub template_path: PathBuf,
    /// Existing template merged into the rendered stack.
    pub include: Option<IncludedTemplate>,
}

impl DeployOptions {
    pub fn new(stack_name: &str, region: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            prefix: prefix.into(),
            dry_run: false,
            skip_secrets: false,
            skip_bootstrap: false,
            secret_values: BTreeMap::new(),
            template_path: default_template_path(stack_name),
            include: None,
        }
    }
}

/// `.agentkit/out/{stack}.template.json` under the working directory.
pub fn default_template_path(stack_name: &str) -> PathBuf {
    PathBuf::from(CONFIG_DIR)
        .join("out")
        .join(format!("{stack_name}.template.json"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    PushSecrets,
    Bootstrap,
    Apply,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PushSecrets => "push-secrets",
            Self::Bootstrap => "bootstrap",
            Self::Apply => "apply",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum StepOutcome {
    Completed(String),
    Skipped(String),
    /// The step failed but the pipeline continued.
    IgnoredFailure(String),
    /// Dry-run: what the step would do.
    Planned(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: Step,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecretPlan {
    pub name: String,
    pub masked: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub stack_name: String,
    pub region: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub secrets: Vec<SecretPlan>,
    /// Rendered template as JSON.
    #[serde(skip)]
    pub template: String,
}

impl DeploymentReport {
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|s| s.step == step)
            .map(|s| &s.outcome)
    }
}

/// Run the pipeline. Secret push and apply failures abort; a failed
/// bootstrap is logged and skipped. A dry run makes no tool calls.
pub async fn deploy(
    spec: &StackSpec,
    options: &DeployOptions,
    tools: &dyn Toolchain,
) -> Result<DeploymentReport> {
    let started_at = Utc::now();
    let region = options.region.as_str();

    let graph = graph_builder::build(spec)?;
    let stack_template = template::render(&graph, spec)?;
    let rendered = match &options.include {
        Some(included) => {
            include::to_string(&included.merge(&stack_template)?, ConfigFormat::Json)?
        }
        None => stack_template.to_json()?,
    };
    let parameters = template::parameter_values(&graph, spec)?;
    let bundles = secrets::bundles(&options.secret_values, &options.prefix);
    let mut steps = Vec::with_capacity(3);

    info!(step = %Step::PushSecrets, stack = %spec.name, "Executing step");
    let outcome = if options.skip_secrets {
        StepOutcome::Skipped("--skip-secrets".to_string())
    } else if bundles.is_empty() {
        StepOutcome::Skipped("no classified secrets".to_string())
    } else if options.dry_run {
        StepOutcome::Planned(format!("would push {} secret(s)", bundles.len()))
    } else {
        let mut created = 0;
        for bundle in &bundles {
            if tools.push_secret(bundle, region).await? == PushOutcome::Created {
                created += 1;
            }
        }
        StepOutcome::Completed(format!(
            "pushed {} secret(s), {created} created",
            bundles.len()
        ))
    };
    steps.push(StepReport {
        step: Step::PushSecrets,
        outcome,
    });

    info!(step = %Step::Bootstrap, region, "Executing step");
    let outcome = if options.skip_bootstrap {
        StepOutcome::Skipped("--skip-bootstrap".to_string())
    } else if options.dry_run {
        StepOutcome::Planned(format!("would bootstrap aws://<account>/{region}"))
    } else {
        match bootstrap(tools, region).await {
            Ok(target) => StepOutcome::Completed(target),
            Err(e) => {
                warn!(error = %e, "bootstrap failed, continuing");
                StepOutcome::IgnoredFailure(e.to_string())
            }
        }
    };
    steps.push(StepReport {
        step: Step::Bootstrap,
        outcome,
    });

    info!(step = %Step::Apply, nodes = graph.len(), "Executing step");
    let outcome = if options.dry_run {
        let included = options
            .include
            .as_ref()
            .map(|i| format!(" and {} included from {}", i.resource_count(), i.source()))
            .unwrap_or_default();
        StepOutcome::Planned(format!(
            "would apply {} resource(s){included} to stack {}",
            graph.len(),
            spec.name
        ))
    } else {
        write_template(&options.template_path, &rendered).await?;
        tools
            .deploy_stack(&spec.name, &options.template_path, &parameters, region)
            .await?;
        StepOutcome::Completed(format!("applied {}", options.template_path.display()))
    };
    steps.push(StepReport {
        step: Step::Apply,
        outcome,
    });

    let report = DeploymentReport {
        stack_name: spec.name.clone(),
        region: region.to_string(),
        dry_run: options.dry_run,
        started_at,
        finished_at: Utc::now(),
        steps,
        secrets: bundles
            .iter()
            .map(|b| SecretPlan {
                name: b.name.clone(),
                masked: b.masked(),
            })
            .collect(),
        template: rendered,
    };
    info!(
        stack = %report.stack_name,
        duration_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Deployment finished"
    );
    Ok(report)
}

/// Push every classified bundle, stopping at the first failure.
pub async fn push_secrets(
    bundles: &[SecretBundle],
    region: &str,
    tools: &dyn Toolchain,
) -> Result<Vec<(String, PushOutcome)>> {
    let mut pushed = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let outcome = tools.push_secret(bundle, region).await?;
        pushed.push((bundle.name.clone(), outcome));
    }
    Ok(pushed)
}

async fn bootstrap(tools: &dyn Toolchain, region: &str) -> Result<String> {
    let account = tools.caller_account(region).await?;
    tools.bootstrap(&account, region).await?;
    Ok(cdk::bootstrap_target(&account, region))
}

async fn write_template(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents).await?;
    Ok(())
}
