//! Subcommand handlers. Each returns the text to print on stdout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use tracing::{info, warn};

use ak_core::models::StackSpec;
use ak_core::services::config_loader::{self, ConfigFormat, LoadOptions};
use ak_core::services::deployer::{self, DeployOptions, Toolchain};
use ak_core::services::include::{self, IncludedTemplate};
use ak_core::services::outputs::{self, ProvisionedResources};
use ak_core::services::secrets;
use ak_core::services::settings::{self, process_env};
use ak_core::services::{graph_builder, template};
use ak_core::StackError;

use crate::cli::{AwsArgs, Cli, Command, ConfigArgs, IncludeArgs, OutputFormat, SecretArgs};
use crate::render;

pub async fn run(cli: Cli, tools: &dyn Toolchain) -> Result<String> {
    let options = LoadOptions {
        strict: !cli.lenient,
    };
    match cli.command {
        Command::Init { path, force } => init(&path, force),
        Command::Synth {
            config,
            format,
            graph,
            against,
            output,
            include,
        } => {
            let text = synth(&config, &options, format, graph, against.as_deref(), &include)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)
                        .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                    Ok(format!("Wrote {}\n", path.display()))
                }
                None => Ok(text),
            }
        }
        Command::Outputs {
            config,
            provisioned,
            aws,
            json,
        } => show_outputs(&config, &options, provisioned.as_deref(), &aws, json, tools).await,
        Command::PushSecrets {
            env_file,
            aws,
            secrets,
            dry_run,
        } => push_secrets(env_file.as_deref(), &aws, &secrets, dry_run, tools).await,
        Command::Deploy {
            config,
            aws,
            secrets,
            env_file,
            dry_run,
            skip_secrets,
            skip_bootstrap,
            template_out,
            include,
        } => {
            let spec = load_spec(&config, &options)?;
            let mut deploy_options = DeployOptions::new(
                &spec.name,
                settings::resolve_region(aws.region.as_deref(), process_env),
                settings::resolve_prefix(secrets.prefix.as_deref(), process_env),
            );
            deploy_options.dry_run = dry_run;
            deploy_options.skip_secrets = skip_secrets;
            deploy_options.skip_bootstrap = skip_bootstrap;
            if let Some(path) = template_out {
                deploy_options.template_path = path;
            }
            deploy_options.include = load_include(&include, &spec)?;
            if !skip_secrets {
                deploy_options.secret_values =
                    deploy_secret_values(env_file.as_deref(), secrets.project.as_deref())?;
            }
            deploy(&spec, &deploy_options, tools).await
        }
    }
}

pub fn load_spec(config: &ConfigArgs, options: &LoadOptions) -> Result<StackSpec> {
    config_loader::load_file(&config.path, options)
        .wrap_err_with(|| format!("failed to load {}", config.path.display()))
}

pub fn init(path: &Path, force: bool) -> Result<String> {
    let format = ConfigFormat::from_path(path)?;
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let text = config_loader::to_string(&config_loader::example_document(), format)?;
    std::fs::write(path, text).wrap_err_with(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote example configuration");
    Ok(format!("Wrote example configuration to {}\n", path.display()))
}

pub fn synth(
    config: &ConfigArgs,
    options: &LoadOptions,
    format: OutputFormat,
    graph_only: bool,
    against: Option<&Path>,
    include: &IncludeArgs,
) -> Result<String> {
    let spec = load_spec(config, options)?;
    let graph = graph_builder::build(&spec)?;

    if let Some(previous) = against {
        let previous_spec = config_loader::load_file(previous, options)
            .wrap_err_with(|| format!("failed to load {}", previous.display()))?;
        let previous_graph = graph_builder::build(&previous_spec)?;
        return Ok(render::graph_diff(&graph.diff(&previous_graph)));
    }

    if graph_only {
        return Ok(graph.to_json_pretty()? + "\n");
    }
    let rendered = template::render(&graph, &spec)?;
    let text = match (load_include(include, &spec)?, ConfigFormat::from(format)) {
        (Some(included), format) => include::to_string(&included.merge(&rendered)?, format)?,
        (None, ConfigFormat::Json) => rendered.to_json()?,
        (None, ConfigFormat::Yaml) => rendered.to_yaml()?,
    };
    Ok(text)
}

/// The `--include` template with `--parameter` defaults and the stack tags.
fn load_include(args: &IncludeArgs, spec: &StackSpec) -> Result<Option<IncludedTemplate>> {
    let Some(path) = &args.include else {
        return Ok(None);
    };
    let mut parameters = Vec::with_capacity(args.parameters.len());
    for pair in &args.parameters {
        let Some((name, value)) = pair.split_once('=') else {
            bail!("invalid --parameter '{pair}', expected NAME=VALUE");
        };
        parameters.push((name.trim().to_string(), value.to_string()));
    }
    let included = IncludedTemplate::load(path)
        .wrap_err_with(|| format!("failed to include {}", path.display()))?
        .with_parameters(parameters)
        .with_tags(spec.tags.clone());
    info!(
        source = included.source(),
        resources = included.resource_count(),
        "including template"
    );
    Ok(Some(included))
}

pub async fn show_outputs(
    config: &ConfigArgs,
    options: &LoadOptions,
    provisioned: Option<&Path>,
    aws: &AwsArgs,
    json: bool,
    tools: &dyn Toolchain,
) -> Result<String> {
    let spec = load_spec(config, options)?;
    let resources = match provisioned {
        Some(path) => ProvisionedResources::load(path)?,
        None => {
            let region = settings::resolve_region(aws.region.as_deref(), process_env);
            let graph = graph_builder::build(&spec)?;
            let stack_outputs = tools.stack_outputs(&spec.name, &region).await?;
            ProvisionedResources::from_stack_outputs(&graph, &stack_outputs)
        }
    };
    let entries = outputs::collect(&spec, &resources);
    if json {
        Ok(render::outputs_json(&entries)? + "\n")
    } else {
        Ok(render::output_table(&entries))
    }
}

pub async fn push_secrets(
    env_file: Option<&Path>,
    aws: &AwsArgs,
    secret_args: &SecretArgs,
    dry_run: bool,
    tools: &dyn Toolchain,
) -> Result<String> {
    let path = locate_env_file(env_file, secret_args.project.as_deref())?;
    let values = secrets::parse_env_file(&path)?;
    let prefix = settings::resolve_prefix(secret_args.prefix.as_deref(), process_env);
    let bundles = secrets::bundles(&values, &prefix);
    info!(path = %path.display(), bundles = bundles.len(), "read secrets");

    let mut out = format!("Reading from: {}\n", path.display());
    if dry_run || bundles.is_empty() {
        out.push_str(&render::secret_plan(&bundles));
        return Ok(out);
    }
    let region = settings::resolve_region(aws.region.as_deref(), process_env);
    let pushed = deployer::push_secrets(&bundles, &region, tools).await?;
    out.push_str(&render::push_results(&pushed));
    Ok(out)
}

pub async fn deploy(
    spec: &StackSpec,
    options: &DeployOptions,
    tools: &dyn Toolchain,
) -> Result<String> {
    let report = deployer::deploy(spec, options, tools)
        .await
        .wrap_err_with(|| format!("deployment of {} failed", spec.name))?;
    Ok(render::deployment_report(&report))
}

fn locate_env_file(explicit: Option<&Path>, project: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(StackError::EnvFileNotFound(path.display().to_string()).into());
        }
        return Ok(path.to_path_buf());
    }
    let detected = match project {
        Some(project) => Some(project.to_string()),
        None => std::env::current_dir()
            .ok()
            .and_then(|cwd| secrets::detect_project_name(&cwd)),
    };
    Ok(secrets::discover_env_file(detected.as_deref())?)
}

/// When no `.env` file is given and none is discovered, the secret step is
/// skipped. A file passed with `--env` must exist.
fn deploy_secret_values(
    explicit: Option<&Path>,
    project: Option<&str>,
) -> Result<BTreeMap<String, String>> {
    if let Some(path) = explicit {
        let path = locate_env_file(Some(path), project)?;
        return Ok(secrets::parse_env_file(&path)?);
    }
    match locate_env_file(None, project) {
        Ok(path) => Ok(secrets::parse_env_file(&path)?),
        Err(e) => {
            warn!(error = %e, "no .env file, skipping secrets push");
            Ok(BTreeMap::new())
        }
    }
}
