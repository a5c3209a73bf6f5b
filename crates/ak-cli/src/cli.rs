use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use ak_core::services::config_loader::ConfigFormat;

/// Generate, deploy and inspect multi-agent AgentCore stacks.
#[derive(Debug, Parser)]
#[command(name = "agentkit", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write a debug log to .agentkit-debug.log in the working directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Ignore unknown configuration fields instead of rejecting them
    #[arg(long, global = true)]
    pub lenient: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write an example stack configuration
    Init {
        /// Destination file; the extension selects JSON or YAML
        #[arg(default_value = "agentkit.yaml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Render the CloudFormation template (or resource graph) for a stack
    Synth {
        #[command(flatten)]
        config: ConfigArgs,

        /// Template output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Print the resource graph instead of the template
        #[arg(long)]
        graph: bool,

        /// Summarize changes against a previous configuration
        #[arg(long, value_name = "FILE")]
        against: Option<PathBuf>,

        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[command(flatten)]
        include: IncludeArgs,
    },

    /// Show identifiers assigned to a deployed stack
    Outputs {
        #[command(flatten)]
        config: ConfigArgs,

        /// Read identifiers from a JSON file instead of the deployed stack
        #[arg(long, value_name = "FILE")]
        provisioned: Option<PathBuf>,

        #[command(flatten)]
        aws: AwsArgs,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Classify .env values and push them to the secret store
    PushSecrets {
        /// .env file; discovered automatically when omitted
        env_file: Option<PathBuf>,

        #[command(flatten)]
        aws: AwsArgs,

        #[command(flatten)]
        secrets: SecretArgs,

        /// Show what would be pushed without calling the secret store
        #[arg(long)]
        dry_run: bool,
    },

    /// Push secrets, bootstrap and apply the stack
    Deploy {
        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        aws: AwsArgs,

        #[command(flatten)]
        secrets: SecretArgs,

        /// .env file; discovered automatically when omitted
        #[arg(long = "env", value_name = "FILE")]
        env_file: Option<PathBuf>,

        /// Preview the deployment without calling any external tool
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        skip_secrets: bool,

        #[arg(long)]
        skip_bootstrap: bool,

        /// Where the rendered template is written before apply
        #[arg(long, value_name = "FILE")]
        template_out: Option<PathBuf>,

        #[command(flatten)]
        include: IncludeArgs,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Stack configuration file (.json, .yaml or .yml)
    #[arg(
        short = 'c',
        long = "config",
        env = "AGENTKIT_CONFIG",
        default_value = "agentkit.yaml",
        value_name = "FILE"
    )]
    pub path: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct AwsArgs {
    /// AWS region (default: AWS_REGION, AWS_DEFAULT_REGION, then us-east-1)
    #[arg(long)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct SecretArgs {
    /// Secret name prefix (default: AGENTKIT_SECRET_PREFIX, then agentkit)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Project name for ~/.agentkit/projects/{project}/.env lookup
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct IncludeArgs {
    /// Existing CloudFormation template to merge into the stack
    #[arg(long, value_name = "FILE")]
    pub include: Option<PathBuf>,

    /// Default for a parameter of the included template
    #[arg(long = "parameter", value_name = "NAME=VALUE", requires = "include")]
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

impl From<OutputFormat> for ConfigFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => ConfigFormat::Json,
            OutputFormat::Yaml => ConfigFormat::Yaml,
        }
    }
}
