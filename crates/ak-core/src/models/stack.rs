use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const VALID_MEMORY_MB: [u32; 6] = [512, 1024, 2048, 4096, 8192, 16384];
pub const DEFAULT_MEMORY_MB: u32 = 512;
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 30;
pub const MAX_TIMEOUT_SECONDS: u32 = 900;
pub const DEFAULT_CIDR_BLOCK: &str = "10.0.0.0/16";
pub const DEFAULT_AVAILABILITY_ZONE_COUNT: u32 = 2;
pub const MAX_AVAILABILITY_ZONE_COUNT: u32 = 6;
pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 30;

/// Environment keys the builder sets on every runtime; agents may not define them.
pub const AGENT_NAME_ENV: &str = "AGENTCORE_AGENT_NAME";
pub const DEFAULT_AGENT_ENV: &str = "AGENTCORE_DEFAULT_AGENT";

type UnknownFields = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Raw documents, as written by the user. Every field is optional so that
// defaulting and validation can report precise field paths.
// ---------------------------------------------------------------------------

/// A stack configuration document as parsed from JSON or YAML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDocument {
    #[serde(default, alias = "stackName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<SecretsDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayDocument>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_policy: Option<String>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
    #[serde(
        default,
        rename = "memoryMB",
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_mb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_network_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_block: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_service_endpoints: Option<bool>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_secrets: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilityDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_logging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_retention_days: Option<i64>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_model_access: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_policies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions_boundary: Option<String>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(flatten, default, skip_serializing)]
    pub unknown: UnknownFields,
}

// ---------------------------------------------------------------------------
// Resolved stack configuration. Built once per invocation by the loader and never
// mutated afterwards.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "MCP")]
    Mcp,
    #[serde(rename = "A2A")]
    A2a,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Mcp => "MCP",
            Self::A2a => "A2A",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HTTP" => Some(Self::Http),
            "MCP" => Some(Self::Mcp),
            "A2A" => Some(Self::A2a),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeardownPolicy {
    #[default]
    Destroy,
    Retain,
}

impl TeardownPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "destroy" => Some(Self::Destroy),
            "retain" => Some(Self::Retain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservabilityProvider {
    Opik,
    Langfuse,
    Phoenix,
    Cloudwatch,
}

impl ObservabilityProvider {
    pub const ALL: [ObservabilityProvider; 4] =
        [Self::Opik, Self::Langfuse, Self::Phoenix, Self::Cloudwatch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opik => "opik",
            Self::Langfuse => "langfuse",
            Self::Phoenix => "phoenix",
            Self::Cloudwatch => "cloudwatch",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackSpec {
    pub name: String,
    pub description: String,
    pub agents: Vec<AgentSpec>,
    pub network: Option<NetworkSpec>,
    pub secrets: Option<SecretsSpec>,
    pub observability: Option<ObservabilitySpec>,
    pub identity: IdentitySpec,
    pub gateway: Option<GatewaySpec>,
    pub tags: BTreeMap<String, String>,
    pub teardown_policy: TeardownPolicy,
}

impl StackSpec {
    /// The agent resolved as default. Validation guarantees exactly one.
    pub fn default_agent(&self) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.is_default)
    }

    pub fn gateway_enabled(&self) -> bool {
        self.gateway.as_ref().is_some_and(|g| g.enabled)
    }

    pub fn logging_enabled(&self) -> bool {
        self.observability.as_ref().is_some_and(|o| o.enable_logging)
    }

    /// Whether the stack materializes its own managed secret.
    pub fn creates_secret_store(&self) -> bool {
        self.secrets
            .as_ref()
            .is_some_and(|s| s.create_secrets && !s.values.is_empty())
    }

    pub fn secret_store_name(&self) -> String {
        self.secrets
            .as_ref()
            .and_then(|s| s.secret_name.clone())
            .unwrap_or_else(|| format!("{}-secrets", self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub name: String,
    pub description: Option<String>,
    pub container_image: String,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u32,
    pub timeout_seconds: u32,
    pub environment: BTreeMap<String, String>,
    pub secret_references: Vec<String>,
    pub protocol: Protocol,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum NetworkSpec {
    /// Use a network that already exists in the account.
    #[serde(rename_all = "camelCase")]
    Reference {
        network_id: String,
        subnet_ids: Vec<String>,
        security_group_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Create {
        cidr_block: String,
        availability_zone_count: u32,
        enable_service_endpoints: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsSpec {
    pub create_secrets: bool,
    pub secret_name: Option<String>,
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservabilitySpec {
    pub provider: ObservabilityProvider,
    pub project: Option<String>,
    pub endpoint: Option<String>,
    pub enable_logging: bool,
    pub log_retention_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum IdentitySpec {
    #[serde(rename_all = "camelCase")]
    Reference { role_arn: String },
    #[serde(rename_all = "camelCase")]
    Create {
        enable_model_access: bool,
        model_ids: Vec<String>,
        additional_policies: Vec<String>,
        permissions_boundary: Option<String>,
    },
}

impl Default for IdentitySpec {
    fn default() -> Self {
        Self::Create {
            enable_model_access: true,
            model_ids: Vec::new(),
            additional_policies: Vec::new(),
            permissions_boundary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    pub enabled: bool,
    pub name: String,
    pub description: Option<String>,
    /// Explicit gateway protocol. `None` falls back to the first agent's.
    pub protocol: Option<Protocol>,
}
