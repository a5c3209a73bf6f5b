//! Fluent construction of stack documents from code.
//!
//! The builders only assemble a [`StackDocument`]; [`StackBuilder::build`]
//! runs it through the same defaulting and validation as a loaded file.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::stack::{
    AgentDocument, GatewayDocument, IdentityDocument, NetworkDocument, ObservabilityDocument,
    ObservabilityProvider, Protocol, SecretsDocument, StackDocument, StackSpec, TeardownPolicy,
};
use crate::services::config_loader;

#[derive(Debug, Clone)]
pub struct StackBuilder {
    doc: StackDocument,
}

impl StackBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            doc: StackDocument {
                name: Some(name.into()),
                ..Default::default()
            },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.doc.description = Some(description.into());
        self
    }

    pub fn with_agent(mut self, agent: AgentBuilder) -> Self {
        self.doc.agents.push(agent.into_document());
        self
    }

    pub fn with_agents(mut self, agents: impl IntoIterator<Item = AgentBuilder>) -> Self {
        self.doc
            .agents
            .extend(agents.into_iter().map(AgentBuilder::into_document));
        self
    }

    /// Add an agent with default settings and mark it as the default agent.
    pub fn with_default_agent(
        self,
        name: impl Into<String>,
        container_image: impl Into<String>,
    ) -> Self {
        self.with_agent(AgentBuilder::new(name, container_image).as_default())
    }

    /// Create a new network.
    pub fn with_network(mut self, cidr_block: impl Into<String>, availability_zones: u32) -> Self {
        self.doc.network = Some(NetworkDocument {
            cidr_block: Some(cidr_block.into()),
            availability_zone_count: Some(i64::from(availability_zones)),
            ..Default::default()
        });
        self
    }

    /// Attach runtimes to a network that already exists.
    pub fn with_existing_network<I, S>(mut self, network_id: impl Into<String>, subnet_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.doc.network = Some(NetworkDocument {
            external_network_id: Some(network_id.into()),
            subnet_ids: Some(subnet_ids.into_iter().map(Into::into).collect()),
            ..Default::default()
        });
        self
    }

    pub fn with_secret_values(mut self, values: BTreeMap<String, String>) -> Self {
        self.doc.secrets = Some(SecretsDocument {
            create_secrets: Some(true),
            values,
            ..Default::default()
        });
        self
    }

    pub fn with_opik(self, project: impl Into<String>) -> Self {
        self.with_observability(ObservabilityProvider::Opik, Some(project.into()), None)
    }

    pub fn with_langfuse(self, project: impl Into<String>) -> Self {
        self.with_observability(ObservabilityProvider::Langfuse, Some(project.into()), None)
    }

    /// Log group only, with the given retention.
    pub fn with_cloudwatch_only(self, retention_days: i64) -> Self {
        self.with_observability(ObservabilityProvider::Cloudwatch, None, Some(retention_days))
    }

    fn with_observability(
        mut self,
        provider: ObservabilityProvider,
        project: Option<String>,
        retention_days: Option<i64>,
    ) -> Self {
        self.doc.observability = Some(ObservabilityDocument {
            provider: Some(provider.as_str().to_string()),
            project,
            enable_logging: Some(true),
            log_retention_days: retention_days,
            ..Default::default()
        });
        self
    }

    pub fn with_existing_role(mut self, role_arn: impl Into<String>) -> Self {
        self.doc.identity = Some(IdentityDocument {
            role_arn: Some(role_arn.into()),
            ..Default::default()
        });
        self
    }

    /// Restrict model invocation to the given model ids.
    pub fn with_models<I, S>(mut self, model_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let identity = self.doc.identity.get_or_insert_with(Default::default);
        identity.enable_model_access = Some(true);
        identity
            .model_ids
            .get_or_insert_with(Vec::new)
            .extend(model_ids.into_iter().map(Into::into));
        self
    }

    pub fn with_gateway(mut self, protocol: Option<Protocol>) -> Self {
        self.doc.gateway = Some(GatewayDocument {
            enabled: Some(true),
            protocol: protocol.map(|p| p.as_str().to_string()),
            ..Default::default()
        });
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.doc.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.doc.tags.extend(tags);
        self
    }

    pub fn retain_on_delete(self) -> Self {
        self.with_teardown_policy(TeardownPolicy::Retain)
    }

    pub fn destroy_on_delete(self) -> Self {
        self.with_teardown_policy(TeardownPolicy::Destroy)
    }

    fn with_teardown_policy(mut self, policy: TeardownPolicy) -> Self {
        let value = match policy {
            TeardownPolicy::Destroy => "destroy",
            TeardownPolicy::Retain => "retain",
        };
        self.doc.teardown_policy = Some(value.to_string());
        self
    }

    pub fn document(&self) -> &StackDocument {
        &self.doc
    }

    pub fn into_document(self) -> StackDocument {
        self.doc
    }

    /// Default, validate and resolve the assembled document.
    pub fn build(self) -> Result<StackSpec> {
        config_loader::resolve_document(self.doc)
    }
}

#[derive(Debug, Clone)]
pub struct AgentBuilder {
    doc: AgentDocument,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, container_image: impl Into<String>) -> Self {
        Self {
            doc: AgentDocument {
                name: Some(name.into()),
                container_image: Some(container_image.into()),
                ..Default::default()
            },
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.doc.description = Some(description.into());
        self
    }

    pub fn with_memory(mut self, memory_mb: u32) -> Self {
        self.doc.memory_mb = Some(i64::from(memory_mb));
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u32) -> Self {
        self.doc.timeout_seconds = Some(i64::from(timeout_seconds));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.doc.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_secret_reference(mut self, secret_arn: impl Into<String>) -> Self {
        self.doc.secret_references.push(secret_arn.into());
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.doc.protocol = Some(protocol.as_str().to_string());
        self
    }

    pub fn as_default(mut self) -> Self {
        self.doc.is_default = Some(true);
        self
    }

    pub fn into_document(self) -> AgentDocument {
        self.doc
    }
}
