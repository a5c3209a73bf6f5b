use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{Result, StackError};
use crate::models::graph::{
    agent_logical_id, service_endpoint_logical_id, stack_logical_id, Attribute,
    CapabilityStatement, LogicalId, ManagedService, NodeMode, Properties, PropertyValue,
    RefToken, ResourceGraph, ResourceKind, ResourceNode, RetentionTier, StatementKind,
};
use crate::models::stack::{
    AgentSpec, IdentitySpec, NetworkSpec, Protocol, StackSpec, TeardownPolicy, AGENT_NAME_ENV,
    DEFAULT_AGENT_ENV,
};

pub const MODEL_INVOKE_ACTIONS: [&str; 2] = [
    "bedrock:InvokeModel",
    "bedrock:InvokeModelWithResponseStream",
];
pub const LOG_WRITE_ACTIONS: [&str; 3] = [
    "logs:CreateLogGroup",
    "logs:CreateLogStream",
    "logs:PutLogEvents",
];
pub const SECRET_READ_ACTIONS: [&str; 2] = [
    "secretsmanager:GetSecretValue",
    "secretsmanager:DescribeSecret",
];
pub const REGISTRY_PULL_ACTIONS: [&str; 4] = [
    "ecr:GetAuthorizationToken",
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
];
pub const IDENTITY_PRINCIPALS: [&str; 2] = ["bedrock.amazonaws.com", "lambda.amazonaws.com"];

/// Build the ordered resource graph for a validated stack.
///
/// The output depends only on `spec`: identical input yields a graph that
/// serializes byte-identically.
pub fn build(spec: &StackSpec) -> Result<ResourceGraph> {
    let mut graph = GraphEmitter::new(spec);

    graph.emit_network();
    graph.emit_security_boundary();
    graph.emit_secret_store();
    graph.emit_identity();
    graph.emit_log_sink()?;
    for agent in &spec.agents {
        graph.emit_agent(agent);
    }
    graph.emit_gateway();

    let graph = graph.finish();
    graph.check_invariants()?;
    debug!(stack = %graph.stack_name, nodes = graph.len(), "built resource graph");
    Ok(graph)
}

struct NodeDraft(ResourceNode);

impl NodeDraft {
    fn new(kind: ResourceKind, logical_id: LogicalId, mode: NodeMode) -> Self {
        Self(ResourceNode {
            kind,
            logical_id,
            mode,
            agent: None,
            properties: Properties::new(),
            depends_on: BTreeSet::new(),
            teardown: TeardownPolicy::Destroy,
        })
    }

    fn prop(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.0.properties.insert(key.to_string(), value.into());
        self
    }

    fn opt_prop(self, key: &str, value: Option<impl Into<PropertyValue>>) -> Self {
        match value {
            Some(v) => self.prop(key, v),
            None => self,
        }
    }

    /// Insert a reference property and the matching dependency.
    fn reference(mut self, key: &str, token: RefToken) -> Self {
        self.0.depends_on.insert(token.logical_id.clone());
        self.prop(key, token)
    }

    fn depends_on(mut self, logical_id: &LogicalId) -> Self {
        self.0.depends_on.insert(logical_id.clone());
        self
    }

    fn tags(self, tags: &BTreeMap<String, String>) -> Self {
        if tags.is_empty() {
            self
        } else {
            self.prop("Tags", tags)
        }
    }

    fn teardown(mut self, policy: TeardownPolicy) -> Self {
        self.0.teardown = policy;
        self
    }

    fn agent(mut self, name: &str) -> Self {
        self.0.agent = Some(name.to_string());
        self
    }
}

struct GraphEmitter<'a> {
    spec: &'a StackSpec,
    nodes: Vec<ResourceNode>,
    network: Option<LogicalId>,
    security_boundary: Option<LogicalId>,
    secret_store: Option<LogicalId>,
    identity: Option<LogicalId>,
}

impl<'a> GraphEmitter<'a> {
    fn new(spec: &'a StackSpec) -> Self {
        Self {
            spec,
            nodes: Vec::new(),
            network: None,
            security_boundary: None,
            secret_store: None,
            identity: None,
        }
    }

    fn push(&mut self, draft: NodeDraft) -> LogicalId {
        let node = draft.0;
        debug!(
            kind = %node.kind,
            logical_id = %node.logical_id,
            mode = ?node.mode,
            "emitting resource"
        );
        let id = node.logical_id.clone();
        self.nodes.push(node);
        id
    }

    fn id(&self, kind: ResourceKind) -> LogicalId {
        stack_logical_id(&self.spec.name, kind)
    }

    fn finish(self) -> ResourceGraph {
        ResourceGraph {
            stack_name: self.spec.name.clone(),
            nodes: self.nodes,
        }
    }

    fn emit_network(&mut self) {
        let spec = self.spec;
        let Some(network) = &spec.network else {
            return;
        };
        let id = self.id(ResourceKind::Network);
        match network {
            NetworkSpec::Reference {
                network_id,
                subnet_ids,
                ..
            } => {
                let draft = NodeDraft::new(ResourceKind::Network, id, NodeMode::Reference)
                    .prop(Attribute::NetworkId.as_str(), network_id)
                    .prop(Attribute::PrivateSubnetIds.as_str(), subnet_ids.clone());
                self.network = Some(self.push(draft));
            }
            NetworkSpec::Create {
                cidr_block,
                availability_zone_count,
                enable_service_endpoints,
            } => {
                let draft = NodeDraft::new(ResourceKind::Network, id, NodeMode::Create)
                    .prop("CidrBlock", cidr_block)
                    .prop("AvailabilityZoneCount", *availability_zone_count)
                    .prop("EnableServiceEndpoints", *enable_service_endpoints)
                    .tags(&self.spec.tags);
                let network_id = self.push(draft);
                if *enable_service_endpoints {
                    for service in ManagedService::ALL {
                        self.emit_service_endpoint(&network_id, service);
                    }
                }
                self.network = Some(network_id);
            }
        }
    }

    fn emit_service_endpoint(&mut self, network: &LogicalId, service: ManagedService) {
        let id = service_endpoint_logical_id(&self.spec.name, service);
        let mut draft = NodeDraft::new(ResourceKind::ServiceEndpoint, id, NodeMode::Create)
            .prop("ServiceName", service.service_name())
            .prop("EndpointType", service.endpoint_type())
            .reference("NetworkId", network_ref(network, Attribute::NetworkId));
        if service.endpoint_type() == "Interface" {
            draft = draft
                .prop("PrivateDnsEnabled", true)
                .reference("SubnetIds", network_ref(network, Attribute::PrivateSubnetIds));
        }
        self.push(draft);
    }

    fn emit_security_boundary(&mut self) {
        let spec = self.spec;
        let Some(network) = &spec.network else {
            return;
        };
        let id = self.id(ResourceKind::SecurityBoundary);
        let existing = match network {
            NetworkSpec::Reference {
                security_group_ids, ..
            } => security_group_ids.first(),
            NetworkSpec::Create { .. } => None,
        };
        let draft = match existing {
            Some(group_id) => {
                NodeDraft::new(ResourceKind::SecurityBoundary, id, NodeMode::Reference)
                    .prop(Attribute::GroupId.as_str(), group_id)
            }
            None => {
                let network_id = self.network.clone();
                let mut draft =
                    NodeDraft::new(ResourceKind::SecurityBoundary, id.clone(), NodeMode::Create)
                        .prop(
                            "GroupDescription",
                            format!("Security boundary for {} agents", self.spec.name),
                        )
                        .prop("IngressRules", vec![self_ingress_rule(&id)])
                        .prop("EgressRules", vec![open_egress_rule()])
                        .tags(&self.spec.tags);
                if let Some(network_id) = network_id {
                    draft = draft.reference("VpcId", network_ref(&network_id, Attribute::NetworkId));
                }
                draft
            }
        };
        self.security_boundary = Some(self.push(draft));
    }

    fn emit_secret_store(&mut self) {
        if !self.spec.creates_secret_store() {
            return;
        }
        let keys: Vec<String> = self
            .spec
            .secrets
            .as_ref()
            .map(|s| s.values.keys().cloned().collect())
            .unwrap_or_default();
        let draft = NodeDraft::new(
            ResourceKind::SecretStore,
            self.id(ResourceKind::SecretStore),
            NodeMode::Create,
        )
        .prop("Name", self.spec.secret_store_name())
        .prop(
            "Description",
            format!("Secrets for {} agents", self.spec.name),
        )
        .prop("SecretKeys", keys)
        .tags(&self.spec.tags)
        .teardown(self.spec.teardown_policy);
        self.secret_store = Some(self.push(draft));
    }

    fn emit_identity(&mut self) {
        let id = self.id(ResourceKind::Identity);
        let draft = match &self.spec.identity {
            IdentitySpec::Reference { role_arn } => {
                NodeDraft::new(ResourceKind::Identity, id, NodeMode::Reference)
                    .prop(Attribute::RoleArn.as_str(), role_arn)
            }
            IdentitySpec::Create {
                permissions_boundary,
                ..
            } => {
                let statements = self.capability_statements();
                let mut draft = NodeDraft::new(ResourceKind::Identity, id, NodeMode::Create)
                    .prop("Principals", IDENTITY_PRINCIPALS.to_vec())
                    .prop(
                        "Statements",
                        statements
                            .iter()
                            .map(CapabilityStatement::to_property)
                            .collect::<Vec<_>>(),
                    )
                    .opt_prop("PermissionsBoundary", permissions_boundary.as_ref())
                    .tags(&self.spec.tags);
                if let Some(store) = &self.secret_store {
                    draft = draft.depends_on(store);
                }
                draft
            }
        };
        self.identity = Some(self.push(draft));
    }

    /// Allow-rules for a created identity, sorted by (kind, resource) with
    /// duplicates removed.
    fn capability_statements(&self) -> Vec<CapabilityStatement> {
        let IdentitySpec::Create {
            enable_model_access,
            model_ids,
            additional_policies,
            ..
        } = &self.spec.identity
        else {
            return Vec::new();
        };

        let mut statements = Vec::new();
        if *enable_model_access {
            if model_ids.is_empty() {
                statements.push(CapabilityStatement::new(
                    StatementKind::ModelInvoke,
                    &MODEL_INVOKE_ACTIONS,
                    "*",
                ));
            } else {
                statements.extend(model_ids.iter().map(|model| {
                    CapabilityStatement::new(
                        StatementKind::ModelInvoke,
                        &MODEL_INVOKE_ACTIONS,
                        format!("arn:aws:bedrock:*::foundation-model/{model}"),
                    )
                }));
            }
        }

        statements.push(CapabilityStatement::new(
            StatementKind::LogWrite,
            &LOG_WRITE_ACTIONS,
            "arn:aws:logs:*:*:*",
        ));

        for reference in self.spec.agents.iter().flat_map(|a| &a.secret_references) {
            statements.push(CapabilityStatement::new(
                StatementKind::SecretRead,
                &SECRET_READ_ACTIONS,
                reference.as_str(),
            ));
        }
        if let Some(store) = &self.secret_store {
            statements.push(CapabilityStatement::new(
                StatementKind::SecretRead,
                &SECRET_READ_ACTIONS,
                RefToken {
                    kind: ResourceKind::SecretStore,
                    logical_id: store.clone(),
                    attribute: Attribute::SecretArn,
                },
            ));
        }

        statements.push(CapabilityStatement::new(
            StatementKind::RegistryPull,
            &REGISTRY_PULL_ACTIONS,
            "*",
        ));

        for policy in additional_policies {
            statements.push(CapabilityStatement::new(
                StatementKind::ManagedPolicy,
                &[],
                policy.as_str(),
            ));
        }

        statements.sort_by_key(CapabilityStatement::sort_key);
        statements.dedup_by(|a, b| a.sort_key() == b.sort_key());
        statements
    }

    fn emit_log_sink(&mut self) -> Result<()> {
        let Some(observability) = &self.spec.observability else {
            return Ok(());
        };
        if !observability.enable_logging {
            return Ok(());
        }
        let retention = RetentionTier::round_up(observability.log_retention_days).ok_or_else(
            || {
                StackError::config(
                    "observability.logRetentionDays",
                    format!(
                        "must be positive, got {}",
                        observability.log_retention_days
                    ),
                )
            },
        )?;
        let draft = NodeDraft::new(
            ResourceKind::LogSink,
            self.id(ResourceKind::LogSink),
            NodeMode::Create,
        )
        .prop("LogGroupName", format!("/aws/agentcore/{}", self.spec.name))
        .prop("RetentionInDays", retention.to_property())
        .tags(&self.spec.tags)
        .teardown(self.spec.teardown_policy);
        self.push(draft);
        Ok(())
    }

    fn emit_agent(&mut self, agent: &AgentSpec) {
        let runtime_id = agent_logical_id(&self.spec.name, &agent.name, ResourceKind::Runtime);
        let mut tags = self.spec.tags.clone();
        tags.insert("Agent".to_string(), agent.name.clone());

        let mut runtime = NodeDraft::new(ResourceKind::Runtime, runtime_id, NodeMode::Create)
            .agent(&agent.name)
            .prop("AgentRuntimeName", agent.name.as_str())
            .opt_prop("Description", agent.description.as_ref())
            .prop("ContainerUri", agent.container_image.as_str())
            .prop("MemoryMB", agent.memory_mb)
            .prop("TimeoutSeconds", agent.timeout_seconds)
            .prop("ProtocolConfiguration", agent.protocol.as_str())
            .prop("EnvironmentVariables", &self.environment_for(agent))
            .prop("NetworkConfiguration", self.network_configuration())
            .prop("Tags", &tags);

        if let Some(identity) = &self.identity {
            runtime = runtime.reference(
                "RoleArn",
                RefToken {
                    kind: ResourceKind::Identity,
                    logical_id: identity.clone(),
                    attribute: Attribute::RoleArn,
                },
            );
        }
        for dep in [&self.network, &self.security_boundary].into_iter().flatten() {
            runtime = runtime.depends_on(dep);
        }
        let runtime_id = self.push(runtime);

        let endpoint = NodeDraft::new(
            ResourceKind::Endpoint,
            agent_logical_id(&self.spec.name, &agent.name, ResourceKind::Endpoint),
            NodeMode::Create,
        )
        .agent(&agent.name)
        .prop("Name", format!("{}-endpoint", agent.name))
        .prop("Description", format!("Endpoint for agent {}", agent.name))
        .reference(
            "AgentRuntimeId",
            RefToken {
                kind: ResourceKind::Runtime,
                logical_id: runtime_id,
                attribute: Attribute::RuntimeId,
            },
        )
        .prop("Tags", &tags);
        self.push(endpoint);
    }

    /// Observability variables first, agent variables override them, then the
    /// reserved agent identity keys.
    fn environment_for(&self, agent: &AgentSpec) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(observability) = &self.spec.observability {
            env.insert("OBSERVABILITY_ENABLED".to_string(), "true".to_string());
            env.insert(
                "OBSERVABILITY_PROVIDER".to_string(),
                observability.provider.as_str().to_string(),
            );
            if let Some(project) = &observability.project {
                env.insert("OBSERVABILITY_PROJECT".to_string(), project.clone());
            }
            if let Some(endpoint) = &observability.endpoint {
                env.insert("OBSERVABILITY_ENDPOINT".to_string(), endpoint.clone());
            }
        }
        env.extend(agent.environment.clone());
        env.insert(AGENT_NAME_ENV.to_string(), agent.name.clone());
        if agent.is_default {
            env.insert(DEFAULT_AGENT_ENV.to_string(), agent.name.clone());
        }
        env
    }

    fn network_configuration(&self) -> PropertyValue {
        let mut config = BTreeMap::new();
        match (&self.network, &self.security_boundary) {
            (Some(network), boundary) => {
                config.insert("NetworkMode".to_string(), PropertyValue::from("VPC"));
                config.insert(
                    "Subnets".to_string(),
                    network_ref(network, Attribute::PrivateSubnetIds).into(),
                );
                let groups: Vec<PropertyValue> = boundary
                    .iter()
                    .map(|b| {
                        PropertyValue::reference(RefToken {
                            kind: ResourceKind::SecurityBoundary,
                            logical_id: b.clone(),
                            attribute: Attribute::GroupId,
                        })
                    })
                    .collect();
                config.insert("SecurityGroups".to_string(), PropertyValue::List(groups));
            }
            (None, _) => {
                config.insert("NetworkMode".to_string(), PropertyValue::from("PUBLIC"));
            }
        }
        PropertyValue::Map(config)
    }

    fn emit_gateway(&mut self) {
        let Some(gateway) = self.spec.gateway.as_ref().filter(|g| g.enabled) else {
            return;
        };
        let protocol = gateway
            .protocol
            .or_else(|| self.spec.agents.first().map(|a| a.protocol))
            .unwrap_or(Protocol::Mcp);
        let mut draft = NodeDraft::new(
            ResourceKind::Gateway,
            self.id(ResourceKind::Gateway),
            NodeMode::Create,
        )
        .prop("Name", gateway.name.as_str())
        .opt_prop("Description", gateway.description.as_ref())
        .prop("AuthorizerType", "NONE")
        .prop("ProtocolType", protocol.as_str())
        .tags(&self.spec.tags);
        if let Some(identity) = &self.identity {
            draft = draft.reference(
                "RoleArn",
                RefToken {
                    kind: ResourceKind::Identity,
                    logical_id: identity.clone(),
                    attribute: Attribute::RoleArn,
                },
            );
        }
        self.push(draft);
    }
}

fn network_ref(network: &LogicalId, attribute: Attribute) -> RefToken {
    RefToken {
        kind: ResourceKind::Network,
        logical_id: network.clone(),
        attribute,
    }
}

fn self_ingress_rule(boundary: &LogicalId) -> PropertyValue {
    let mut rule = BTreeMap::new();
    rule.insert("IpProtocol".to_string(), PropertyValue::from("-1"));
    rule.insert(
        "SourceSecurityGroup".to_string(),
        PropertyValue::from(boundary.as_str()),
    );
    rule.insert(
        "Description".to_string(),
        PropertyValue::from("Allow communication between agents"),
    );
    PropertyValue::Map(rule)
}

fn open_egress_rule() -> PropertyValue {
    let mut rule = BTreeMap::new();
    rule.insert("IpProtocol".to_string(), PropertyValue::from("-1"));
    rule.insert("CidrIp".to_string(), PropertyValue::from("0.0.0.0/0"));
    PropertyValue::Map(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stack::{
        GatewaySpec, ObservabilityProvider, ObservabilitySpec, SecretsSpec,
    };

    fn agent(name: &str) -> AgentSpec {
        AgentSpec {
            name: name.to_string(),
            description: None,
            container_image: format!("registry/{name}:1"),
            memory_mb: 512,
            timeout_seconds: 30,
            environment: BTreeMap::new(),
            secret_references: Vec::new(),
            protocol: Protocol::Http,
            is_default: false,
        }
    }

    fn spec(agents: Vec<AgentSpec>) -> StackSpec {
        let mut agents = agents;
        if let Some(first) = agents.first_mut() {
            first.is_default = true;
        }
        StackSpec {
            name: "demo".into(),
            description: String::new(),
            agents,
            network: None,
            secrets: None,
            observability: None,
            identity: IdentitySpec::default(),
            gateway: None,
            tags: BTreeMap::new(),
            teardown_policy: TeardownPolicy::Destroy,
        }
    }

    fn ids(graph: &ResourceGraph) -> Vec<&str> {
        graph.nodes.iter().map(|n| n.logical_id.as_str()).collect()
    }

    fn statement_kinds(node: &ResourceNode) -> Vec<String> {
        node.property("Statements")
            .and_then(PropertyValue::as_list)
            .unwrap()
            .iter()
            .map(|s| s.as_map().unwrap()["Kind"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn minimal_stack_is_public_with_created_identity() {
        let graph = build(&spec(vec![agent("worker")])).unwrap();
        assert_eq!(
            ids(&graph),
            vec!["DemoIdentity", "DemoWorkerRuntime", "DemoWorkerEndpoint"]
        );
        let runtime = graph.get("DemoWorkerRuntime").unwrap();
        let network = runtime.property("NetworkConfiguration").unwrap().as_map().unwrap();
        assert_eq!(network["NetworkMode"].as_str(), Some("PUBLIC"));
        assert_eq!(
            runtime.depends_on.iter().map(LogicalId::as_str).collect::<Vec<_>>(),
            vec!["DemoIdentity"]
        );
    }

    #[test]
    fn one_runtime_and_endpoint_per_agent() {
        let names = ["a", "b", "c", "d"];
        let graph = build(&spec(names.iter().map(|n| agent(n)).collect())).unwrap();
        let runtimes: Vec<_> = graph.of_kind(ResourceKind::Runtime).collect();
        let endpoints: Vec<_> = graph.of_kind(ResourceKind::Endpoint).collect();
        assert_eq!(runtimes.len(), names.len());
        assert_eq!(endpoints.len(), names.len());
        for endpoint in endpoints {
            assert_eq!(endpoint.depends_on.len(), 1);
            let dep = endpoint.depends_on.iter().next().unwrap();
            let runtime = graph.get(dep.as_str()).unwrap();
            assert_eq!(runtime.kind, ResourceKind::Runtime);
            assert_eq!(runtime.agent, endpoint.agent);
            let token = endpoint
                .property("AgentRuntimeId")
                .and_then(PropertyValue::as_ref_token)
                .unwrap();
            assert_eq!(&token.logical_id, dep);
            assert_eq!(token.attribute, Attribute::RuntimeId);
        }
    }

    #[test]
    fn created_network_emits_service_endpoints() {
        let mut s = spec(vec![agent("worker")]);
        s.network = Some(NetworkSpec::Create {
            cidr_block: "10.0.0.0/16".into(),
            availability_zone_count: 2,
            enable_service_endpoints: true,
        });
        let graph = build(&s).unwrap();
        let endpoints: Vec<_> = graph.of_kind(ResourceKind::ServiceEndpoint).collect();
        assert_eq!(endpoints.len(), 7);
        for endpoint in &endpoints {
            assert!(endpoint.depends_on.contains(&LogicalId::from("DemoNetwork")));
        }
        let s3 = graph.get("DemoNetworkS3Endpoint").unwrap();
        assert_eq!(s3.property("EndpointType").unwrap().as_str(), Some("Gateway"));

        let boundary = graph.get("DemoSecurityBoundary").unwrap();
        assert_eq!(boundary.mode, NodeMode::Create);
        assert!(boundary.depends_on.contains(&LogicalId::from("DemoNetwork")));

        let runtime = graph.get("DemoWorkerRuntime").unwrap();
        for dep in ["DemoNetwork", "DemoSecurityBoundary", "DemoIdentity"] {
            assert!(runtime.depends_on.contains(&LogicalId::from(dep)), "{dep}");
        }
    }

    #[test]
    fn service_endpoints_can_be_disabled() {
        let mut s = spec(vec![agent("worker")]);
        s.network = Some(NetworkSpec::Create {
            cidr_block: "10.0.0.0/16".into(),
            availability_zone_count: 2,
            enable_service_endpoints: false,
        });
        let graph = build(&s).unwrap();
        assert_eq!(graph.of_kind(ResourceKind::ServiceEndpoint).count(), 0);
    }

    #[test]
    fn referenced_network_and_boundary_have_no_dependencies() {
        let mut s = spec(vec![agent("worker")]);
        s.network = Some(NetworkSpec::Reference {
            network_id: "vpc-123".into(),
            subnet_ids: vec!["subnet-a".into(), "subnet-b".into()],
            security_group_ids: vec!["sg-1".into(), "sg-2".into()],
        });
        let graph = build(&s).unwrap();
        let network = graph.get("DemoNetwork").unwrap();
        assert_eq!(network.mode, NodeMode::Reference);
        assert!(network.depends_on.is_empty());
        assert_eq!(
            network.property("NetworkId").unwrap().as_str(),
            Some("vpc-123")
        );
        let boundary = graph.get("DemoSecurityBoundary").unwrap();
        assert_eq!(boundary.mode, NodeMode::Reference);
        assert!(boundary.depends_on.is_empty());
        assert_eq!(boundary.property("GroupId").unwrap().as_str(), Some("sg-1"));
    }

    #[test]
    fn referenced_identity_has_no_statements() {
        let mut s = spec(vec![agent("worker")]);
        s.identity = IdentitySpec::Reference {
            role_arn: "arn:aws:iam::123:role/existing".into(),
        };
        let graph = build(&s).unwrap();
        let identity = graph.get("DemoIdentity").unwrap();
        assert_eq!(identity.mode, NodeMode::Reference);
        assert!(identity.property("Statements").is_none());
        assert_eq!(
            identity.property("RoleArn").unwrap().as_str(),
            Some("arn:aws:iam::123:role/existing")
        );
    }

    #[test]
    fn statements_are_sorted_and_deduplicated() {
        let mut a = agent("a");
        a.secret_references = vec!["arn:secret:shared".into(), "arn:secret:a".into()];
        let mut b = agent("b");
        b.secret_references = vec!["arn:secret:shared".into()];
        let mut s = spec(vec![a, b]);
        s.identity = IdentitySpec::Create {
            enable_model_access: true,
            model_ids: vec!["model-b".into(), "model-a".into(), "model-b".into()],
            additional_policies: vec!["arn:aws:iam::aws:policy/ReadOnly".into()],
            permissions_boundary: Some("arn:aws:iam::123:policy/boundary".into()),
        };
        let graph = build(&s).unwrap();
        let identity = graph.get("DemoIdentity").unwrap();
        assert_eq!(
            statement_kinds(identity),
            vec![
                "model-invoke",
                "model-invoke",
                "log-write",
                "secret-read",
                "secret-read",
                "registry-pull",
                "managed-policy",
            ]
        );
        let resources: Vec<&str> = identity
            .property("Statements")
            .and_then(PropertyValue::as_list)
            .unwrap()
            .iter()
            .filter_map(|s| s.as_map().unwrap()["Resource"].as_str())
            .collect();
        assert_eq!(resources[0], "arn:aws:bedrock:*::foundation-model/model-a");
        assert_eq!(resources[3], "arn:secret:a");
        assert_eq!(resources[4], "arn:secret:shared");
        assert_eq!(
            identity.property("PermissionsBoundary").unwrap().as_str(),
            Some("arn:aws:iam::123:policy/boundary")
        );
    }

    #[test]
    fn model_access_disabled_omits_model_statement() {
        let mut s = spec(vec![agent("worker")]);
        s.identity = IdentitySpec::Create {
            enable_model_access: false,
            model_ids: vec!["model-a".into()],
            additional_policies: Vec::new(),
            permissions_boundary: None,
        };
        let graph = build(&s).unwrap();
        let kinds = statement_kinds(graph.get("DemoIdentity").unwrap());
        assert_eq!(kinds, vec!["log-write", "registry-pull"]);
    }

    #[test]
    fn created_secret_store_precedes_and_feeds_identity() {
        let mut s = spec(vec![agent("worker")]);
        s.secrets = Some(SecretsSpec {
            create_secrets: true,
            secret_name: None,
            values: BTreeMap::from([("API_KEY".to_string(), "value".to_string())]),
        });
        s.teardown_policy = TeardownPolicy::Retain;
        let graph = build(&s).unwrap();
        assert_eq!(&ids(&graph)[..2], &["DemoSecretStore", "DemoIdentity"]);
        let store = graph.get("DemoSecretStore").unwrap();
        assert_eq!(store.teardown, TeardownPolicy::Retain);
        assert_eq!(store.property("Name").unwrap().as_str(), Some("demo-secrets"));

        let identity = graph.get("DemoIdentity").unwrap();
        assert!(identity.depends_on.contains(&LogicalId::from("DemoSecretStore")));
        let refs = identity.refs();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].attribute, Attribute::SecretArn);
    }

    #[test]
    fn empty_secret_values_emit_no_store() {
        let mut s = spec(vec![agent("worker")]);
        s.secrets = Some(SecretsSpec {
            create_secrets: true,
            secret_name: None,
            values: BTreeMap::new(),
        });
        let graph = build(&s).unwrap();
        assert!(graph.first_of_kind(ResourceKind::SecretStore).is_none());
    }

    #[test]
    fn log_sink_rounds_retention() {
        let mut s = spec(vec![agent("worker")]);
        s.observability = Some(ObservabilitySpec {
            provider: ObservabilityProvider::Cloudwatch,
            project: None,
            endpoint: None,
            enable_logging: true,
            log_retention_days: 10,
        });
        let graph = build(&s).unwrap();
        let sink = graph.get("DemoLogSink").unwrap();
        assert_eq!(sink.property("RetentionInDays").unwrap().as_i64(), Some(14));
        assert_eq!(
            sink.property("LogGroupName").unwrap().as_str(),
            Some("/aws/agentcore/demo")
        );

        s.observability.as_mut().unwrap().log_retention_days = 400;
        let graph = build(&s).unwrap();
        assert_eq!(
            graph
                .get("DemoLogSink")
                .unwrap()
                .property("RetentionInDays")
                .unwrap()
                .as_str(),
            Some("unlimited")
        );
    }

    #[test]
    fn non_positive_retention_fails_the_build() {
        for days in [0, -1] {
            let mut s = spec(vec![agent("worker")]);
            s.observability = Some(ObservabilitySpec {
                provider: ObservabilityProvider::Opik,
                project: None,
                endpoint: None,
                enable_logging: true,
                log_retention_days: days,
            });
            assert!(matches!(build(&s), Err(StackError::Config { .. })));
        }
    }

    #[test]
    fn environment_layers_observability_agent_and_identity() {
        let mut worker = agent("worker");
        worker
            .environment
            .insert("OBSERVABILITY_PROJECT".into(), "override".into());
        let mut s = spec(vec![worker, agent("helper")]);
        s.observability = Some(ObservabilitySpec {
            provider: ObservabilityProvider::Opik,
            project: Some("proj".into()),
            endpoint: None,
            enable_logging: false,
            log_retention_days: 30,
        });
        let graph = build(&s).unwrap();
        assert!(graph.first_of_kind(ResourceKind::LogSink).is_none());

        let env = |id: &str| {
            graph
                .get(id)
                .unwrap()
                .property("EnvironmentVariables")
                .unwrap()
                .as_map()
                .unwrap()
                .clone()
        };
        let worker_env = env("DemoWorkerRuntime");
        assert_eq!(worker_env["OBSERVABILITY_PROJECT"].as_str(), Some("override"));
        assert_eq!(worker_env["OBSERVABILITY_PROVIDER"].as_str(), Some("opik"));
        assert_eq!(worker_env[AGENT_NAME_ENV].as_str(), Some("worker"));
        assert_eq!(worker_env[DEFAULT_AGENT_ENV].as_str(), Some("worker"));

        let helper_env = env("DemoHelperRuntime");
        assert_eq!(helper_env["OBSERVABILITY_PROJECT"].as_str(), Some("proj"));
        assert!(!helper_env.contains_key(DEFAULT_AGENT_ENV));
    }

    #[test]
    fn gateway_only_when_enabled() {
        let mut s = spec(vec![agent("worker")]);
        s.gateway = Some(GatewaySpec {
            enabled: false,
            name: "demo-gateway".into(),
            description: None,
            protocol: None,
        });
        assert!(build(&s)
            .unwrap()
            .first_of_kind(ResourceKind::Gateway)
            .is_none());

        s.gateway.as_mut().unwrap().enabled = true;
        let graph = build(&s).unwrap();
        let gateway = graph.get("DemoGateway").unwrap();
        assert_eq!(
            gateway.depends_on.iter().map(LogicalId::as_str).collect::<Vec<_>>(),
            vec!["DemoIdentity"]
        );
        assert_eq!(graph.nodes.last().unwrap().logical_id, "DemoGateway");
    }

    #[test]
    fn gateway_protocol_prefers_explicit_setting() {
        let mut first = agent("worker");
        first.protocol = Protocol::A2a;
        let mut s = spec(vec![first]);
        s.gateway = Some(GatewaySpec {
            enabled: true,
            name: "demo-gateway".into(),
            description: None,
            protocol: None,
        });
        let protocol = |graph: &ResourceGraph| {
            graph
                .get("DemoGateway")
                .unwrap()
                .property("ProtocolType")
                .unwrap()
                .as_str()
                .unwrap()
                .to_string()
        };
        assert_eq!(protocol(&build(&s).unwrap()), "A2A");

        s.gateway.as_mut().unwrap().protocol = Some(Protocol::Mcp);
        assert_eq!(protocol(&build(&s).unwrap()), "MCP");
    }

    #[test]
    fn build_is_deterministic() {
        let mut s = spec(vec![agent("a"), agent("b")]);
        s.tags.insert("Team".into(), "platform".into());
        s.network = Some(NetworkSpec::Create {
            cidr_block: "10.0.0.0/16".into(),
            availability_zone_count: 2,
            enable_service_endpoints: true,
        });
        let first = build(&s).unwrap().to_json_pretty().unwrap();
        let second = build(&s).unwrap().to_json_pretty().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn timeout_change_touches_only_that_runtime() {
        let before = spec(vec![agent("a"), agent("b")]);
        let mut after = before.clone();
        after.agents[1].timeout_seconds = 600;
        let diff = build(&after).unwrap().diff(&build(&before).unwrap());
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.changed, vec![LogicalId::from("DemoBRuntime")]);
    }
}
