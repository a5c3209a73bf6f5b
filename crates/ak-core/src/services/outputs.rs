use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};
use crate::models::graph::{
    agent_logical_id, stack_logical_id, Attribute, NodeMode, ResourceGraph, ResourceKind,
};
use crate::models::output::{OutputEntry, OutputValue};
use crate::models::stack::{IdentitySpec, NetworkSpec, StackSpec};
use crate::services::template::output_key;

/// Identifiers assigned by the provisioning engine, keyed by logical id and
/// then by attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionedResources(BTreeMap<String, BTreeMap<String, String>>);

impl ProvisionedResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, logical_id: &str, attribute: Attribute, value: impl Into<String>) {
        self.0
            .entry(logical_id.to_string())
            .or_default()
            .insert(attribute.as_str().to_string(), value.into());
    }

    pub fn get(&self, logical_id: &str, attribute: Attribute) -> Option<&str> {
        self.0
            .get(logical_id)
            .and_then(|attrs| attrs.get(attribute.as_str()))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StackError::ConfigNotFound(path.to_path_buf()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Map stack outputs (keyed `{LogicalId}{Attribute}`) back onto the
    /// created nodes of `graph`. Unrelated outputs are ignored.
    pub fn from_stack_outputs(graph: &ResourceGraph, outputs: &BTreeMap<String, String>) -> Self {
        let mut provisioned = Self::new();
        for node in graph.nodes.iter().filter(|n| n.mode == NodeMode::Create) {
            for attribute in node.kind.exported_attributes() {
                let key = output_key(node.logical_id.as_str(), *attribute);
                if let Some(value) = outputs.get(&key) {
                    provisioned.insert(node.logical_id.as_str(), *attribute, value.clone());
                }
            }
        }
        provisioned
    }
}

/// Human-readable label/value pairs describing a deployed stack.
///
/// Entries appear only for resources the stack requests. Identifiers the
/// provider has not reported yet are `Pending`.
pub fn collect(spec: &StackSpec, provisioned: &ProvisionedResources) -> Vec<OutputEntry> {
    let assigned = |kind: ResourceKind, attribute: Attribute| {
        let id = stack_logical_id(&spec.name, kind);
        lookup(provisioned, id.as_str(), attribute)
    };
    let mut entries = Vec::new();

    if let Some(network) = &spec.network {
        let (network_id, boundary) = match network {
            NetworkSpec::Reference {
                network_id,
                security_group_ids,
                ..
            } => (
                OutputValue::Known(network_id.clone()),
                match security_group_ids.first() {
                    Some(group) => OutputValue::Known(group.clone()),
                    None => assigned(ResourceKind::SecurityBoundary, Attribute::GroupId),
                },
            ),
            NetworkSpec::Create { .. } => (
                assigned(ResourceKind::Network, Attribute::NetworkId),
                assigned(ResourceKind::SecurityBoundary, Attribute::GroupId),
            ),
        };
        entries.push(OutputEntry::new("NetworkId", network_id));
        entries.push(OutputEntry::new("SecurityBoundaryId", boundary));
    }

    let role = match &spec.identity {
        IdentitySpec::Reference { role_arn } => OutputValue::Known(role_arn.clone()),
        IdentitySpec::Create { .. } => assigned(ResourceKind::Identity, Attribute::RoleArn),
    };
    entries.push(OutputEntry::new("IdentityRoleArn", role));

    if spec.logging_enabled() {
        entries.push(OutputEntry::new(
            "LogSinkName",
            assigned(ResourceKind::LogSink, Attribute::LogGroupName),
        ));
    }

    entries.push(OutputEntry::new(
        "AgentCount",
        OutputValue::Known(spec.agents.len().to_string()),
    ));

    for agent in &spec.agents {
        let runtime = agent_logical_id(&spec.name, &agent.name, ResourceKind::Runtime);
        let endpoint = agent_logical_id(&spec.name, &agent.name, ResourceKind::Endpoint);
        let label = |suffix: &str| format!("Agent-{}-{suffix}", agent.name);
        entries.push(OutputEntry::new(
            label("RuntimeArn"),
            lookup(provisioned, runtime.as_str(), Attribute::RuntimeArn),
        ));
        entries.push(OutputEntry::new(
            label("RuntimeId"),
            lookup(provisioned, runtime.as_str(), Attribute::RuntimeId),
        ));
        entries.push(OutputEntry::new(
            label("EndpointArn"),
            lookup(provisioned, endpoint.as_str(), Attribute::EndpointArn),
        ));
        entries.push(OutputEntry::new(
            label("Image"),
            OutputValue::Known(agent.container_image.clone()),
        ));
    }

    if spec.gateway_enabled() {
        for (label, attribute) in [
            ("GatewayArn", Attribute::GatewayArn),
            ("GatewayId", Attribute::GatewayId),
            ("GatewayUrl", Attribute::GatewayUrl),
        ] {
            entries.push(OutputEntry::new(
                label,
                assigned(ResourceKind::Gateway, attribute),
            ));
        }
    }

    entries
}

fn lookup(provisioned: &ProvisionedResources, logical_id: &str, attribute: Attribute) -> OutputValue {
    match provisioned.get(logical_id, attribute) {
        Some(value) if !value.is_empty() => OutputValue::Known(value.to_string()),
        _ => OutputValue::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stack::{
        AgentSpec, GatewaySpec, ObservabilityProvider, ObservabilitySpec, Protocol, TeardownPolicy,
    };
    use crate::services::graph_builder;

    fn spec(gateway: bool) -> StackSpec {
        StackSpec {
            name: "demo".into(),
            description: String::new(),
            agents: vec![AgentSpec {
                name: "worker".into(),
                description: None,
                container_image: "registry/worker:1".into(),
                memory_mb: 512,
                timeout_seconds: 30,
                environment: BTreeMap::new(),
                secret_references: Vec::new(),
                protocol: Protocol::Http,
                is_default: true,
            }],
            network: None,
            secrets: None,
            observability: None,
            identity: IdentitySpec::default(),
            gateway: Some(GatewaySpec {
                enabled: gateway,
                name: "demo-gateway".into(),
                description: None,
                protocol: None,
            }),
            tags: BTreeMap::new(),
            teardown_policy: TeardownPolicy::Destroy,
        }
    }

    fn labels(entries: &[OutputEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.label.as_str()).collect()
    }

    #[test]
    fn disabled_gateway_has_no_outputs() {
        let entries = collect(&spec(false), &ProvisionedResources::new());
        assert!(!labels(&entries).iter().any(|l| l.starts_with("Gateway")));
        assert_eq!(
            labels(&entries),
            vec![
                "IdentityRoleArn",
                "AgentCount",
                "Agent-worker-RuntimeArn",
                "Agent-worker-RuntimeId",
                "Agent-worker-EndpointArn",
                "Agent-worker-Image",
            ]
        );
    }

    #[test]
    fn enabled_gateway_reports_pending_until_provisioned() {
        let entries = collect(&spec(true), &ProvisionedResources::new());
        let gateway: Vec<_> = entries
            .iter()
            .filter(|e| e.label.starts_with("Gateway"))
            .collect();
        assert_eq!(gateway.len(), 3);
        assert!(gateway.iter().all(|e| e.value.is_pending()));
    }

    #[test]
    fn provisioned_values_are_reported() {
        let mut provisioned = ProvisionedResources::new();
        provisioned.insert("DemoWorkerRuntime", Attribute::RuntimeId, "rt-123");
        provisioned.insert("DemoIdentity", Attribute::RoleArn, "arn:role");
        let entries = collect(&spec(false), &provisioned);
        let value = |label: &str| {
            entries
                .iter()
                .find(|e| e.label == label)
                .map(|e| e.value.clone())
                .unwrap()
        };
        assert_eq!(value("Agent-worker-RuntimeId"), OutputValue::Known("rt-123".into()));
        assert_eq!(value("IdentityRoleArn"), OutputValue::Known("arn:role".into()));
        assert_eq!(value("Agent-worker-RuntimeArn"), OutputValue::Pending);
        assert_eq!(value("AgentCount"), OutputValue::Known("1".into()));
        assert_eq!(
            value("Agent-worker-Image"),
            OutputValue::Known("registry/worker:1".into())
        );
    }

    #[test]
    fn reference_mode_values_are_known_from_spec() {
        let mut s = spec(false);
        s.network = Some(NetworkSpec::Reference {
            network_id: "vpc-1".into(),
            subnet_ids: vec!["subnet-1".into()],
            security_group_ids: vec!["sg-1".into()],
        });
        s.identity = IdentitySpec::Reference {
            role_arn: "arn:existing".into(),
        };
        let entries = collect(&s, &ProvisionedResources::new());
        assert_eq!(entries[0], OutputEntry::new("NetworkId", OutputValue::Known("vpc-1".into())));
        assert_eq!(
            entries[1],
            OutputEntry::new("SecurityBoundaryId", OutputValue::Known("sg-1".into()))
        );
        assert_eq!(
            entries[2],
            OutputEntry::new("IdentityRoleArn", OutputValue::Known("arn:existing".into()))
        );
    }

    #[test]
    fn log_sink_name_is_pending_until_provisioned() {
        let mut s = spec(false);
        s.observability = Some(ObservabilitySpec {
            provider: ObservabilityProvider::Cloudwatch,
            project: None,
            endpoint: None,
            enable_logging: true,
            log_retention_days: 30,
        });
        let entry = |provisioned: &ProvisionedResources| {
            collect(&s, provisioned)
                .into_iter()
                .find(|e| e.label == "LogSinkName")
                .map(|e| e.value)
        };
        assert_eq!(entry(&ProvisionedResources::new()), Some(OutputValue::Pending));

        let mut provisioned = ProvisionedResources::new();
        provisioned.insert("DemoLogSink", Attribute::LogGroupName, "/aws/agentcore/demo");
        assert_eq!(
            entry(&provisioned),
            Some(OutputValue::Known("/aws/agentcore/demo".into()))
        );
    }

    #[test]
    fn provisioned_resources_read_from_json() {
        let provisioned = ProvisionedResources::from_json(
            r#"{"DemoGateway": {"GatewayUrl": "https://gw.example"}}"#,
        )
        .unwrap();
        assert_eq!(
            provisioned.get("DemoGateway", Attribute::GatewayUrl),
            Some("https://gw.example")
        );
    }

    #[test]
    fn stack_outputs_map_back_to_nodes() {
        let s = spec(true);
        let graph = graph_builder::build(&s).unwrap();
        let outputs = BTreeMap::from([
            ("DemoGatewayGatewayId".to_string(), "gw-1".to_string()),
            ("DemoWorkerEndpointEndpointArn".to_string(), "arn:ep".to_string()),
            ("SomethingElse".to_string(), "ignored".to_string()),
        ]);
        let provisioned = ProvisionedResources::from_stack_outputs(&graph, &outputs);
        assert_eq!(provisioned.get("DemoGateway", Attribute::GatewayId), Some("gw-1"));
        assert_eq!(
            provisioned.get("DemoWorkerEndpoint", Attribute::EndpointArn),
            Some("arn:ep")
        );
        let entries = collect(&s, &provisioned);
        let gateway_id = entries.iter().find(|e| e.label == "GatewayId").unwrap();
        assert_eq!(gateway_id.value, OutputValue::Known("gw-1".into()));
    }
}
