use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, StackError};
use crate::models::graph::{
    Attribute, NodeMode, PropertyValue, RefToken, ResourceGraph, ResourceKind, ResourceNode,
};
use crate::models::stack::{StackSpec, TeardownPolicy};
use crate::services::network_layout;

const FORMAT_VERSION: &str = "2010-09-09";
const POLICY_VERSION: &str = "2012-10-17";

/// A CloudFormation template rendered from a resource graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, TemplateParameter>,
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_echo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    pub description: String,
    pub value: Value,
}

impl Template {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)? + "\n")
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

pub fn resource_type(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Network => "AWS::EC2::VPC",
        ResourceKind::ServiceEndpoint => "AWS::EC2::VPCEndpoint",
        ResourceKind::SecurityBoundary => "AWS::EC2::SecurityGroup",
        ResourceKind::Identity => "AWS::IAM::Role",
        ResourceKind::SecretStore => "AWS::SecretsManager::Secret",
        ResourceKind::LogSink => "AWS::Logs::LogGroup",
        ResourceKind::Runtime => "AWS::BedrockAgentCore::Runtime",
        ResourceKind::Endpoint => "AWS::BedrockAgentCore::RuntimeEndpoint",
        ResourceKind::Gateway => "AWS::BedrockAgentCore::Gateway",
    }
}

/// Output key under which an attribute of a created node is exported.
pub fn output_key(logical_id: &str, attribute: Attribute) -> String {
    format!("{logical_id}{attribute}")
}

/// NoEcho parameter carrying the JSON secret string of a created secret store.
pub fn secret_string_parameter(store: &str) -> String {
    format!("{store}SecretString")
}

/// Values for the parameters `render` declares. The secret store receives
/// the configured `secrets.values` as one JSON object.
pub fn parameter_values(graph: &ResourceGraph, spec: &StackSpec) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    let store = graph
        .of_kind(ResourceKind::SecretStore)
        .find(|n| n.mode == NodeMode::Create);
    if let (Some(store), Some(secrets)) = (store, &spec.secrets) {
        values.insert(
            secret_string_parameter(store.logical_id.as_str()),
            serde_json::to_string(&secrets.values)?,
        );
    }
    Ok(values)
}

/// Translate a resource graph into a template.
///
/// Only created nodes become resources. References to existing resources are
/// replaced by the literal identifiers recorded on their reference nodes.
pub fn render(graph: &ResourceGraph, spec: &StackSpec) -> Result<Template> {
    let resolver = Resolver { graph };
    let mut resources = BTreeMap::new();
    let mut outputs = BTreeMap::new();
    let mut shaped = Shaped::default();

    for node in graph.nodes.iter().filter(|n| n.mode == NodeMode::Create) {
        let properties = resolver.properties(node)?;
        let depends_on = node
            .depends_on
            .iter()
            .filter(|dep| {
                graph
                    .get(dep.as_str())
                    .is_some_and(|d| d.mode == NodeMode::Create)
            })
            .map(|dep| dep.to_string())
            .collect();
        let policy = matches!(node.kind, ResourceKind::SecretStore | ResourceKind::LogSink)
            .then(|| deletion_policy(node.teardown).to_string());

        let properties = shape(node, properties, &resolver, &mut shaped)?;
        resources.insert(
            node.logical_id.to_string(),
            TemplateResource {
                resource_type: resource_type(node.kind).to_string(),
                properties,
                depends_on,
                deletion_policy: policy,
            },
        );

        for attribute in node.kind.exported_attributes() {
            let token = RefToken::to(node, *attribute);
            outputs.insert(
                output_key(node.logical_id.as_str(), *attribute),
                TemplateOutput {
                    description: format!("{} of {}", attribute, node.logical_id),
                    value: resolver.resolve(&token)?,
                },
            );
        }
    }

    for (id, resource) in shaped.extra {
        if resources.insert(id.clone(), resource).is_some() {
            return Err(StackError::InvariantViolation(format!(
                "duplicate template resource {id}"
            )));
        }
    }

    let description = if spec.description.is_empty() {
        format!("AgentCore stack {}", spec.name)
    } else {
        spec.description.clone()
    };

    Ok(Template {
        format_version: FORMAT_VERSION.to_string(),
        description,
        parameters: shaped.parameters.into_iter().collect(),
        resources,
        outputs,
    })
}

fn deletion_policy(teardown: TeardownPolicy) -> &'static str {
    match teardown {
        TeardownPolicy::Destroy => "Delete",
        TeardownPolicy::Retain => "Retain",
    }
}

struct Resolver<'a> {
    graph: &'a ResourceGraph,
}

impl Resolver<'_> {
    fn properties(&self, node: &ResourceNode) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (key, value) in &node.properties {
            out.insert(key.clone(), self.value(value)?);
        }
        Ok(out)
    }

    fn value(&self, value: &PropertyValue) -> Result<Value> {
        Ok(match value {
            PropertyValue::Ref(envelope) => self.resolve(&envelope.target)?,
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Integer(i) => json!(i),
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            PropertyValue::Map(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.value(v)?);
                }
                Value::Object(out)
            }
        })
    }

    fn resolve(&self, token: &RefToken) -> Result<Value> {
        let target = self.graph.get(token.logical_id.as_str()).ok_or_else(|| {
            StackError::InvariantViolation(format!(
                "reference to unknown node {}",
                token.logical_id
            ))
        })?;

        if target.mode == NodeMode::Reference {
            let literal = target.property(token.attribute.as_str()).ok_or_else(|| {
                StackError::InvariantViolation(format!(
                    "existing resource {} does not record {}",
                    target.logical_id, token.attribute
                ))
            })?;
            return self.value(literal);
        }

        let id = target.logical_id.as_str();
        let get_att = |name: &str| json!({ "Fn::GetAtt": [id, name] });
        Ok(match (target.kind, token.attribute) {
            (ResourceKind::Network, Attribute::NetworkId)
            | (ResourceKind::SecretStore, Attribute::SecretArn)
            | (ResourceKind::LogSink, Attribute::LogGroupName) => json!({ "Ref": id }),
            (ResourceKind::Network, Attribute::PrivateSubnetIds) => {
                network_layout::private_subnet_refs(id, zone_count(target)?)
            }
            (ResourceKind::SecurityBoundary, Attribute::GroupId) => get_att("GroupId"),
            (ResourceKind::Identity, Attribute::RoleArn) => get_att("Arn"),
            (ResourceKind::Runtime, Attribute::RuntimeId) => get_att("AgentRuntimeId"),
            (ResourceKind::Runtime, Attribute::RuntimeArn) => get_att("AgentRuntimeArn"),
            (ResourceKind::Endpoint, Attribute::EndpointArn) => {
                get_att("AgentRuntimeEndpointArn")
            }
            (ResourceKind::Gateway, Attribute::GatewayArn) => get_att("GatewayArn"),
            (ResourceKind::Gateway, Attribute::GatewayId) => get_att("GatewayIdentifier"),
            (ResourceKind::Gateway, Attribute::GatewayUrl) => get_att("GatewayUrl"),
            (kind, attribute) => {
                return Err(StackError::InvariantViolation(format!(
                    "{kind} {id} has no attribute {attribute}"
                )))
            }
        })
    }
}

fn zone_count(network: &ResourceNode) -> Result<u32> {
    network
        .property("AvailabilityZoneCount")
        .and_then(PropertyValue::as_i64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            StackError::InvariantViolation(format!(
                "network {} does not record its availability zone count",
                network.logical_id
            ))
        })
}

/// Resources and parameters a node contributes beyond its own resource.
#[derive(Default)]
struct Shaped {
    extra: Vec<(String, TemplateResource)>,
    parameters: Vec<(String, TemplateParameter)>,
}

/// Reshape generic node properties into the property layout of the target
/// resource type.
fn shape(
    node: &ResourceNode,
    mut props: Map<String, Value>,
    resolver: &Resolver<'_>,
    shaped: &mut Shaped,
) -> Result<Map<String, Value>> {
    if let Some(tags) = props.remove("Tags") {
        props.insert("Tags".into(), tag_list(tags));
    }

    match node.kind {
        ResourceKind::Network => {
            let zones = zone_count(node)?;
            props.remove("AvailabilityZoneCount");
            props.remove("EnableServiceEndpoints");
            props.insert("EnableDnsSupport".into(), Value::Bool(true));
            props.insert("EnableDnsHostnames".into(), Value::Bool(true));
            let cidr_block = props.get("CidrBlock").cloned().unwrap_or(Value::Null);
            shaped.extra.extend(network_layout::resources(
                node.logical_id.as_str(),
                &cidr_block,
                zones,
                props.get("Tags"),
            ));
        }
        ResourceKind::ServiceEndpoint => {
            if let Some(Value::String(service)) = props.remove("ServiceName") {
                props.insert(
                    "ServiceName".into(),
                    json!({ "Fn::Sub": format!("com.amazonaws.${{AWS::Region}}.{service}") }),
                );
            }
            rename(&mut props, "NetworkId", "VpcId");
            rename(&mut props, "EndpointType", "VpcEndpointType");
            if props.get("VpcEndpointType").and_then(Value::as_str) == Some("Gateway") {
                if let Some(network) = node
                    .property("NetworkId")
                    .and_then(PropertyValue::as_ref_token)
                {
                    props.insert(
                        "RouteTableIds".into(),
                        network_layout::route_table_refs(network.logical_id.as_str()),
                    );
                }
            } else if let Some(boundary) =
                resolver.graph.first_of_kind(ResourceKind::SecurityBoundary)
            {
                let group = resolver.resolve(&RefToken::to(boundary, Attribute::GroupId))?;
                props.insert("SecurityGroupIds".into(), Value::Array(vec![group]));
            }
        }
        ResourceKind::SecurityBoundary => {
            rename(&mut props, "EgressRules", "SecurityGroupEgress");
            if let Some(Value::Array(rules)) = props.remove("IngressRules") {
                let group = resolver.resolve(&RefToken::to(node, Attribute::GroupId))?;
                for (i, rule) in rules.into_iter().enumerate() {
                    let mut rule = match rule {
                        Value::Object(map) => map,
                        _ => Map::new(),
                    };
                    rule.remove("SourceSecurityGroup");
                    rule.insert("GroupId".into(), group.clone());
                    rule.insert("SourceSecurityGroupId".into(), group.clone());
                    let suffix = if i == 0 { String::new() } else { i.to_string() };
                    shaped.extra.push((
                        format!("{}SelfIngress{suffix}", node.logical_id),
                        TemplateResource {
                            resource_type: "AWS::EC2::SecurityGroupIngress".into(),
                            properties: rule,
                            depends_on: Vec::new(),
                            deletion_policy: None,
                        },
                    ));
                }
            }
        }
        ResourceKind::Identity => {
            let principals = props.remove("Principals").unwrap_or(Value::Array(Vec::new()));
            props.insert(
                "AssumeRolePolicyDocument".into(),
                json!({
                    "Version": POLICY_VERSION,
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": principals },
                        "Action": "sts:AssumeRole",
                    }],
                }),
            );
            let mut inline = Vec::new();
            let mut managed = Vec::new();
            if let Some(Value::Array(statements)) = props.remove("Statements") {
                for statement in statements {
                    let kind = statement.get("Kind").and_then(Value::as_str).unwrap_or_default();
                    let resource = statement.get("Resource").cloned().unwrap_or(Value::Null);
                    if kind == "managed-policy" {
                        managed.push(resource);
                    } else {
                        inline.push(json!({
                            "Effect": "Allow",
                            "Action": statement.get("Actions").cloned().unwrap_or(Value::Null),
                            "Resource": resource,
                        }));
                    }
                }
            }
            props.insert(
                "Policies".into(),
                json!([{
                    "PolicyName": format!("{}-capabilities", node.logical_id),
                    "PolicyDocument": { "Version": POLICY_VERSION, "Statement": inline },
                }]),
            );
            if !managed.is_empty() {
                props.insert("ManagedPolicyArns".into(), Value::Array(managed));
            }
        }
        ResourceKind::LogSink => {
            if props.get("RetentionInDays").is_some_and(Value::is_string) {
                props.remove("RetentionInDays");
            }
        }
        ResourceKind::Runtime => {
            // Sizing is managed by the service.
            props.remove("MemoryMB");
            if let Some(uri) = props.remove("ContainerUri") {
                props.insert(
                    "AgentRuntimeArtifact".into(),
                    json!({ "ContainerConfiguration": { "ContainerUri": uri } }),
                );
            }
            if let Some(timeout) = props.remove("TimeoutSeconds") {
                props.insert(
                    "LifecycleConfiguration".into(),
                    json!({ "MaxLifetime": timeout }),
                );
            }
            if let Some(Value::Object(mut network)) = props.remove("NetworkConfiguration") {
                let subnets = network.remove("Subnets");
                let groups = network.remove("SecurityGroups");
                if subnets.is_some() || groups.is_some() {
                    network.insert(
                        "NetworkModeConfig".into(),
                        json!({ "Subnets": subnets, "SecurityGroups": groups }),
                    );
                }
                props.insert("NetworkConfiguration".into(), Value::Object(network));
            }
            // AgentCore takes tags as a plain map.
            if let Some(tags) = node.property("Tags") {
                props.insert("Tags".into(), resolver.value(tags)?);
            }
        }
        ResourceKind::Endpoint | ResourceKind::Gateway => {
            if let Some(tags) = node.property("Tags") {
                props.insert("Tags".into(), resolver.value(tags)?);
            }
        }
        ResourceKind::SecretStore => {
            props.remove("SecretKeys");
            let parameter = secret_string_parameter(node.logical_id.as_str());
            props.insert("SecretString".into(), json!({ "Ref": parameter }));
            shaped.parameters.push((
                parameter,
                TemplateParameter {
                    parameter_type: "String".into(),
                    no_echo: true,
                    description: Some(format!("JSON secret string of {}", node.logical_id)),
                },
            ));
        }
    }
    Ok(props)
}

fn rename(props: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = props.remove(from) {
        props.insert(to.to_string(), value);
    }
}

fn tag_list(tags: Value) -> Value {
    match tags {
        Value::Object(map) => Value::Array(
            map.into_iter()
                .map(|(key, value)| json!({ "Key": key, "Value": value }))
                .collect(),
        ),
        other => other,
    }
}
