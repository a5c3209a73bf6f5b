use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackError};

use super::stack::TeardownPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Network,
    ServiceEndpoint,
    SecurityBoundary,
    Identity,
    SecretStore,
    LogSink,
    Runtime,
    Endpoint,
    Gateway,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "Network",
            Self::ServiceEndpoint => "ServiceEndpoint",
            Self::SecurityBoundary => "SecurityBoundary",
            Self::Identity => "Identity",
            Self::SecretStore => "SecretStore",
            Self::LogSink => "LogSink",
            Self::Runtime => "Runtime",
            Self::Endpoint => "Endpoint",
            Self::Gateway => "Gateway",
        }
    }

    /// Attributes published as stack outputs once the resource exists.
    pub fn exported_attributes(&self) -> &'static [Attribute] {
        match self {
            Self::Network => &[Attribute::NetworkId],
            Self::ServiceEndpoint => &[],
            Self::SecurityBoundary => &[Attribute::GroupId],
            Self::Identity => &[Attribute::RoleArn],
            Self::SecretStore => &[Attribute::SecretArn],
            Self::LogSink => &[Attribute::LogGroupName],
            Self::Runtime => &[Attribute::RuntimeArn, Attribute::RuntimeId],
            Self::Endpoint => &[Attribute::EndpointArn],
            Self::Gateway => &[
                Attribute::GatewayArn,
                Attribute::GatewayId,
                Attribute::GatewayUrl,
            ],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An attribute of a resource that is only known after provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attribute {
    NetworkId,
    PrivateSubnetIds,
    GroupId,
    RoleArn,
    SecretArn,
    LogGroupName,
    RuntimeId,
    RuntimeArn,
    EndpointArn,
    GatewayArn,
    GatewayId,
    GatewayUrl,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkId => "NetworkId",
            Self::PrivateSubnetIds => "PrivateSubnetIds",
            Self::GroupId => "GroupId",
            Self::RoleArn => "RoleArn",
            Self::SecretArn => "SecretArn",
            Self::LogGroupName => "LogGroupName",
            Self::RuntimeId => "RuntimeId",
            Self::RuntimeArn => "RuntimeArn",
            Self::EndpointArn => "EndpointArn",
            Self::GatewayArn => "GatewayArn",
            Self::GatewayId => "GatewayId",
            Self::GatewayUrl => "GatewayUrl",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LogicalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LogicalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PartialEq<str> for LogicalId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for LogicalId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Convert a stack or agent name into an alphanumeric PascalCase fragment.
/// `my-agent_v2` becomes `MyAgentV2`.
pub fn pascal_case(value: &str) -> String {
    value
        .split(['-', '_'])
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn stack_logical_id(stack: &str, kind: ResourceKind) -> LogicalId {
    LogicalId(format!("{}{}", pascal_case(stack), kind.as_str()))
}

pub fn agent_logical_id(stack: &str, agent: &str, kind: ResourceKind) -> LogicalId {
    LogicalId(format!(
        "{}{}{}",
        pascal_case(stack),
        pascal_case(agent),
        kind.as_str()
    ))
}

pub fn service_endpoint_logical_id(stack: &str, service: ManagedService) -> LogicalId {
    LogicalId(format!(
        "{}Network{}Endpoint",
        pascal_case(stack),
        service.id_fragment()
    ))
}

/// Every stack-level logical id a stack with this name could ever produce.
pub fn reserved_stack_logical_ids(stack: &str) -> Vec<LogicalId> {
    let mut ids: Vec<LogicalId> = [
        ResourceKind::Network,
        ResourceKind::SecurityBoundary,
        ResourceKind::Identity,
        ResourceKind::SecretStore,
        ResourceKind::LogSink,
        ResourceKind::Gateway,
    ]
    .into_iter()
    .map(|kind| stack_logical_id(stack, kind))
    .collect();
    ids.extend(
        ManagedService::ALL
            .into_iter()
            .map(|service| service_endpoint_logical_id(stack, service)),
    );
    ids
}

/// Managed services reachable through private endpoints of a created network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagedService {
    Bedrock,
    BedrockRuntime,
    SecretsManager,
    Logs,
    EcrApi,
    EcrDkr,
    S3,
}

impl ManagedService {
    pub const ALL: [ManagedService; 7] = [
        Self::Bedrock,
        Self::BedrockRuntime,
        Self::SecretsManager,
        Self::Logs,
        Self::EcrApi,
        Self::EcrDkr,
        Self::S3,
    ];

    pub fn id_fragment(&self) -> &'static str {
        match self {
            Self::Bedrock => "Bedrock",
            Self::BedrockRuntime => "BedrockRuntime",
            Self::SecretsManager => "SecretsManager",
            Self::Logs => "Logs",
            Self::EcrApi => "EcrApi",
            Self::EcrDkr => "EcrDkr",
            Self::S3 => "S3",
        }
    }

    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Bedrock => "bedrock",
            Self::BedrockRuntime => "bedrock-runtime",
            Self::SecretsManager => "secretsmanager",
            Self::Logs => "logs",
            Self::EcrApi => "ecr.api",
            Self::EcrDkr => "ecr.dkr",
            Self::S3 => "s3",
        }
    }

    /// S3 is served through a gateway endpoint, everything else through an interface.
    pub fn endpoint_type(&self) -> &'static str {
        match self {
            Self::S3 => "Gateway",
            _ => "Interface",
        }
    }
}

/// Symbolic reference to an attribute of another node in the same graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefToken {
    pub kind: ResourceKind,
    pub logical_id: LogicalId,
    pub attribute: Attribute,
}

impl RefToken {
    pub fn to(node: &ResourceNode, attribute: Attribute) -> Self {
        Self {
            kind: node.kind,
            logical_id: node.logical_id.clone(),
            attribute,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefEnvelope {
    #[serde(rename = "$ref")]
    pub target: RefToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Ref(RefEnvelope),
    String(String),
    Integer(i64),
    Bool(bool),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

pub type Properties = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    pub fn reference(token: RefToken) -> Self {
        Self::Ref(RefEnvelope { target: token })
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_ref_token(&self) -> Option<&RefToken> {
        match self {
            Self::Ref(envelope) => Some(&envelope.target),
            _ => None,
        }
    }

    /// Collect every reference token nested anywhere in this value.
    pub fn collect_refs<'a>(&'a self, out: &mut Vec<&'a RefToken>) {
        match self {
            Self::Ref(envelope) => out.push(&envelope.target),
            Self::List(items) => items.iter().for_each(|v| v.collect_refs(out)),
            Self::Map(map) => map.values().for_each(|v| v.collect_refs(out)),
            Self::String(_) | Self::Integer(_) | Self::Bool(_) => {}
        }
    }

    /// Stable textual key used to order values that may be references.
    pub fn sort_key(&self) -> String {
        match self {
            Self::Ref(envelope) => format!(
                "ref:{}.{}",
                envelope.target.logical_id, envelope.target.attribute
            ),
            Self::String(s) => s.clone(),
            other => serde_json::to_string(other).unwrap_or_default(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        Self::String(value.clone())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<RefToken> for PropertyValue {
    fn from(value: RefToken) -> Self {
        Self::reference(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<&BTreeMap<String, String>> for PropertyValue {
    fn from(map: &BTreeMap<String, String>) -> Self {
        Self::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), PropertyValue::from(v)))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// The provisioning engine creates and owns the resource.
    Create,
    /// The resource already exists; the node only records its identifiers.
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub logical_id: LogicalId,
    pub mode: NodeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub properties: Properties,
    pub depends_on: BTreeSet<LogicalId>,
    pub teardown: TeardownPolicy,
}

impl ResourceNode {
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn refs(&self) -> Vec<&RefToken> {
        let mut out = Vec::new();
        for value in self.properties.values() {
            value.collect_refs(&mut out);
        }
        out
    }

    pub fn is_reference(&self) -> bool {
        self.mode == NodeMode::Reference
    }
}

/// Ordered output of the builder. Nodes appear after everything they depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGraph {
    pub stack_name: String,
    pub nodes: Vec<ResourceNode>,
}

impl ResourceGraph {
    pub fn get(&self, logical_id: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.logical_id == *logical_id)
    }

    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn first_of_kind(&self, kind: ResourceKind) -> Option<&ResourceNode> {
        self.of_kind(kind).next()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Verify uniqueness, ordering and reference coverage of the whole graph.
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen: HashSet<&LogicalId> = HashSet::new();
        for node in &self.nodes {
            for dep in &node.depends_on {
                if !seen.contains(dep) {
                    return Err(StackError::InvariantViolation(format!(
                        "{} depends on {dep}, which is not emitted before it",
                        node.logical_id
                    )));
                }
            }
            for token in node.refs() {
                if !node.depends_on.contains(&token.logical_id) {
                    return Err(StackError::InvariantViolation(format!(
                        "{} references {}.{} without depending on it",
                        node.logical_id, token.logical_id, token.attribute
                    )));
                }
            }
            if !seen.insert(&node.logical_id) {
                return Err(StackError::InvariantViolation(format!(
                    "duplicate logical id {}",
                    node.logical_id
                )));
            }
        }
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Compare against a previously built graph.
    pub fn diff(&self, previous: &ResourceGraph) -> GraphDiff {
        let mut diff = GraphDiff::default();
        for node in &self.nodes {
            match previous.get(node.logical_id.as_str()) {
                None => diff.added.push(node.logical_id.clone()),
                Some(old) if old != node => diff.changed.push(node.logical_id.clone()),
                Some(_) => {}
            }
        }
        for old in &previous.nodes {
            if self.get(old.logical_id.as_str()).is_none() {
                diff.removed.push(old.logical_id.clone());
            }
        }
        diff
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphDiff {
    pub added: Vec<LogicalId>,
    pub removed: Vec<LogicalId>,
    pub changed: Vec<LogicalId>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Log retention tiers supported by the log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RetentionTier {
    Days(u32),
    Unlimited,
}

impl RetentionTier {
    pub const SUPPORTED_DAYS: [u32; 7] = [1, 7, 14, 30, 90, 180, 365];

    /// Smallest supported tier that keeps logs at least `requested` days.
    /// Returns `None` for non-positive requests.
    pub fn round_up(requested: i64) -> Option<Self> {
        if requested <= 0 {
            return None;
        }
        Some(
            Self::SUPPORTED_DAYS
                .into_iter()
                .find(|&tier| i64::from(tier) >= requested)
                .map(Self::Days)
                .unwrap_or(Self::Unlimited),
        )
    }

    pub fn to_property(&self) -> PropertyValue {
        match self {
            Self::Days(days) => PropertyValue::from(*days),
            Self::Unlimited => PropertyValue::from("unlimited"),
        }
    }
}

impl fmt::Display for RetentionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Days(days) => write!(f, "{days}"),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StatementKind {
    ModelInvoke,
    LogWrite,
    SecretRead,
    RegistryPull,
    ManagedPolicy,
}

impl StatementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelInvoke => "model-invoke",
            Self::LogWrite => "log-write",
            Self::SecretRead => "secret-read",
            Self::RegistryPull => "registry-pull",
            Self::ManagedPolicy => "managed-policy",
        }
    }
}

/// One allow-rule granted to the stack identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityStatement {
    pub kind: StatementKind,
    pub actions: Vec<String>,
    pub resource: PropertyValue,
}

impl CapabilityStatement {
    pub fn new(kind: StatementKind, actions: &[&str], resource: impl Into<PropertyValue>) -> Self {
        Self {
            kind,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resource: resource.into(),
        }
    }

    pub fn sort_key(&self) -> (StatementKind, String) {
        (self.kind, self.resource.sort_key())
    }

    pub fn to_property(&self) -> PropertyValue {
        let mut map = BTreeMap::new();
        map.insert("Kind".to_string(), PropertyValue::from(self.kind.as_str()));
        map.insert("Effect".to_string(), PropertyValue::from("Allow"));
        map.insert(
            "Actions".to_string(),
            PropertyValue::from(self.actions.clone()),
        );
        map.insert("Resource".to_string(), self.resource.clone());
        PropertyValue::Map(map)
    }
}
