use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, StackError};
use crate::services::network_layout;
use crate::models::graph::{agent_logical_id, reserved_stack_logical_ids, ResourceKind};
use crate::models::stack::{
    AgentDocument, AgentSpec, GatewaySpec, IdentitySpec, NetworkDocument, NetworkSpec,
    ObservabilityProvider, ObservabilitySpec, Protocol, SecretsSpec, StackDocument, StackSpec,
    TeardownPolicy, AGENT_NAME_ENV, DEFAULT_AGENT_ENV, DEFAULT_AVAILABILITY_ZONE_COUNT,
    DEFAULT_CIDR_BLOCK, DEFAULT_LOG_RETENTION_DAYS, DEFAULT_MEMORY_MB, DEFAULT_TIMEOUT_SECONDS,
    MAX_AVAILABILITY_ZONE_COUNT, MAX_TIMEOUT_SECONDS, VALID_MEMORY_MB,
};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap());

/// Every field path present in the document that the model does not know.
pub fn unknown_fields(doc: &StackDocument) -> Vec<String> {
    let mut paths: Vec<String> = doc.unknown.keys().cloned().collect();
    for (i, agent) in doc.agents.iter().enumerate() {
        paths.extend(agent.unknown.keys().map(|k| format!("agents[{i}].{k}")));
    }
    let sections = [
        ("network", doc.network.as_ref().map(|s| &s.unknown)),
        ("secrets", doc.secrets.as_ref().map(|s| &s.unknown)),
        ("observability", doc.observability.as_ref().map(|s| &s.unknown)),
        ("identity", doc.identity.as_ref().map(|s| &s.unknown)),
        ("gateway", doc.gateway.as_ref().map(|s| &s.unknown)),
    ];
    for (section, unknown) in sections {
        if let Some(unknown) = unknown {
            paths.extend(unknown.keys().map(|k| format!("{section}.{k}")));
        }
    }
    paths
}

/// Fill in every default the document leaves out. Agent defaults are applied
/// before stack-level ones.
pub fn apply_defaults(doc: &mut StackDocument) {
    for agent in &mut doc.agents {
        agent.memory_mb.get_or_insert(i64::from(DEFAULT_MEMORY_MB));
        agent
            .timeout_seconds
            .get_or_insert(i64::from(DEFAULT_TIMEOUT_SECONDS));
        agent
            .protocol
            .get_or_insert_with(|| Protocol::Http.as_str().to_string());
    }

    if let Some(network) = doc.network.as_mut() {
        if network.external_network_id.is_none() {
            network
                .cidr_block
                .get_or_insert_with(|| DEFAULT_CIDR_BLOCK.to_string());
            network
                .availability_zone_count
                .get_or_insert(i64::from(DEFAULT_AVAILABILITY_ZONE_COUNT));
            network.enable_service_endpoints.get_or_insert(true);
        }
    }

    doc.teardown_policy.get_or_insert_with(|| "destroy".to_string());

    if let Some(observability) = doc.observability.as_mut() {
        observability
            .provider
            .get_or_insert_with(|| ObservabilityProvider::Opik.as_str().to_string());
        observability.enable_logging.get_or_insert(true);
        observability
            .log_retention_days
            .get_or_insert(DEFAULT_LOG_RETENTION_DAYS);
    }

    if let Some(gateway) = doc.gateway.as_mut() {
        if gateway.name.is_none() {
            let stack = doc.name.clone().unwrap_or_default();
            gateway.name = Some(format!("{stack}-gateway"));
        }
    }
}

/// Validate a defaulted document and convert it into a [`StackSpec`].
/// The first violation wins.
pub fn resolve(doc: StackDocument) -> Result<StackSpec> {
    let name = required_name(doc.name.as_deref(), "name")?;

    if doc.agents.is_empty() {
        return Err(StackError::config("agents", "at least one agent is required"));
    }

    let mut agents = Vec::with_capacity(doc.agents.len());
    let mut seen = HashSet::new();
    for (i, raw) in doc.agents.iter().enumerate() {
        let agent = resolve_agent(i, raw)?;
        if !seen.insert(agent.name.clone()) {
            return Err(StackError::config(
                format!("agents[{i}].name"),
                format!("duplicate agent name '{}'", agent.name),
            ));
        }
        agents.push(agent);
    }

    let defaults: Vec<usize> = agents
        .iter()
        .enumerate()
        .filter(|(_, a)| a.is_default)
        .map(|(i, _)| i)
        .collect();
    if defaults.len() > 1 {
        return Err(StackError::config(
            format!("agents[{}].isDefault", defaults[1]),
            format!(
                "multiple default agents: '{}' and '{}'",
                agents[defaults[0]].name,
                agents[defaults[1]].name
            ),
        ));
    }

    check_logical_id_collisions(&name, &agents)?;

    let network = doc.network.as_ref().map(resolve_network).transpose()?;

    let secrets = doc.secrets.map(|s| SecretsSpec {
        create_secrets: s.create_secrets.unwrap_or(false),
        secret_name: s.secret_name,
        values: s.values,
    });
    if let Some(secret_name) = secrets.as_ref().and_then(|s| s.secret_name.as_deref()) {
        if secret_name.trim().is_empty() {
            return Err(StackError::config(
                "secrets.secretName",
                "must not be empty when set",
            ));
        }
    }

    let observability = match doc.observability {
        Some(o) => {
            let provider_name = o.provider.unwrap_or_default();
            let provider = ObservabilityProvider::parse(&provider_name).ok_or_else(|| {
                StackError::config(
                    "observability.provider",
                    format!(
                        "unknown provider '{provider_name}' (expected one of: opik, langfuse, phoenix, cloudwatch)"
                    ),
                )
            })?;
            let log_retention_days = o.log_retention_days.unwrap_or(DEFAULT_LOG_RETENTION_DAYS);
            if log_retention_days <= 0 {
                return Err(StackError::config(
                    "observability.logRetentionDays",
                    format!("must be positive, got {log_retention_days}"),
                ));
            }
            Some(ObservabilitySpec {
                provider,
                project: o.project,
                endpoint: o.endpoint,
                enable_logging: o.enable_logging.unwrap_or(true),
                log_retention_days,
            })
        }
        None => None,
    };

    let identity = match doc.identity {
        None => IdentitySpec::default(),
        Some(i) => match i.role_arn {
            Some(role_arn) => {
                if i.enable_model_access.is_some()
                    || i.model_ids.is_some()
                    || i.additional_policies.is_some()
                    || i.permissions_boundary.is_some()
                {
                    return Err(StackError::config(
                        "identity.roleArn",
                        "an existing role cannot be combined with role creation settings",
                    ));
                }
                if role_arn.trim().is_empty() {
                    return Err(StackError::config("identity.roleArn", "must not be empty"));
                }
                IdentitySpec::Reference { role_arn }
            }
            None => IdentitySpec::Create {
                enable_model_access: i.enable_model_access.unwrap_or(true),
                model_ids: i.model_ids.unwrap_or_default(),
                additional_policies: i.additional_policies.unwrap_or_default(),
                permissions_boundary: i.permissions_boundary,
            },
        },
    };

    let gateway = doc
        .gateway
        .map(|g| -> Result<GatewaySpec> {
            let protocol = g
                .protocol
                .as_deref()
                .map(|p| parse_protocol(p, "gateway.protocol"))
                .transpose()?;
            Ok(GatewaySpec {
                enabled: g.enabled.unwrap_or(false),
                name: g.name.unwrap_or_else(|| format!("{name}-gateway")),
                description: g.description,
                protocol,
            })
        })
        .transpose()?;

    let teardown_policy = match doc.teardown_policy.as_deref() {
        None => TeardownPolicy::default(),
        Some(raw) => TeardownPolicy::parse(raw).ok_or_else(|| {
            StackError::config(
                "teardownPolicy",
                format!("expected 'destroy' or 'retain', got '{raw}'"),
            )
        })?,
    };

    Ok(StackSpec {
        name,
        description: doc.description.unwrap_or_default(),
        agents,
        network,
        secrets,
        observability,
        identity,
        gateway,
        tags: doc.tags,
        teardown_policy,
    })
}

/// Mark the first agent as default when none was chosen explicitly.
pub fn assign_default_agent(spec: &mut StackSpec) {
    if spec.agents.iter().any(|a| a.is_default) {
        return;
    }
    if let Some(first) = spec.agents.first_mut() {
        debug!(agent = %first.name, "no default agent configured, using first agent");
        first.is_default = true;
    }
}

fn required_name(value: Option<&str>, path: &str) -> Result<String> {
    let value = value.unwrap_or_default();
    if value.is_empty() {
        return Err(StackError::config(path, "is required"));
    }
    if !NAME_RE.is_match(value) {
        return Err(StackError::config(
            path,
            format!("'{value}' must start with a letter and contain only letters, digits, '-' or '_'"),
        ));
    }
    Ok(value.to_string())
}

fn parse_protocol(value: &str, path: &str) -> Result<Protocol> {
    Protocol::parse(value).ok_or_else(|| {
        StackError::config(
            path,
            format!("unknown protocol '{value}' (expected HTTP, MCP or A2A)"),
        )
    })
}

fn resolve_agent(index: usize, raw: &AgentDocument) -> Result<AgentSpec> {
    let path = |field: &str| format!("agents[{index}].{field}");

    let name = required_name(raw.name.as_deref(), &path("name"))?;

    let container_image = raw.container_image.clone().unwrap_or_default();
    if container_image.trim().is_empty() {
        return Err(StackError::config(path("containerImage"), "is required"));
    }

    let memory = raw.memory_mb.unwrap_or(i64::from(DEFAULT_MEMORY_MB));
    let memory_mb = u32::try_from(memory)
        .ok()
        .filter(|m| VALID_MEMORY_MB.contains(m))
        .ok_or_else(|| {
            StackError::config(
                path("memoryMB"),
                format!("{memory} is not one of {VALID_MEMORY_MB:?}"),
            )
        })?;

    let timeout = raw
        .timeout_seconds
        .unwrap_or(i64::from(DEFAULT_TIMEOUT_SECONDS));
    let timeout_seconds = u32::try_from(timeout)
        .ok()
        .filter(|t| (1..=MAX_TIMEOUT_SECONDS).contains(t))
        .ok_or_else(|| {
            StackError::config(
                path("timeoutSeconds"),
                format!("{timeout} is outside 1..={MAX_TIMEOUT_SECONDS}"),
            )
        })?;

    for key in raw.environment.keys() {
        if key.is_empty() {
            return Err(StackError::config(
                path("environment"),
                "variable names must not be empty",
            ));
        }
        if key == AGENT_NAME_ENV || key == DEFAULT_AGENT_ENV {
            return Err(StackError::config(
                format!("agents[{index}].environment.{key}"),
                "is reserved and set automatically",
            ));
        }
    }

    for (j, reference) in raw.secret_references.iter().enumerate() {
        if reference.trim().is_empty() {
            return Err(StackError::config(
                format!("agents[{index}].secretReferences[{j}]"),
                "must not be empty",
            ));
        }
    }

    let protocol = match raw.protocol.as_deref() {
        Some(p) => parse_protocol(p, &path("protocol"))?,
        None => Protocol::Http,
    };

    Ok(AgentSpec {
        name,
        description: raw.description.clone(),
        container_image,
        memory_mb,
        timeout_seconds,
        environment: raw.environment.clone(),
        secret_references: raw.secret_references.clone(),
        protocol,
        is_default: raw.is_default.unwrap_or(false),
    })
}

fn resolve_network(raw: &NetworkDocument) -> Result<NetworkSpec> {
    match &raw.external_network_id {
        Some(network_id) => {
            let conflicting = [
                ("network.cidrBlock", raw.cidr_block.is_some()),
                (
                    "network.availabilityZoneCount",
                    raw.availability_zone_count.is_some(),
                ),
                (
                    "network.enableServiceEndpoints",
                    raw.enable_service_endpoints.is_some(),
                ),
            ];
            if let Some((field, _)) = conflicting.iter().find(|(_, set)| *set) {
                return Err(StackError::config(
                    *field,
                    "cannot be combined with network.externalNetworkId",
                ));
            }
            if network_id.trim().is_empty() {
                return Err(StackError::config(
                    "network.externalNetworkId",
                    "must not be empty",
                ));
            }
            let subnet_ids = raw.subnet_ids.clone().unwrap_or_default();
            if subnet_ids.is_empty() {
                return Err(StackError::config(
                    "network.subnetIds",
                    "at least one subnet is required for an existing network",
                ));
            }
            Ok(NetworkSpec::Reference {
                network_id: network_id.clone(),
                subnet_ids,
                security_group_ids: raw.security_group_ids.clone().unwrap_or_default(),
            })
        }
        None => {
            if raw.subnet_ids.is_some() {
                return Err(StackError::config(
                    "network.subnetIds",
                    "requires network.externalNetworkId",
                ));
            }
            if raw.security_group_ids.is_some() {
                return Err(StackError::config(
                    "network.securityGroupIds",
                    "requires network.externalNetworkId",
                ));
            }
            let cidr_block = raw
                .cidr_block
                .clone()
                .unwrap_or_else(|| DEFAULT_CIDR_BLOCK.to_string());
            if !is_ipv4_cidr(&cidr_block) {
                return Err(StackError::config(
                    "network.cidrBlock",
                    format!("'{cidr_block}' is not an IPv4 CIDR block"),
                ));
            }
            let count = raw
                .availability_zone_count
                .unwrap_or(i64::from(DEFAULT_AVAILABILITY_ZONE_COUNT));
            let availability_zone_count = u32::try_from(count)
                .ok()
                .filter(|c| (1..=MAX_AVAILABILITY_ZONE_COUNT).contains(c))
                .ok_or_else(|| {
                    StackError::config(
                        "network.availabilityZoneCount",
                        format!("{count} is outside 1..={MAX_AVAILABILITY_ZONE_COUNT}"),
                    )
                })?;
            let max_prefix = network_layout::max_prefix_len(availability_zone_count);
            if cidr_prefix_len(&cidr_block).is_some_and(|p| p > max_prefix) {
                return Err(StackError::config(
                    "network.cidrBlock",
                    format!(
                        "'{cidr_block}' is too small for {} /24 subnets, use /{max_prefix} or larger",
                        2 * availability_zone_count
                    ),
                ));
            }
            Ok(NetworkSpec::Create {
                cidr_block,
                availability_zone_count,
                enable_service_endpoints: raw.enable_service_endpoints.unwrap_or(true),
            })
        }
    }
}

fn cidr_prefix_len(value: &str) -> Option<u32> {
    value.split_once('/').and_then(|(_, prefix)| prefix.parse().ok())
}

fn is_ipv4_cidr(value: &str) -> bool {
    let Some((addr, prefix)) = value.split_once('/') else {
        return false;
    };
    addr.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}

/// Agent-derived logical ids must not collide with each other or with any id
/// the stack itself may emit.
fn check_logical_id_collisions(stack: &str, agents: &[AgentSpec]) -> Result<()> {
    let mut taken: BTreeMap<String, String> = reserved_stack_logical_ids(stack)
        .into_iter()
        .map(|id| (id.to_string(), "stack resource".to_string()))
        .collect();
    for (i, agent) in agents.iter().enumerate() {
        for kind in [ResourceKind::Runtime, ResourceKind::Endpoint] {
            let id = agent_logical_id(stack, &agent.name, kind).to_string();
            if let Some(owner) = taken.get(&id) {
                return Err(StackError::config(
                    format!("agents[{i}].name"),
                    format!("logical id {id} collides with {owner}"),
                ));
            }
            taken.insert(id, format!("agent '{}'", agent.name));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(name: &str) -> AgentDocument {
        AgentDocument {
            name: Some(name.to_string()),
            container_image: Some(format!("registry/{name}:1")),
            ..Default::default()
        }
    }

    fn document(agents: Vec<AgentDocument>) -> StackDocument {
        StackDocument {
            name: Some("demo".into()),
            agents,
            ..Default::default()
        }
    }

    fn resolve_defaulted(mut doc: StackDocument) -> Result<StackSpec> {
        apply_defaults(&mut doc);
        resolve(doc)
    }

    fn config_path(err: StackError) -> String {
        match err {
            StackError::Config { path, .. } => path,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn agent_defaults_are_applied() {
        let spec = resolve_defaulted(document(vec![agent("worker")])).unwrap();
        let worker = &spec.agents[0];
        assert_eq!(worker.memory_mb, 512);
        assert_eq!(worker.timeout_seconds, 30);
        assert_eq!(worker.protocol, Protocol::Http);
        assert_eq!(spec.teardown_policy, TeardownPolicy::Destroy);
        assert_eq!(spec.identity, IdentitySpec::default());
    }

    #[test]
    fn memory_outside_enumeration_is_rejected() {
        for bad in [300, 1500, 0, -512] {
            let mut a = agent("worker");
            a.memory_mb = Some(bad);
            let err = resolve_defaulted(document(vec![a])).unwrap_err();
            assert_eq!(config_path(err), "agents[0].memoryMB");
        }
        for good in VALID_MEMORY_MB {
            let mut a = agent("worker");
            a.memory_mb = Some(i64::from(good));
            assert_eq!(
                resolve_defaulted(document(vec![a])).unwrap().agents[0].memory_mb,
                good
            );
        }
    }

    #[test]
    fn timeout_bounds_are_enforced() {
        for (value, ok) in [(0, false), (1, true), (900, true), (901, false)] {
            let mut a = agent("worker");
            a.timeout_seconds = Some(value);
            assert_eq!(resolve_defaulted(document(vec![a])).is_ok(), ok, "{value}");
        }
    }

    #[test]
    fn two_defaults_are_rejected() {
        let mut a = agent("a");
        a.is_default = Some(true);
        let mut b = agent("b");
        b.is_default = Some(true);
        let err = resolve_defaulted(document(vec![a, b])).unwrap_err();
        assert_eq!(config_path(err), "agents[1].isDefault");
    }

    #[test]
    fn first_agent_becomes_default() {
        let mut spec = resolve_defaulted(document(vec![agent("a"), agent("b")])).unwrap();
        assert!(spec.default_agent().is_none());
        assign_default_agent(&mut spec);
        assert_eq!(spec.default_agent().unwrap().name, "a");
    }

    #[test]
    fn explicit_default_is_kept() {
        let mut b = agent("b");
        b.is_default = Some(true);
        let mut spec = resolve_defaulted(document(vec![agent("a"), b])).unwrap();
        assign_default_agent(&mut spec);
        assert_eq!(spec.default_agent().unwrap().name, "b");
        assert!(!spec.agents[0].is_default);
    }

    #[test]
    fn duplicate_agent_names_are_rejected() {
        let err = resolve_defaulted(document(vec![agent("a"), agent("a")])).unwrap_err();
        assert_eq!(config_path(err), "agents[1].name");
    }

    #[test]
    fn empty_agent_list_is_rejected() {
        let err = resolve_defaulted(document(vec![])).unwrap_err();
        assert_eq!(config_path(err), "agents");
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut doc = document(vec![agent("worker")]);
        doc.name = Some("1demo".into());
        assert_eq!(config_path(resolve_defaulted(doc).unwrap_err()), "name");

        let err = resolve_defaulted(document(vec![agent("bad name")])).unwrap_err();
        assert_eq!(config_path(err), "agents[0].name");
    }

    #[test]
    fn external_network_with_cidr_is_rejected() {
        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            external_network_id: Some("vpc-123".into()),
            subnet_ids: Some(vec!["subnet-1".into()]),
            cidr_block: Some("10.1.0.0/16".into()),
            ..Default::default()
        });
        let err = resolve_defaulted(doc).unwrap_err();
        assert_eq!(config_path(err), "network.cidrBlock");
    }

    #[test]
    fn external_network_requires_subnets() {
        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            external_network_id: Some("vpc-123".into()),
            ..Default::default()
        });
        assert_eq!(
            config_path(resolve_defaulted(doc).unwrap_err()),
            "network.subnetIds"
        );
    }

    #[test]
    fn subnets_without_external_network_are_rejected() {
        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            subnet_ids: Some(vec!["subnet-1".into()]),
            ..Default::default()
        });
        assert_eq!(
            config_path(resolve_defaulted(doc).unwrap_err()),
            "network.subnetIds"
        );
    }

    #[test]
    fn created_network_gets_defaults() {
        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument::default());
        let spec = resolve_defaulted(doc).unwrap();
        assert_eq!(
            spec.network,
            Some(NetworkSpec::Create {
                cidr_block: "10.0.0.0/16".into(),
                availability_zone_count: 2,
                enable_service_endpoints: true,
            })
        );
    }

    #[test]
    fn malformed_cidr_and_zone_count_are_rejected() {
        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            cidr_block: Some("10.0.0.0".into()),
            ..Default::default()
        });
        assert_eq!(
            config_path(resolve_defaulted(doc).unwrap_err()),
            "network.cidrBlock"
        );

        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            availability_zone_count: Some(7),
            ..Default::default()
        });
        assert_eq!(
            config_path(resolve_defaulted(doc).unwrap_err()),
            "network.availabilityZoneCount"
        );
    }

    #[test]
    fn network_block_must_fit_every_subnet() {
        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            cidr_block: Some("10.0.0.0/23".into()),
            availability_zone_count: Some(2),
            ..Default::default()
        });
        let err = resolve_defaulted(doc).unwrap_err();
        assert!(err.to_string().contains("use /22 or larger"));
        assert_eq!(config_path(err), "network.cidrBlock");

        let mut doc = document(vec![agent("worker")]);
        doc.network = Some(NetworkDocument {
            cidr_block: Some("10.0.0.0/22".into()),
            availability_zone_count: Some(2),
            ..Default::default()
        });
        assert!(resolve_defaulted(doc).is_ok());
    }

    #[test]
    fn reserved_environment_keys_are_rejected() {
        let mut a = agent("worker");
        a.environment
            .insert(AGENT_NAME_ENV.to_string(), "spoofed".to_string());
        let err = resolve_defaulted(document(vec![a])).unwrap_err();
        assert_eq!(
            config_path(err),
            "agents[0].environment.AGENTCORE_AGENT_NAME"
        );
    }

    #[test]
    fn role_arn_with_creation_settings_is_rejected() {
        let mut doc = document(vec![agent("worker")]);
        doc.identity = Some(crate::models::stack::IdentityDocument {
            role_arn: Some("arn:aws:iam::123:role/x".into()),
            model_ids: Some(vec!["m".into()]),
            ..Default::default()
        });
        assert_eq!(
            config_path(resolve_defaulted(doc).unwrap_err()),
            "identity.roleArn"
        );
    }

    #[test]
    fn agent_logical_id_collision_is_rejected() {
        // DemoNetworkLogsEndpoint is the logs service endpoint id.
        let err = resolve_defaulted(document(vec![agent("network-logs")])).unwrap_err();
        assert_eq!(config_path(err), "agents[0].name");
    }

    #[test]
    fn agents_differing_only_in_separators_collide() {
        let err = resolve_defaulted(document(vec![agent("my-agent"), agent("my_agent")]))
            .unwrap_err();
        assert_eq!(config_path(err), "agents[1].name");
    }

    #[test]
    fn unknown_fields_are_reported_with_paths() {
        let mut doc = document(vec![agent("worker")]);
        doc.agents[0]
            .unknown
            .insert("memroyMB".into(), serde_json::json!(1024));
        doc.unknown.insert("extra".into(), serde_json::json!(true));
        assert_eq!(unknown_fields(&doc), vec!["extra", "agents[0].memroyMB"]);
    }

    #[test]
    fn non_positive_retention_is_rejected() {
        let mut doc = document(vec![agent("worker")]);
        doc.observability = Some(crate::models::stack::ObservabilityDocument {
            log_retention_days: Some(0),
            ..Default::default()
        });
        assert_eq!(
            config_path(resolve_defaulted(doc).unwrap_err()),
            "observability.logRetentionDays"
        );
    }

    #[test]
    fn gateway_protocol_is_parsed() {
        let mut doc = document(vec![agent("worker")]);
        doc.gateway = Some(crate::models::stack::GatewayDocument {
            enabled: Some(true),
            protocol: Some("MCP".into()),
            ..Default::default()
        });
        let spec = resolve_defaulted(doc).unwrap();
        let gateway = spec.gateway.unwrap();
        assert_eq!(gateway.name, "demo-gateway");
        assert_eq!(gateway.protocol, Some(Protocol::Mcp));
    }
}
