use std::path::Path;

use tracing::debug;

use crate::error::{Result, StackError};
use crate::models::stack::{
    AgentDocument, GatewayDocument, IdentityDocument, NetworkDocument, ObservabilityDocument,
    SecretsDocument, StackDocument, StackSpec,
};
use crate::services::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self::parse(&ext)
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(StackError::UnsupportedFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Reject fields the model does not know instead of ignoring them.
    pub strict: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

pub fn parse_document(raw: &[u8], format: ConfigFormat) -> Result<StackDocument> {
    let doc = match format {
        ConfigFormat::Json => serde_json::from_slice(raw)?,
        ConfigFormat::Yaml => serde_yaml::from_slice(raw)?,
    };
    Ok(doc)
}

/// Parse, default, validate and resolve a stack configuration.
pub fn load(raw: &[u8], format: ConfigFormat, options: &LoadOptions) -> Result<StackSpec> {
    let doc = parse_document(raw, format)?;

    let unknown = validation::unknown_fields(&doc);
    if options.strict {
        if let Some(path) = unknown.first() {
            return Err(StackError::config(path.clone(), "unknown field"));
        }
    } else {
        for path in &unknown {
            debug!(field = %path, "ignoring unknown config field");
        }
    }

    let spec = resolve_document(doc)?;
    debug!(
        stack = %spec.name,
        agents = spec.agents.len(),
        "loaded stack configuration"
    );
    Ok(spec)
}

/// Default, validate and resolve an already parsed document.
pub fn resolve_document(mut doc: StackDocument) -> Result<StackSpec> {
    validation::apply_defaults(&mut doc);
    let mut spec = validation::resolve(doc)?;
    validation::assign_default_agent(&mut spec);
    Ok(spec)
}

pub fn load_file(path: &Path, options: &LoadOptions) -> Result<StackSpec> {
    if !path.exists() {
        return Err(StackError::ConfigNotFound(path.to_path_buf()));
    }
    let format = ConfigFormat::from_path(path)?;
    let raw = std::fs::read(path)?;
    load(&raw, format, options)
}

pub fn to_string(doc: &StackDocument, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(doc)? + "\n"),
        ConfigFormat::Yaml => Ok(serde_yaml::to_string(doc)?),
    }
}

/// A starter configuration with two agents, a created network and logging.
pub fn example_document() -> StackDocument {
    let mut research = AgentDocument {
        name: Some("research".into()),
        description: Some("Web research agent".into()),
        container_image: Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/research:latest".into()),
        memory_mb: Some(1024),
        timeout_seconds: Some(300),
        secret_references: vec!["arn:aws:secretsmanager:us-east-1:123456789012:secret:agentkit/search".into()],
        ..Default::default()
    };
    research
        .environment
        .insert("LOG_LEVEL".into(), "info".into());

    let orchestration = AgentDocument {
        name: Some("orchestration".into()),
        description: Some("Coordinates the other agents".into()),
        container_image: Some(
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/orchestration:latest".into(),
        ),
        memory_mb: Some(512),
        timeout_seconds: Some(300),
        is_default: Some(true),
        ..Default::default()
    };

    let mut doc = StackDocument {
        name: Some("my-agents".into()),
        description: Some("Multi-agent system on AgentCore".into()),
        agents: vec![research, orchestration],
        network: Some(NetworkDocument {
            cidr_block: Some("10.0.0.0/16".into()),
            availability_zone_count: Some(2),
            enable_service_endpoints: Some(true),
            ..Default::default()
        }),
        secrets: Some(SecretsDocument {
            create_secrets: Some(false),
            ..Default::default()
        }),
        observability: Some(ObservabilityDocument {
            provider: Some("opik".into()),
            project: Some("my-agents".into()),
            enable_logging: Some(true),
            log_retention_days: Some(30),
            ..Default::default()
        }),
        identity: Some(IdentityDocument {
            enable_model_access: Some(true),
            model_ids: Some(vec!["anthropic.claude-3-haiku-20240307-v1:0".into()]),
            ..Default::default()
        }),
        gateway: Some(GatewayDocument {
            enabled: Some(false),
            ..Default::default()
        }),
        teardown_policy: Some("destroy".into()),
        ..Default::default()
    };
    doc.tags.insert("Project".into(), "my-agents".into());
    doc.tags.insert("Environment".into(), "dev".into());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stack::{NetworkSpec, Protocol};
    use std::fs;

    const MINIMAL_YAML: &str = r#"
name: demo
agents:
  - name: worker
    containerImage: registry/worker:1
"#;

    #[test]
    fn format_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("stack.json")).unwrap(),
            ConfigFormat::Json
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("stack.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(matches!(
            ConfigFormat::from_path(Path::new("stack.toml")),
            Err(StackError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn load_minimal_yaml() {
        let spec = load(
            MINIMAL_YAML.as_bytes(),
            ConfigFormat::Yaml,
            &LoadOptions::default(),
        )
        .unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.agents.len(), 1);
        assert!(spec.agents[0].is_default);
        assert_eq!(spec.agents[0].protocol, Protocol::Http);
        assert!(spec.network.is_none());
    }

    #[test]
    fn load_json_with_stack_name_alias() {
        let json = r#"{
            "stackName": "demo",
            "agents": [{"name": "worker", "containerImage": "img", "memoryMB": 2048}],
            "network": {}
        }"#;
        let spec = load(json.as_bytes(), ConfigFormat::Json, &LoadOptions::default()).unwrap();
        assert_eq!(spec.name, "demo");
        assert_eq!(spec.agents[0].memory_mb, 2048);
        assert!(matches!(spec.network, Some(NetworkSpec::Create { .. })));
    }

    #[test]
    fn strict_mode_rejects_unknown_field_with_path() {
        let yaml = "name: demo\nagents:\n  - name: worker\n    containerImage: img\n    memroyMB: 1024\n";
        let err = load(yaml.as_bytes(), ConfigFormat::Yaml, &LoadOptions { strict: true })
            .unwrap_err();
        match err {
            StackError::Config { path, message } => {
                assert_eq!(path, "agents[0].memroyMB");
                assert_eq!(message, "unknown field");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_ignores_unknown_field() {
        let yaml = "name: demo\nagents:\n  - name: worker\n    containerImage: img\n    memroyMB: 1024\n";
        let spec = load(yaml.as_bytes(), ConfigFormat::Yaml, &LoadOptions { strict: false })
            .unwrap();
        assert_eq!(spec.agents[0].memory_mb, 512);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let err = load(b"{not json", ConfigFormat::Json, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, StackError::Json(_)));
    }

    #[test]
    fn load_file_reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        assert!(matches!(
            load_file(&path, &LoadOptions::default()),
            Err(StackError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn load_file_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        fs::write(&path, MINIMAL_YAML).unwrap();
        let spec = load_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(spec.agents[0].name, "worker");
    }

    #[test]
    fn example_document_loads_in_both_formats() {
        let doc = example_document();
        for format in [ConfigFormat::Json, ConfigFormat::Yaml] {
            let text = to_string(&doc, format).unwrap();
            let spec = load(text.as_bytes(), format, &LoadOptions::default()).unwrap();
            assert_eq!(spec.name, "my-agents");
            assert_eq!(spec.default_agent().unwrap().name, "orchestration");
        }
    }
}
