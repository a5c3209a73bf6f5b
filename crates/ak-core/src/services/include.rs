//! Existing CloudFormation templates merged into a rendered stack.
//!
//! The included template keeps its logical ids. Its named sections are
//! merged entry by entry with the rendered stack, and a name defined on both
//! sides is an error. Parameter values become parameter defaults, and stack
//! tags are added to every included resource that already carries a tag list.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, StackError};
use crate::services::config_loader::ConfigFormat;
use crate::services::template::Template;

const MERGED_SECTIONS: [&str; 6] = [
    "Parameters",
    "Mappings",
    "Conditions",
    "Rules",
    "Resources",
    "Outputs",
];

#[derive(Debug, Clone, PartialEq)]
pub struct IncludedTemplate {
    source: String,
    document: Map<String, Value>,
    parameters: BTreeMap<String, String>,
    tags: BTreeMap<String, String>,
}

impl IncludedTemplate {
    /// Read a JSON or YAML template. YAML short-form intrinsics (`!Ref`,
    /// `!GetAtt`, `!Sub` and friends) are expanded to their long form.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StackError::ConfigNotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let value = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::from_str(&raw)?,
            ConfigFormat::Yaml => yaml_to_json(serde_yaml::from_str(&raw)?)?,
        };
        Self::from_value(path.display().to_string(), value)
    }

    pub fn from_value(source: impl Into<String>, value: Value) -> Result<Self> {
        let source = source.into();
        let Value::Object(document) = value else {
            return Err(StackError::Include(format!("{source} is not a template")));
        };
        if !document.get("Resources").is_some_and(Value::is_object) {
            return Err(StackError::Include(format!(
                "{source} has no Resources section"
            )));
        }
        Ok(Self {
            source,
            document,
            parameters: BTreeMap::new(),
            tags: BTreeMap::new(),
        })
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = (String, String)>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = (String, String)>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn resource_count(&self) -> usize {
        self.document
            .get("Resources")
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }

    /// The rendered stack with this template merged in. The format version
    /// and description of the rendered stack win.
    pub fn merge(&self, rendered: &Template) -> Result<Value> {
        let mut included = self.document.clone();
        self.apply_parameters(&mut included)?;
        self.apply_tags(&mut included);

        let mut merged = match serde_json::to_value(rendered)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (section, value) in included {
            if !MERGED_SECTIONS.contains(&section.as_str()) {
                if !merged.contains_key(&section) {
                    merged.insert(section, value);
                }
                continue;
            }
            let Value::Object(entries) = value else {
                return Err(StackError::Include(format!(
                    "{}: {section} must be a mapping",
                    self.source
                )));
            };
            let target = merged
                .entry(section.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(target) = target else {
                continue;
            };
            for (name, entry) in entries {
                if target.contains_key(&name) {
                    return Err(StackError::Include(format!(
                        "{}: {section} entry {name} is also defined by the stack",
                        self.source
                    )));
                }
                target.insert(name, entry);
            }
        }
        debug!(
            source = %self.source,
            resources = self.resource_count(),
            "merged included template"
        );
        Ok(Value::Object(merged))
    }

    fn apply_parameters(&self, document: &mut Map<String, Value>) -> Result<()> {
        for (name, value) in &self.parameters {
            let declared = document
                .get_mut("Parameters")
                .and_then(|p| p.get_mut(name))
                .and_then(Value::as_object_mut);
            let Some(declared) = declared else {
                return Err(StackError::Include(format!(
                    "{}: unknown parameter {name}",
                    self.source
                )));
            };
            declared.insert("Default".into(), Value::String(value.clone()));
        }
        Ok(())
    }

    fn apply_tags(&self, document: &mut Map<String, Value>) {
        let Some(Value::Object(resources)) = document.get_mut("Resources") else {
            return;
        };
        for resource in resources.values_mut() {
            let Some(Value::Array(tags)) = resource.pointer_mut("/Properties/Tags") else {
                continue;
            };
            for (key, value) in &self.tags {
                let present = tags
                    .iter()
                    .any(|t| t.get("Key").and_then(Value::as_str) == Some(key.as_str()));
                if !present {
                    let mut tag = Map::new();
                    tag.insert("Key".into(), Value::String(key.clone()));
                    tag.insert("Value".into(), Value::String(value.clone()));
                    tags.push(Value::Object(tag));
                }
            }
        }
    }
}

/// Render a merged template in the requested format.
pub fn to_string(merged: &Value, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(merged)? + "\n"),
        ConfigFormat::Yaml => Ok(serde_yaml::to_string(merged)?),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => serde_json::to_value(&n)?,
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    Yaml::String(s) => s,
                    other => serde_yaml::to_string(&other)?.trim().to_string(),
                };
                out.insert(key, yaml_to_json(value)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            intrinsic(tag.trim_start_matches('!'), yaml_to_json(tagged.value)?)
        }
    })
}

fn intrinsic(name: &str, value: Value) -> Value {
    let (key, value) = match (name, value) {
        ("Ref" | "Condition", value) => (name.to_string(), value),
        ("GetAtt", Value::String(path)) => {
            let value = match path.split_once('.') {
                Some((resource, attribute)) => Value::Array(vec![
                    Value::String(resource.to_string()),
                    Value::String(attribute.to_string()),
                ]),
                None => Value::String(path),
            };
            ("Fn::GetAtt".to_string(), value)
        }
        (name, value) => (format!("Fn::{name}"), value),
    };
    let mut out = Map::new();
    out.insert(key, value);
    Value::Object(out)
}
