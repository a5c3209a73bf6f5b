use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, StackError};

/// Directory under the user's home that holds shared `.env` files.
pub const CONFIG_DIR: &str = ".agentkit";

static ENV_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?([A-Za-z_][A-Za-z0-9_]*)=(.*)$").unwrap()
});

/// The fixed groups secrets are distributed in. Keys are matched exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecretCategory {
    /// Model-provider credentials.
    Llm,
    /// Search and tool-provider credentials.
    Search,
    /// Free-form configuration and observability settings.
    Config,
}

impl SecretCategory {
    pub const ALL: [SecretCategory; 3] = [Self::Llm, Self::Search, Self::Config];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Search => "search",
            Self::Config => "config",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Llm => "LLM provider API keys",
            Self::Search => "Search provider API keys",
            Self::Config => "Configuration and observability settings",
        }
    }

    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Self::Llm => &[
                "GOOGLE_API_KEY",
                "GEMINI_API_KEY",
                "ANTHROPIC_API_KEY",
                "CLAUDE_API_KEY",
                "OPENAI_API_KEY",
                "XAI_API_KEY",
                "LLM_API_KEY",
            ],
            Self::Search => &["SERPER_API_KEY", "SERPAPI_API_KEY"],
            Self::Config => &[
                "LLM_PROVIDER",
                "LLM_MODEL",
                "LLM_BASE_URL",
                "SEARCH_PROVIDER",
                "OBSERVABILITY_ENABLED",
                "OBSERVABILITY_PROVIDER",
                "OPIK_API_KEY",
                "OPIK_WORKSPACE",
                "OPIK_PROJECT",
                "LANGFUSE_PUBLIC_KEY",
                "LANGFUSE_SECRET_KEY",
                "PHOENIX_API_KEY",
            ],
        }
    }

    pub fn classify(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.keys().contains(&key))
    }
}

impl fmt::Display for SecretCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse `KEY=VALUE` lines. Comments, blank lines, empty values and
/// `your-...` placeholders are skipped. Later assignments win.
pub fn parse_env(contents: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(caps) = ENV_LINE_RE.captures(line) else {
            continue;
        };
        let key = &caps[2];
        let value = caps[3].trim().trim_matches(|c| c == '"' || c == '\'');
        if value.is_empty() || value.starts_with("your-") {
            continue;
        }
        values.insert(key.to_string(), value.to_string());
    }
    values
}

pub fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_env(&contents))
}

/// One secret in the remote store, named `{prefix}/{category}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretBundle {
    pub name: String,
    pub category: SecretCategory,
    pub values: BTreeMap<String, String>,
}

impl SecretBundle {
    pub fn description(&self) -> &'static str {
        self.category.description()
    }

    /// JSON object stored as the secret string.
    pub fn secret_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.values)?)
    }

    /// The secret string with credential values masked, for dry-run output.
    pub fn masked(&self) -> String {
        let masked: BTreeMap<&str, String> = self
            .values
            .iter()
            .map(|(k, v)| (k.as_str(), mask_value(k, v)))
            .collect();
        serde_json::to_string(&masked).unwrap_or_default()
    }
}

/// Group classified values into bundles. Unmatched keys are dropped and
/// empty categories produce no bundle.
pub fn bundles(values: &BTreeMap<String, String>, prefix: &str) -> Vec<SecretBundle> {
    let mut grouped: BTreeMap<SecretCategory, BTreeMap<String, String>> = BTreeMap::new();
    for (key, value) in values {
        match SecretCategory::classify(key) {
            Some(category) => {
                debug!(key = %key, category = %category, "classified secret");
                grouped
                    .entry(category)
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            None => debug!(key = %key, "dropping unclassified key"),
        }
    }
    grouped
        .into_iter()
        .map(|(category, values)| SecretBundle {
            name: format!("{prefix}/{}", category.name()),
            category,
            values,
        })
        .collect()
}

/// Show only the first eight characters of credential-like values.
pub fn mask_value(key: &str, value: &str) -> String {
    let sensitive = key.contains("KEY") || key.contains("SECRET");
    if !sensitive {
        return value.to_string();
    }
    match value.char_indices().nth(8) {
        Some((cut, _)) => format!("{}***", &value[..cut]),
        None => "***".to_string(),
    }
}

/// Candidate `.env` locations in search order.
pub fn env_file_candidates(project: Option<&str>, cwd: &Path, home: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = vec![cwd.join(".env"), cwd.join("..").join(".env")];
    if let Some(home) = home {
        if let Some(project) = project.filter(|p| !p.is_empty()) {
            candidates.push(home.join(CONFIG_DIR).join("projects").join(project).join(".env"));
        }
        candidates.push(home.join(CONFIG_DIR).join(".env"));
    }
    candidates
}

pub fn find_env_file(project: Option<&str>, cwd: &Path, home: Option<&Path>) -> Result<PathBuf> {
    let candidates = env_file_candidates(project, cwd, home);
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| {
            StackError::EnvFileNotFound(
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        })
}

/// Locate the `.env` file relative to the current directory and home.
pub fn discover_env_file(project: Option<&str>) -> Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    find_env_file(project, &cwd, dirs::home_dir().as_deref())
}

/// Project name from `config.json` (`stackName`), falling back to the
/// directory name.
pub fn detect_project_name(cwd: &Path) -> Option<String> {
    for path in [cwd.join("config.json"), cwd.join("..").join("config.json")] {
        let Ok(raw) = std::fs::read_to_string(&path) else {
            continue;
        };
        let name = serde_json::from_str::<serde_json::Value>(&raw)
            .ok()
            .and_then(|v| v.get("stackName")?.as_str().map(str::to_string))
            .filter(|n| !n.is_empty());
        if name.is_some() {
            return name;
        }
    }
    cwd.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}
