use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("invalid config at {path}: {message}")]
    Config { path: String, message: String },

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    #[error("resource graph invariant violated: {0}")]
    InvariantViolation(String),

    #[error("{step} failed: {message}")]
    ExternalTool { step: String, message: String },

    #[error("no .env file found (searched: {0})")]
    EnvFileNotFound(String),

    #[error("cannot include template: {0}")]
    Include(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl StackError {
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn external(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            step: step.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
