use std::fmt;

use serde::{Deserialize, Serialize};

/// A value reported after deployment. Identifiers that the provider has not
/// assigned yet stay `Pending` instead of carrying an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "value")]
pub enum OutputValue {
    Known(String),
    Pending,
}

impl OutputValue {
    /// Marker used for `Pending` in machine-readable output.
    pub const PENDING: &'static str = "pending";

    pub fn known(&self) -> Option<&str> {
        match self {
            Self::Known(value) => Some(value),
            Self::Pending => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for OutputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(value) => f.write_str(value),
            Self::Pending => f.write_str("(pending)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub label: String,
    pub value: OutputValue,
}

impl OutputEntry {
    pub fn new(label: impl Into<String>, value: OutputValue) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}
