//! Outcome of a pipeline evaluation.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    #[default]
    Success,
    Warning,
    Error,
}

/// Severity and message attached to a flow state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub kind: StatusKind,
    pub text: String,
}

impl PipelineStatus {
    pub fn new(kind: StatusKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn success() -> Self {
        Self::default()
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Warning, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(StatusKind::Error, text)
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

impl From<&CoreError> for PipelineStatus {
    fn from(err: &CoreError) -> Self {
        Self::error(err.to_string())
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind, self.text.is_empty()) {
            (StatusKind::Success, true) => write!(f, "ok"),
            (StatusKind::Success, false) => write!(f, "{}", self.text),
            (StatusKind::Warning, _) => write!(f, "warning: {}", self.text),
            (StatusKind::Error, _) => write!(f, "error: {}", self.text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_missing_object() {
        let status = PipelineStatus::from(&CoreError::missing_object("Particles"));
        assert!(status.is_error());
        assert_eq!(
            status.to_string(),
            "error: The dataset does not contain an object of type: Particles"
        );
        assert_eq!(PipelineStatus::success().to_string(), "ok");
    }
}
