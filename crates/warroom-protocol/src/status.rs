//! Agent status and log kind vocabularies.
//!
//! Both are open sets on the wire: values outside the known vocabulary are
//! carried through unchanged in the `Other` variant instead of being rejected.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent as shown on the war room canvas.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStatus {
    Idle,
    Running,
    Paused,
    Error,
    Complete,
    /// Any value outside the known vocabulary.
    Other(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Complete => "complete",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for AgentStatus {
    fn from(value: &str) -> Self {
        match value {
            "idle" => Self::Idle,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "error" => Self::Error,
            "complete" => Self::Complete,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for AgentStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<AgentStatus> for String {
    fn from(value: AgentStatus) -> Self {
        match value {
            AgentStatus::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of an agent log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogKind {
    LlmCall,
    ToolUse,
    Reflection,
    Error,
    #[default]
    Output,
    /// Any value outside the known vocabulary.
    Other(String),
}

impl LogKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::LlmCall => "llm_call",
            Self::ToolUse => "tool_use",
            Self::Reflection => "reflection",
            Self::Error => "error",
            Self::Output => "output",
            Self::Other(value) => value,
        }
    }
}

impl From<&str> for LogKind {
    fn from(value: &str) -> Self {
        match value {
            "llm_call" => Self::LlmCall,
            "tool_use" => Self::ToolUse,
            "reflection" => Self::Reflection,
            "error" => Self::Error,
            "output" => Self::Output,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for LogKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<LogKind> for String {
    fn from(value: LogKind) -> Self {
        match value {
            LogKind::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_status_serializes_lowercase() {
        let json = serde_json::to_string(&AgentStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_unknown_status_passes_through() {
        let status: AgentStatus = serde_json::from_str("\"thinking-hard\"").unwrap();
        assert_eq!(status, AgentStatus::Other("thinking-hard".to_string()));
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"thinking-hard\"");
    }

    #[test]
    fn test_log_kind_defaults_to_output() {
        assert_eq!(LogKind::default(), LogKind::Output);
        assert_eq!(LogKind::from("tool_use"), LogKind::ToolUse);
        assert_eq!(LogKind::from("bogus").as_str(), "bogus");
    }
}
