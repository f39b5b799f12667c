//! Event envelope and payloads.
//!
//! Payloads are what producers build; the envelope is what goes on the wire.
//! The envelope is flat: payload fields and routing metadata share one JSON
//! object.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::{AgentStatus, LogKind};

// ============================================================================
// Envelope
// ============================================================================

/// An event enriched with routing metadata, as transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The event payload.
    #[serde(flatten)]
    pub payload: EventPayload,

    /// Room the event belongs to.
    pub room: String,

    /// Member that produced it.
    pub member: String,

    /// Unix ms timestamp, assigned at dispatch.
    pub timestamp: i64,
}

impl Envelope {
    pub fn new(
        payload: EventPayload,
        room: impl Into<String>,
        member: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            payload,
            room: room.into(),
            member: member.into(),
            timestamp,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// All event types, tagged by the `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EventPayload {
    /// A new agent appears on the canvas.
    AgentRegister {
        agent_id: String,
        name: String,
        owner: String,
        total_steps: Option<u32>,
    },

    /// Status / progress / cost change for an agent.
    AgentUpdate {
        agent_id: String,
        status: AgentStatus,
        progress: Option<String>,
        cost: Option<f64>,
    },

    /// Log entry shown in the agent inspector.
    AgentLog { agent_id: String, log: AgentLog },

    /// Agent finished.
    AgentComplete { agent_id: String },

    /// Free-form message on the team timeline.
    TimelineMessage { actor: String, content: String },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AgentRegister { .. } => EventKind::AgentRegister,
            Self::AgentUpdate { .. } => EventKind::AgentUpdate,
            Self::AgentLog { .. } => EventKind::AgentLog,
            Self::AgentComplete { .. } => EventKind::AgentComplete,
            Self::TimelineMessage { .. } => EventKind::TimelineMessage,
        }
    }

    /// Agent this event refers to, if any.
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Self::AgentRegister { agent_id, .. }
            | Self::AgentUpdate { agent_id, .. }
            | Self::AgentLog { agent_id, .. }
            | Self::AgentComplete { agent_id } => Some(agent_id),
            Self::TimelineMessage { .. } => None,
        }
    }
}

/// Discriminant of [`EventPayload`], matching the wire `type` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AgentRegister,
    AgentUpdate,
    AgentLog,
    AgentComplete,
    TimelineMessage,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AgentRegister => "agent_register",
            Self::AgentUpdate => "agent_update",
            Self::AgentLog => "agent_log",
            Self::AgentComplete => "agent_complete",
            Self::TimelineMessage => "timeline_message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLog {
    /// Unix ms timestamp of the producer call.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(payload: EventPayload) -> Value {
        serde_json::to_value(Envelope::new(payload, "hack-room", "amadeus", 1_700_000_000_000))
            .unwrap()
    }

    #[test]
    fn test_register_wire_shape() {
        let value = envelope(EventPayload::AgentRegister {
            agent_id: "agent-1a2b3c4d".into(),
            name: "Self-Play Engine".into(),
            owner: "amadeus".into(),
            total_steps: Some(100),
        });

        assert_eq!(
            value,
            json!({
                "type": "agent_register",
                "agentId": "agent-1a2b3c4d",
                "name": "Self-Play Engine",
                "owner": "amadeus",
                "totalSteps": 100,
                "room": "hack-room",
                "member": "amadeus",
                "timestamp": 1_700_000_000_000_i64,
            })
        );
    }

    #[test]
    fn test_update_keeps_null_optionals() {
        let value = envelope(EventPayload::AgentUpdate {
            agent_id: "agent-1".into(),
            status: AgentStatus::Running,
            progress: None,
            cost: None,
        });

        assert_eq!(value["type"], "agent_update");
        assert_eq!(value["status"], "running");
        assert!(value.get("progress").unwrap().is_null());
        assert!(value.get("cost").unwrap().is_null());
    }

    #[test]
    fn test_log_nests_entry_with_type_field() {
        let mut metadata = Map::new();
        metadata.insert("tokens".into(), json!(512));
        let value = envelope(EventPayload::AgentLog {
            agent_id: "agent-1".into(),
            log: AgentLog {
                timestamp: 42,
                kind: LogKind::LlmCall,
                content: "prompted model".into(),
                metadata,
            },
        });

        assert_eq!(value["type"], "agent_log");
        assert_eq!(value["log"]["type"], "llm_call");
        assert_eq!(value["log"]["timestamp"], 42);
        assert_eq!(value["log"]["metadata"]["tokens"], 512);
    }

    #[test]
    fn test_timeline_message_parses_back() {
        let raw = json!({
            "type": "timeline_message",
            "actor": "amadeus",
            "content": "shipping it",
            "room": "r",
            "member": "amadeus",
            "timestamp": 7,
        });
        let parsed: Envelope = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.kind(), EventKind::TimelineMessage);
        assert_eq!(parsed.payload.agent_id(), None);
        assert_eq!(parsed.timestamp, 7);
    }
}
