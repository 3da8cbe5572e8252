//! Event: the user-visible state-change log consumed by the ingress process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskCompleted,
    TaskFailed,
    MissionCompleted,
    MissionFailed,
    ProjectPhaseAdvanced,
    ProjectCompleted,
    RevisionCapReached,
    AgentUpskilled,
    LinearInboundIssue,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::MissionCompleted => "mission_completed",
            Self::MissionFailed => "mission_failed",
            Self::ProjectPhaseAdvanced => "project_phase_advanced",
            Self::ProjectCompleted => "project_completed",
            Self::RevisionCapReached => "revision_cap_reached",
            Self::AgentUpskilled => "agent_upskilled",
            Self::LinearInboundIssue => "linear_inbound_issue",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
            created_at: Utc::now(),
        }
    }
}
