//! Append-only event log (§7): every state change the spec names emits an
//! event consumed by the ingress process for announcement. Simplified from
//! the teacher's broadcast event bus to the append-only persistence the core
//! actually needs — no in-process fan-out is required at this scope.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{Event, EventType};
use crate::domain::ports::store::Store;

#[derive(Clone)]
pub struct EventSink {
    store: Arc<dyn Store>,
}

impl EventSink {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Appends an event. Store failures are logged, not propagated — losing
    /// an announcement is preferable to failing the operation that earned it.
    pub async fn emit(&self, event_type: EventType, payload: serde_json::Value) {
        let event = Event::new(event_type, payload);
        if let Err(err) = self.store.append_event(&event).await {
            warn!(event_type = event_type.as_str(), error = %err, "failed to persist event");
        }
    }

    pub async fn task_completed(&self, step_id: Uuid) {
        self.emit(EventType::TaskCompleted, json!({ "step_id": step_id })).await;
    }

    pub async fn task_failed(&self, step_id: Uuid, reason: &str) {
        self.emit(EventType::TaskFailed, json!({ "step_id": step_id, "reason": reason })).await;
    }

    pub async fn mission_completed(&self, mission_id: Uuid) {
        self.emit(EventType::MissionCompleted, json!({ "mission_id": mission_id })).await;
    }

    pub async fn mission_failed(&self, mission_id: Uuid) {
        self.emit(EventType::MissionFailed, json!({ "mission_id": mission_id })).await;
    }

    /// Project phase advancement from `deploy` emits `project_completed`, not
    /// `project_phase_advanced` (§7).
    pub async fn project_phase_advanced(&self, project_id: Uuid, new_phase: &str, from_deploy: bool) {
        if from_deploy {
            self.emit(EventType::ProjectCompleted, json!({ "project_id": project_id })).await;
        } else {
            self.emit(
                EventType::ProjectPhaseAdvanced,
                json!({ "project_id": project_id, "phase": new_phase }),
            )
            .await;
        }
    }

    pub async fn revision_cap_reached(&self, step_id: Uuid) {
        self.emit(EventType::RevisionCapReached, json!({ "step_id": step_id })).await;
    }

    pub async fn agent_upskilled(&self, agent_id: Uuid, expertise_addition: &str) {
        self.emit(
            EventType::AgentUpskilled,
            json!({ "agent_id": agent_id, "expertise_addition": expertise_addition }),
        )
        .await;
    }

    pub async fn linear_inbound_issue(&self, external_id: &str) {
        self.emit(EventType::LinearInboundIssue, json!({ "external_id": external_id })).await;
    }
}
