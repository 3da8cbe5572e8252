//! Agent and Persona: actors that execute and review steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub role: String,
    /// `None` marks a system/test agent — never eligible as a domain
    /// reviewer (§4.5 step 4).
    pub team_id: Option<Uuid>,
    pub status: AgentStatus,
    pub current_persona_id: Option<Uuid>,
}

impl Agent {
    /// Whether this agent may act as a reviewer for `assignee_id`'s step:
    /// must belong to a team (not a system/test agent) and must not be the
    /// step's own assignee.
    pub fn eligible_reviewer_for(&self, assignee_id: Uuid) -> bool {
        self.team_id.is_some() && self.id != assignee_id
    }
}

/// Personas are immutable rows; "upgrading" appends a new row and the agent's
/// `current_persona_id` is repointed rather than mutating the old persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Persona {
    pub fn new(agent_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Append an expertise addition to form the content of a new persona row
    /// (the persona-upgrade trigger in §4.5 step 7).
    pub fn upgraded_content(&self, expertise_addition: &str) -> String {
        format!("{}\n\n[Acquired expertise] {}", self.content, expertise_addition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_agent_never_eligible_reviewer() {
        let system_agent = Agent {
            id: Uuid::new_v4(),
            role: "test-runner".into(),
            team_id: None,
            status: AgentStatus::Active,
            current_persona_id: None,
        };
        assert!(!system_agent.eligible_reviewer_for(Uuid::new_v4()));
    }

    #[test]
    fn assignee_never_eligible_to_review_own_step() {
        let agent_id = Uuid::new_v4();
        let agent = Agent {
            id: agent_id,
            role: "qa".into(),
            team_id: Some(Uuid::new_v4()),
            status: AgentStatus::Active,
            current_persona_id: None,
        };
        assert!(!agent.eligible_reviewer_for(agent_id));
        assert!(agent.eligible_reviewer_for(Uuid::new_v4()));
    }
}
