//! Mission: a unit of work derived from a directive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::project::ProjectPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    InProgress,
    Completed,
    Failed,
    Canceled,
}

impl MissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub directive: String,
    pub status: MissionStatus,
    /// The project phase in effect at the time this mission was linked; null
    /// if the mission has never been linked to a project.
    pub phase_at_link: Option<ProjectPhase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(directive: impl Into<String>, project_id: Option<Uuid>, phase_at_link: Option<ProjectPhase>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            directive: directive.into(),
            status: MissionStatus::InProgress,
            phase_at_link,
            created_at: now,
            updated_at: now,
        }
    }
}
