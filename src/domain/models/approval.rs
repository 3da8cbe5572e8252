//! Approval: one row per review attempt in the QA -> team-lead chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    Qa,
    TeamLead,
}

impl ReviewType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Qa => "qa",
            Self::TeamLead => "team_lead",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "qa" => Some(Self::Qa),
            "team_lead" => Some(Self::TeamLead),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub step_id: Uuid,
    pub reviewer_agent_id: Uuid,
    pub review_type: ReviewType,
    pub status: ApprovalStatus,
    pub feedback: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Approval {
    pub fn new_pending(step_id: Uuid, reviewer_agent_id: Uuid, review_type: ReviewType) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id,
            reviewer_agent_id,
            review_type,
            status: ApprovalStatus::Pending,
            feedback: None,
            reviewed_at: None,
            created_at: Utc::now(),
        }
    }
}
