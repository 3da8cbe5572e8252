//! Step: the unit the scheduler executes, and its dependency edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Model tier a step executes at. Used both for the synthesize phase (the
/// step's "effective tier") and to force cheaper tiers for decompose,
/// research gap-analysis, and critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Cheap,
    Medium,
    Expensive,
}

impl ModelTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cheap => "cheap",
            Self::Medium => "medium",
            Self::Expensive => "expensive",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cheap" => Some(Self::Cheap),
            "medium" => Some(Self::Medium),
            "expensive" => Some(Self::Expensive),
            _ => None,
        }
    }
}

/// Step lifecycle. Transitions are constrained by invariant I2:
/// `pending -> in_progress -> {in_review | failed}`,
/// `in_review -> {completed | pending}` (pending = sent back for revision),
/// `{completed, failed, canceled}` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    InReview,
    Completed,
    Failed,
    Canceled,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "in_review" => Some(Self::InReview),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    /// The allowed transition set of invariant I2.
    pub fn valid_transitions(self) -> &'static [StepStatus] {
        match self {
            Self::Pending => &[Self::InProgress, Self::Canceled, Self::Failed],
            Self::InProgress => &[Self::InReview, Self::Failed, Self::Canceled],
            Self::InReview => &[Self::Completed, Self::Pending, Self::Failed, Self::Canceled],
            Self::Completed | Self::Failed | Self::Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub model_tier: ModelTier,
    /// Parallel-wave index in DAG plans, or strict sequence index in legacy
    /// linear plans.
    pub step_order: i64,
    pub status: StepStatus,
    /// The plan task's description, carried from `PlanTask::description` at
    /// creation. The prompt the Decompose and Synthesize phases run on.
    pub task_description: String,
    pub acceptance_criteria: Vec<String>,
    pub result_artifact: Option<String>,
    /// Legacy linear chain pointer; only consulted when the step has no
    /// `blocks`-typed dependency rows (§4.3).
    pub parent_step_id: Option<Uuid>,
    pub revision_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Step {
    pub fn new(
        mission_id: Uuid,
        model_tier: ModelTier,
        step_order: i64,
        parent_step_id: Option<Uuid>,
        task_description: impl Into<String>,
        acceptance_criteria: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            mission_id,
            assigned_agent_id: None,
            model_tier,
            step_order,
            status: StepStatus::Pending,
            task_description: task_description.into(),
            acceptance_criteria,
            result_artifact: None,
            parent_step_id,
            revision_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Dependency edge type. Only `Blocks` gates scheduling; `Informs` is
/// context-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepDependencyType {
    Blocks,
    Informs,
}

impl StepDependencyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Informs => "informs",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "blocks" => Some(Self::Blocks),
            "informs" => Some(Self::Informs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDependency {
    pub id: Uuid,
    pub step_id: Uuid,
    pub depends_on_step_id: Uuid,
    pub dependency_type: StepDependencyType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_status_terminal_states() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Canceled.is_terminal());
        assert!(!StepStatus::InProgress.is_terminal());
    }

    #[test]
    fn step_status_transitions_match_invariant_i2() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::InProgress));
        assert!(StepStatus::InProgress.can_transition_to(StepStatus::InReview));
        assert!(StepStatus::InProgress.can_transition_to(StepStatus::Failed));
        assert!(StepStatus::InReview.can_transition_to(StepStatus::Completed));
        assert!(StepStatus::InReview.can_transition_to(StepStatus::Pending));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Pending));
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Completed));
    }

    #[test]
    fn roundtrip_strings() {
        for s in [
            StepStatus::Pending,
            StepStatus::InProgress,
            StepStatus::InReview,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Canceled,
        ] {
            assert_eq!(StepStatus::from_str(s.as_str()), Some(s));
        }
    }
}
