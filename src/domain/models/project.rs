//! Project: a long-lived container with a monotonic phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The project lifecycle phase. Strictly ordered; advancement is monotonic
/// non-decreasing (invariant I6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Discovery,
    Requirements,
    Design,
    Build,
    Test,
    Deploy,
    Completed,
}

impl ProjectPhase {
    pub const ORDER: [Self; 7] = [
        Self::Discovery,
        Self::Requirements,
        Self::Design,
        Self::Build,
        Self::Test,
        Self::Deploy,
        Self::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Requirements => "requirements",
            Self::Design => "design",
            Self::Build => "build",
            Self::Test => "test",
            Self::Deploy => "deploy",
            Self::Completed => "completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ORDER.into_iter().find(|p| p.as_str() == s)
    }

    fn index(self) -> usize {
        self as usize
    }

    /// True iff `next` strictly follows `self` in phase order, or equals it
    /// (a no-op advance). Used to reject backwards or no-op-reported moves
    /// that the caller should treat as an error.
    pub fn precedes_or_equals(self, next: Self) -> bool {
        self.index() <= next.index()
    }

    /// The phase immediately following `self`, `None` once `Completed`.
    pub fn next_phase(self) -> Option<Self> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    /// Advancing out of `Deploy` is the single phase transition that emits
    /// `project_completed` rather than `project_phase_advanced` (§7).
    pub fn is_deploy(self) -> bool {
        matches!(self, Self::Deploy)
    }
}

impl Default for ProjectPhase {
    fn default() -> Self {
        Self::Discovery
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Completed,
    Canceled,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub original_request: String,
    pub phase: ProjectPhase,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(original_request: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_request: original_request.into(),
            phase: ProjectPhase::default(),
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance to `new_phase`, enforcing monotonicity (invariant I6).
    /// Returns `None` without mutating if `new_phase` precedes the current
    /// phase — the *Monotonicity* law from §8.
    pub fn advance_phase(&mut self, new_phase: ProjectPhase) -> Option<ProjectPhase> {
        if new_phase.index() < self.phase.index() {
            return None;
        }
        self.phase = new_phase;
        self.updated_at = Utc::now();
        Some(new_phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_order_is_monotonic_roundtrip() {
        for p in ProjectPhase::ORDER {
            assert_eq!(ProjectPhase::from_str(p.as_str()), Some(p));
        }
    }

    #[test]
    fn advance_phase_rejects_backwards_move() {
        let mut project = Project::new("build a thing");
        project.advance_phase(ProjectPhase::Build);
        let result = project.advance_phase(ProjectPhase::Requirements);
        assert_eq!(result, None);
        assert_eq!(project.phase, ProjectPhase::Build);
    }

    #[test]
    fn advance_phase_allows_forward_move() {
        let mut project = Project::new("build a thing");
        let result = project.advance_phase(ProjectPhase::Design);
        assert_eq!(result, Some(ProjectPhase::Design));
        assert_eq!(project.phase, ProjectPhase::Design);
    }

    #[test]
    fn deploy_is_the_last_advancing_phase() {
        assert!(ProjectPhase::Deploy.is_deploy());
        assert_eq!(ProjectPhase::Deploy.next_phase(), Some(ProjectPhase::Completed));
        assert_eq!(ProjectPhase::Completed.next_phase(), None);
    }
}
