//! Decomposition Plan: the serialized result of the Decomposition Engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Superseded,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }
}

/// End-state tag describing what kind of deliverable the plan converges on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndStateTag {
    ProductionDocs,
    WorkingPrototype,
    Hybrid,
}

impl EndStateTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProductionDocs => "production_docs",
            Self::WorkingPrototype => "working_prototype",
            Self::Hybrid => "hybrid",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "production_docs" => Some(Self::ProductionDocs),
            "working_prototype" => Some(Self::WorkingPrototype),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }
}

/// Escalation type, inferred by keyword from the escalation reason (§4.2
/// step 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    Budget,
    Strategic,
    Brand,
    CapabilityGap,
    Ambiguity,
}

impl EscalationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Strategic => "strategic",
            Self::Brand => "brand",
            Self::CapabilityGap => "capability_gap",
            Self::Ambiguity => "ambiguity",
        }
    }

    /// Infer an escalation type from a free-text reason by keyword match,
    /// in the order the keywords are checked (first match wins), falling
    /// back to `Ambiguity` when nothing matches.
    pub fn infer_from_reason(reason: &str) -> Self {
        let lower = reason.to_lowercase();
        let keyword_table: [(&str, Self); 8] = [
            ("budget", Self::Budget),
            ("cost", Self::Budget),
            ("strategic", Self::Strategic),
            ("strategy", Self::Strategic),
            ("brand", Self::Brand),
            ("reputation", Self::Brand),
            ("capability", Self::CapabilityGap),
            ("skill", Self::CapabilityGap),
        ];
        for (keyword, tag) in keyword_table {
            if lower.contains(keyword) {
                return tag;
            }
        }
        Self::Ambiguity
    }
}

/// A single synthetic task (`T1..Tn`) inside a decomposition plan, before
/// materialization into a persisted `Step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanTask {
    /// Synthetic id, e.g. `"T1"`.
    pub task_id: String,
    pub description: String,
    pub required_role: String,
    pub parallel_group: i64,
    pub depends_on: Vec<String>,
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionPlan {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub tasks: Vec<PlanTask>,
    pub end_state: EndStateTag,
    pub escalation_needed: bool,
    pub escalation_reason: Option<String>,
    pub hiring_needed: Vec<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

impl DecompositionPlan {
    /// The single-task fallback plan used when the planner LLM's JSON
    /// couldn't be parsed (§4.2 step 4): one task whose description is the
    /// directive verbatim. Fallback plans skip feasibility and re-planning.
    pub fn fallback(mission_id: Uuid, directive: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            mission_id,
            tasks: vec![PlanTask {
                task_id: "T1".to_string(),
                description: directive.to_string(),
                required_role: "generalist".to_string(),
                parallel_group: 1,
                depends_on: vec![],
                acceptance_criteria: vec![],
            }],
            end_state: EndStateTag::Hybrid,
            escalation_needed: false,
            escalation_reason: None,
            hiring_needed: vec![],
            status: PlanStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.tasks.len() == 1 && self.tasks[0].task_id == "T1" && self.tasks[0].depends_on.is_empty()
    }
}

/// A historical record of a past plan's approach, retrieved by topic-tag
/// overlap and ordered by critique score (§4.2 step 2). Deliberately a
/// lighter-weight record than `DecompositionPlan` itself — the engine only
/// needs the summary and the score to build approach hints, not the full
/// task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproachMemoryEntry {
    pub id: Uuid,
    pub mission_id: Uuid,
    pub topic_tags: Vec<String>,
    pub approach_summary: String,
    pub critique_score: f64,
    pub created_at: DateTime<Utc>,
}

impl ApproachMemoryEntry {
    pub fn new(mission_id: Uuid, topic_tags: Vec<String>, approach_summary: impl Into<String>, critique_score: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            mission_id,
            topic_tags,
            approach_summary: approach_summary.into(),
            critique_score,
            created_at: Utc::now(),
        }
    }

    /// Jaccard similarity between this entry's tags and a query tag set.
    pub fn tag_overlap_score(&self, query_tags: &[String]) -> f64 {
        use std::collections::HashSet;
        let a: HashSet<&str> = self.topic_tags.iter().map(String::as_str).collect();
        let b: HashSet<&str> = query_tags.iter().map(String::as_str).collect();
        if a.is_empty() && b.is_empty() {
            return 0.0;
        }
        let intersection = a.intersection(&b).count();
        let union = a.union(&b).count();
        if union == 0 {
            0.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalation_keyword_inference() {
        assert_eq!(EscalationType::infer_from_reason("over budget for this quarter"), EscalationType::Budget);
        assert_eq!(EscalationType::infer_from_reason("requires a strategic pivot"), EscalationType::Strategic);
        assert_eq!(EscalationType::infer_from_reason("could damage our brand"), EscalationType::Brand);
        assert_eq!(EscalationType::infer_from_reason("nobody on the roster has this skill"), EscalationType::CapabilityGap);
        assert_eq!(EscalationType::infer_from_reason("directive is unclear"), EscalationType::Ambiguity);
    }

    #[test]
    fn fallback_plan_is_single_task() {
        let mission_id = Uuid::new_v4();
        let plan = DecompositionPlan::fallback(mission_id, "ship the thing");
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].description, "ship the thing");
        assert!(plan.is_fallback());
    }

    #[test]
    fn tag_overlap_scores_identical_sets_as_one() {
        let entry = ApproachMemoryEntry::new(
            Uuid::new_v4(),
            vec!["rust".into(), "cli".into()],
            "built a CLI",
            4.0,
        );
        assert_eq!(entry.tag_overlap_score(&["rust".into(), "cli".into()]), 1.0);
        assert_eq!(entry.tag_overlap_score(&["unrelated".into()]), 0.0);
    }
}
