//! Pipeline Phase Record and the tagged dispatch variant for phase
//! sequencing (§9's "dynamic dispatch on task kind" redesign note).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::ModelTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Decompose,
    Research,
    Synthesize,
    Critique,
    Revise,
}

impl PhaseName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decompose => "decompose",
            Self::Research => "research",
            Self::Synthesize => "synthesize",
            Self::Critique => "critique",
            Self::Revise => "revise",
        }
    }
}

/// Which phase sequence a step's execution should run, replacing a
/// string-keyed pipeline config with a closed enum (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Trivial step: a single LLM call, no phase records beyond one
    /// synthesize-equivalent call.
    SkipPipeline,
    /// Engineering/creative tasks: decompose → synthesize → critique →
    /// (revise), no research phase.
    SkipResearch,
    /// The full D → R → S → C → (Revise → re-C) sequence.
    FullPipeline,
}

impl PipelineMode {
    /// The ordered phase sequence this mode runs, excluding the conditional
    /// revise/re-critique loop (handled separately by the pipeline driver).
    pub fn phase_sequence(self) -> &'static [PhaseName] {
        match self {
            Self::SkipPipeline => &[PhaseName::Synthesize],
            Self::SkipResearch => &[PhaseName::Decompose, PhaseName::Synthesize, PhaseName::Critique],
            Self::FullPipeline => &[
                PhaseName::Decompose,
                PhaseName::Research,
                PhaseName::Synthesize,
                PhaseName::Critique,
            ],
        }
    }

    pub fn runs_research(self) -> bool {
        matches!(self, Self::FullPipeline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePhaseRecord {
    pub id: Uuid,
    pub step_id: Uuid,
    pub phase_name: PhaseName,
    pub phase_order: i64,
    /// Null for the research phase (no single LLM call drives fetching).
    pub model_tier: Option<ModelTier>,
    /// Populated only for the critique phase.
    pub score: Option<f64>,
    pub duration_ms: u64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PipelinePhaseRecord {
    pub fn new(step_id: Uuid, phase_name: PhaseName, phase_order: i64, model_tier: Option<ModelTier>, duration_ms: u64, metadata: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_id,
            phase_name,
            phase_order,
            model_tier,
            score: None,
            duration_ms,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pipeline_runs_research() {
        assert!(PipelineMode::FullPipeline.runs_research());
        assert!(!PipelineMode::SkipResearch.runs_research());
        assert!(!PipelineMode::SkipPipeline.runs_research());
    }

    #[test]
    fn skip_pipeline_has_one_phase() {
        assert_eq!(PipelineMode::SkipPipeline.phase_sequence(), &[PhaseName::Synthesize]);
    }
}
