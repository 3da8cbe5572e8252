//! Execution Pipeline (§4.4): the per-step D -> R -> S -> C -> (Revise ->
//! re-C) state machine, budget-tracked research, and citation validation.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::domain::error::PipelineError;
use crate::domain::models::{CapabilityManifest, ModelTier, PhaseName, PipelineMode, PipelinePhaseRecord, Step, StepStatus};
use crate::domain::ports::llm::{LlmClient, LlmRequest};
use crate::domain::ports::store::Store;
use crate::domain::ports::web::WebClient;
use crate::services::citation_validator::{self, ResearchSource};

const MAX_REVISE_ATTEMPTS: u32 = 2;
const SUBSTANTIVE_MIN_CHARS: usize = 500;
const SUBSTANTIVE_TARGET_COUNT: usize = 3;

pub struct PipelineOutcome {
    pub artifact: String,
    pub critique_score: f64,
    pub revised: bool,
    pub lesson: Option<String>,
    pub citation_score: f64,
    pub phase_records: Vec<PipelinePhaseRecord>,
}

#[derive(Debug, Clone, Default)]
struct DecomposeOutput {
    sub_questions: Vec<String>,
    queries: Vec<String>,
    key_requirements: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
struct CritiqueScores {
    completeness: f64,
    accuracy: f64,
    actionability: f64,
    depth: f64,
}

impl CritiqueScores {
    fn moderate_default() -> Self {
        Self { completeness: 3.0, accuracy: 3.0, actionability: 3.0, depth: 3.0 }
    }

    fn average(self) -> f64 {
        (self.completeness + self.accuracy + self.actionability + self.depth) / 4.0
    }

    fn needs_revision(self) -> bool {
        let dims = [self.completeness, self.accuracy, self.actionability, self.depth];
        dims.iter().any(|d| *d < 3.0) || self.average() < 3.5
    }
}

/// Tracks LLM-query and page-fetch consumption against the manifest budgets
/// for one pipeline execution (invariant I4).
struct ResearchBudget {
    queries_used: u32,
    fetches_used: u32,
    max_queries: u32,
    max_fetches: u32,
}

impl ResearchBudget {
    fn new(manifest: &CapabilityManifest) -> Self {
        Self {
            queries_used: 0,
            fetches_used: 0,
            max_queries: manifest.budgets.max_search_queries_per_step,
            max_fetches: manifest.budgets.max_page_fetches_per_step,
        }
    }

    fn remaining_queries(&self) -> u32 {
        self.max_queries.saturating_sub(self.queries_used)
    }

    fn remaining_fetches(&self) -> u32 {
        self.max_fetches.saturating_sub(self.fetches_used)
    }

    fn snapshot(&self) -> serde_json::Value {
        json!({
            "queries_used": self.queries_used,
            "fetches_used": self.fetches_used,
            "queries_remaining": self.remaining_queries(),
            "fetches_remaining": self.remaining_fetches(),
        })
    }
}

pub struct ExecutionPipeline {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    web: Arc<dyn WebClient>,
    manifest: CapabilityManifest,
}

impl ExecutionPipeline {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LlmClient>, web: Arc<dyn WebClient>, manifest: CapabilityManifest) -> Self {
        Self { store, llm, web, manifest }
    }

    pub async fn execute_step(
        &self,
        step: &Step,
        mode: PipelineMode,
        persona_system_prompt: &str,
        upstream_citation_score: Option<f64>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut phase_records = Vec::new();
        let mut order = 0i64;

        self.check_cancelled(step.id).await?;
        let decompose_output = if matches!(mode, PipelineMode::SkipResearch | PipelineMode::FullPipeline) {
            order += 1;
            let started = Instant::now();
            let output = self.run_decompose(step).await;
            phase_records.push(PipelinePhaseRecord::new(
                step.id,
                PhaseName::Decompose,
                order,
                Some(ModelTier::Cheap),
                started.elapsed().as_millis() as u64,
                json!({ "queries": output.queries, "sub_questions": output.sub_questions }),
            ));
            output
        } else {
            DecomposeOutput::default()
        };

        self.check_cancelled(step.id).await?;
        let mut sources: Vec<ResearchSource> = Vec::new();
        if mode.runs_research() {
            order += 1;
            let started = Instant::now();
            let mut budget = ResearchBudget::new(&self.manifest);
            sources = self.run_research(&decompose_output.queries, &mut budget).await;
            phase_records.push(PipelinePhaseRecord::new(
                step.id,
                PhaseName::Research,
                order,
                None,
                started.elapsed().as_millis() as u64,
                json!({
                    "sources": sources.iter().map(|s| json!({"url": s.url, "title": s.title, "char_count": s.char_count})).collect::<Vec<_>>(),
                    "budget": budget.snapshot(),
                }),
            ));
        }

        self.check_cancelled(step.id).await?;
        order += 1;
        let started = Instant::now();
        let mut artifact = self.run_synthesize(step, &decompose_output, &sources, persona_system_prompt).await;
        phase_records.push(PipelinePhaseRecord::new(
            step.id,
            PhaseName::Synthesize,
            order,
            Some(step.model_tier),
            started.elapsed().as_millis() as u64,
            json!({ "source_count": sources.len() }),
        ));

        self.check_cancelled(step.id).await?;
        order += 1;
        let started = Instant::now();
        let citation_report = citation_validator::validate(&artifact, &sources);
        let mut critique = self.run_critique(step, &artifact, upstream_citation_score.or(Some(citation_report.citation_score))).await;
        phase_records.push(PipelinePhaseRecord::new(
            step.id,
            PhaseName::Critique,
            order,
            Some(ModelTier::Cheap),
            started.elapsed().as_millis() as u64,
            json!({
                "completeness": critique.scores.completeness,
                "accuracy": critique.scores.accuracy,
                "actionability": critique.scores.actionability,
                "depth": critique.scores.depth,
                "citation_score": citation_report.citation_score,
                "uncited_urls": citation_report.uncited_urls,
            }),
        ));
        if let Some(record) = phase_records.last_mut() {
            record.score = Some(critique.scores.average());
        }

        let mut revised = false;
        let mut attempts = 0;
        while critique.scores.needs_revision() && attempts < MAX_REVISE_ATTEMPTS {
            self.check_cancelled(step.id).await?;
            attempts += 1;
            order += 1;
            let started = Instant::now();
            match self.run_revise(step, &artifact, &critique.feedback).await {
                Some(revised_artifact) => {
                    artifact = revised_artifact;
                    revised = true;
                    phase_records.push(PipelinePhaseRecord::new(
                        step.id,
                        PhaseName::Revise,
                        order,
                        Some(step.model_tier),
                        started.elapsed().as_millis() as u64,
                        json!({ "attempt": attempts }),
                    ));

                    order += 1;
                    let re_critique_started = Instant::now();
                    critique = self.run_critique(step, &artifact, Some(citation_report.citation_score)).await;
                    phase_records.push(PipelinePhaseRecord::new(
                        step.id,
                        PhaseName::Critique,
                        order,
                        Some(ModelTier::Cheap),
                        re_critique_started.elapsed().as_millis() as u64,
                        json!({
                            "completeness": critique.scores.completeness,
                            "accuracy": critique.scores.accuracy,
                            "actionability": critique.scores.actionability,
                            "depth": critique.scores.depth,
                            "re_critique_after_attempt": attempts,
                        }),
                    ));
                    if let Some(record) = phase_records.last_mut() {
                        record.score = Some(critique.scores.average());
                    }
                }
                None => {
                    // Revise itself failed: keep the prior artifact, mark
                    // revised=false, stop trying (§4.4's revision trigger).
                    revised = false;
                    break;
                }
            }
        }

        Ok(PipelineOutcome {
            artifact,
            critique_score: critique.scores.average(),
            revised,
            lesson: critique.lesson,
            citation_score: citation_report.citation_score,
            phase_records,
        })
    }

    async fn check_cancelled(&self, step_id: Uuid) -> Result<(), PipelineError> {
        match self.store.get_step(step_id).await {
            Ok(Some(current)) if current.status == StepStatus::Canceled => Err(PipelineError::Cancelled),
            _ => Ok(()),
        }
    }

    async fn run_decompose(&self, step: &Step) -> DecomposeOutput {
        let system_prompt = "Produce sub-questions, search queries (at least 3 encouraged), and \
            key requirements for the task below. Respond with strict JSON: \
            {\"sub_questions\": [string], \"queries\": [string], \"key_requirements\": [string]}."
            .to_string();
        let user_message = step.task_description.clone();

        let request = LlmRequest {
            system_prompt,
            user_message,
            agent_id: step.assigned_agent_id,
            mission_step_id: Some(step.id),
            tier: ModelTier::Cheap,
        };

        let Ok(response) = self.llm.call(request).await else {
            return DecomposeOutput::default();
        };

        parse_decompose_response(&response.content)
    }

    async fn run_research(&self, queries: &[String], budget: &mut ResearchBudget) -> Vec<ResearchSource> {
        let mut sources = Vec::new();
        let mut pending_queries = queries.to_vec();

        self.execute_research_round(&mut pending_queries, budget, &mut sources).await;

        let substantive = sources.iter().filter(|s| s.char_count >= SUBSTANTIVE_MIN_CHARS).count();
        if substantive < SUBSTANTIVE_TARGET_COUNT && budget.remaining_queries() > 0 {
            if let Some(refined) = self.run_refinement(&sources).await {
                let mut refined_queries = refined;
                self.execute_research_round(&mut refined_queries, budget, &mut sources).await;
            }
        }

        let mut iteration = 0;
        while iteration < self.manifest.budgets.max_research_iterations {
            if budget.remaining_queries() == 0 || budget.remaining_fetches() == 0 {
                break;
            }
            iteration += 1;
            let gap_analysis = self.run_gap_analysis(&sources).await;
            if gap_analysis.sufficient {
                break;
            }
            if gap_analysis.additional_queries.is_empty() {
                break;
            }
            let mut additional = gap_analysis.additional_queries;
            self.execute_research_round(&mut additional, budget, &mut sources).await;
        }

        sources
    }

    async fn execute_research_round(&self, queries: &mut Vec<String>, budget: &mut ResearchBudget, sources: &mut Vec<ResearchSource>) {
        for query in queries.drain(..) {
            if budget.remaining_queries() == 0 {
                break;
            }
            budget.queries_used += 1;

            let max_results = self.manifest.budgets.max_urls_per_query as usize;
            let Ok(results) = self.web.search_web(&query, max_results).await else { continue };

            for result in results.into_iter().take(max_results) {
                if budget.remaining_fetches() == 0 {
                    return;
                }
                budget.fetches_used += 1;
                if let Ok(page) = self.web.fetch_page(&result.url, self.manifest.budgets.max_chars_per_page).await {
                    sources.push(ResearchSource {
                        url: page.url,
                        title: page.title,
                        char_count: page.content.chars().count(),
                    });
                }
            }
        }
    }

    async fn run_refinement(&self, sources: &[ResearchSource]) -> Option<Vec<String>> {
        let system_prompt = "Given the sources fetched so far, suggest refined search queries to \
            fill gaps. Respond with strict JSON: {\"queries\": [string]}."
            .to_string();
        let user_message = format!("SOURCES SO FAR\n{}", source_list_text(sources));
        let request = LlmRequest {
            system_prompt,
            user_message,
            agent_id: None,
            mission_step_id: None,
            tier: ModelTier::Cheap,
        };
        let response = self.llm.call(request).await.ok()?;
        let cleaned = crate::services::decomposition_engine::strip_code_fences(&response.content);
        let value: serde_json::Value = serde_json::from_str(&cleaned).ok()?;
        value.get("queries")?.as_array().map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
    }

    async fn run_gap_analysis(&self, sources: &[ResearchSource]) -> GapAnalysis {
        let system_prompt = "Analyze whether the sources fetched so far are sufficient. Respond \
            with strict JSON: {\"gaps\": [string], \"additional_queries\": [string], \"sufficient\": bool}."
            .to_string();
        let user_message = format!("SOURCES SO FAR\n{}", source_list_text(sources));
        let request = LlmRequest {
            system_prompt,
            user_message,
            agent_id: None,
            mission_step_id: None,
            tier: ModelTier::Cheap,
        };

        let Ok(response) = self.llm.call(request).await else {
            return GapAnalysis { sufficient: true, additional_queries: vec![] };
        };
        parse_gap_analysis(&response.content)
    }

    async fn run_synthesize(
        &self,
        step: &Step,
        decompose: &DecomposeOutput,
        sources: &[ResearchSource],
        persona_system_prompt: &str,
    ) -> String {
        let system_prompt = format!(
            "{persona_system_prompt}\n\nUse ONLY these sources; never fabricate; if data is unavailable, say so."
        );
        let user_message = format!(
            "TASK\n{}\n\nKEY REQUIREMENTS\n{}\n\nAVAILABLE SOURCES\n{}",
            step.task_description,
            decompose.key_requirements.join("\n"),
            source_list_text(sources),
        );

        let request = LlmRequest {
            system_prompt,
            user_message,
            agent_id: step.assigned_agent_id,
            mission_step_id: Some(step.id),
            tier: step.model_tier,
        };

        self.llm.call(request).await.map(|r| r.content).unwrap_or_default()
    }

    async fn run_critique(&self, step: &Step, artifact: &str, citation_score: Option<f64>) -> CritiqueOutcome {
        let citation_context = citation_score.map(|s| format!("\nUpstream citation score: {s:.2}")).unwrap_or_default();
        let system_prompt = format!(
            "Score this artifact on four dimensions 1-5: completeness, accuracy, actionability, depth. \
             3.0 is GOOD. 4.0 is EXCELLENT. 5.0 is rare. Average output should score 2.5-3.0. \
             Be BRUTALLY HONEST.{citation_context}\n\nRespond with strict JSON: \
             {{\"completeness\": number, \"accuracy\": number, \"actionability\": number, \"depth\": number, \"feedback\": string}}."
        );

        let request = LlmRequest {
            system_prompt,
            user_message: artifact.to_string(),
            agent_id: step.assigned_agent_id,
            mission_step_id: Some(step.id),
            tier: ModelTier::Cheap,
        };

        let Ok(response) = self.llm.call(request).await else {
            return CritiqueOutcome { scores: CritiqueScores::moderate_default(), feedback: None, lesson: None };
        };
        parse_critique_response(&response.content)
    }

    async fn run_revise(&self, step: &Step, artifact: &str, feedback: &Option<String>) -> Option<String> {
        let system_prompt = "Revise the artifact below to address the feedback. Return only the \
            revised artifact text."
            .to_string();
        let user_message = format!("ARTIFACT\n{artifact}\n\nFEEDBACK\n{}", feedback.clone().unwrap_or_default());

        let request = LlmRequest {
            system_prompt,
            user_message,
            agent_id: step.assigned_agent_id,
            mission_step_id: Some(step.id),
            tier: step.model_tier,
        };

        match self.llm.call(request).await {
            Ok(response) if !response.content.trim().is_empty() => Some(response.content),
            _ => {
                warn!(step_id = %step.id, "revise phase failed, keeping prior artifact");
                None
            }
        }
    }
}

struct GapAnalysis {
    sufficient: bool,
    additional_queries: Vec<String>,
}

struct CritiqueOutcome {
    scores: CritiqueScores,
    feedback: Option<String>,
    lesson: Option<String>,
}

fn source_list_text(sources: &[ResearchSource]) -> String {
    if sources.is_empty() {
        return "none".to_string();
    }
    sources
        .iter()
        .map(|s| format!("- {} ({}, {} chars)", s.url, s.title, s.char_count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_decompose_response(content: &str) -> DecomposeOutput {
    let cleaned = crate::services::decomposition_engine::strip_code_fences(content);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) else {
        return DecomposeOutput::default();
    };
    let string_array = |key: &str| -> Vec<String> {
        value
            .get(key)
            .and_then(serde_json::Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    };
    DecomposeOutput {
        sub_questions: string_array("sub_questions"),
        queries: string_array("queries"),
        key_requirements: string_array("key_requirements"),
    }
}

fn parse_gap_analysis(content: &str) -> GapAnalysis {
    let cleaned = crate::services::decomposition_engine::strip_code_fences(content);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) else {
        return GapAnalysis { sufficient: true, additional_queries: vec![] };
    };
    let sufficient = value.get("sufficient").and_then(serde_json::Value::as_bool).unwrap_or(true);
    let additional_queries = value
        .get("additional_queries")
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    GapAnalysis { sufficient, additional_queries }
}

fn parse_critique_response(content: &str) -> CritiqueOutcome {
    let cleaned = crate::services::decomposition_engine::strip_code_fences(content);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) else {
        return CritiqueOutcome { scores: CritiqueScores::moderate_default(), feedback: None, lesson: None };
    };

    let dim = |key: &str| value.get(key).and_then(serde_json::Value::as_f64);
    // `dataBacked` is a legacy alias for `accuracy` (§4.4).
    let accuracy = dim("accuracy").or_else(|| dim("dataBacked")).unwrap_or(3.0);
    let scores = CritiqueScores {
        completeness: dim("completeness").unwrap_or(3.0),
        accuracy,
        actionability: dim("actionability").unwrap_or(3.0),
        depth: dim("depth").unwrap_or(3.0),
    };
    let feedback = value.get("feedback").and_then(serde_json::Value::as_str).map(str::to_string);
    CritiqueOutcome { scores, feedback: feedback.clone(), lesson: feedback }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_critique_defaults_to_moderate_no_revision() {
        let outcome = parse_critique_response("garbage");
        assert_eq!(outcome.scores.average(), 3.0);
        assert!(!outcome.scores.needs_revision());
    }

    #[test]
    fn exactly_three_on_every_dimension_does_not_revise() {
        let scores = CritiqueScores { completeness: 3.0, accuracy: 3.0, actionability: 3.0, depth: 3.0 };
        assert!(!scores.needs_revision());
    }

    #[test]
    fn any_dimension_below_three_triggers_revision() {
        let scores = CritiqueScores { completeness: 2.9, accuracy: 4.0, actionability: 4.0, depth: 4.0 };
        assert!(scores.needs_revision());
    }

    #[test]
    fn low_average_triggers_revision_even_if_no_single_dim_below_three() {
        let scores = CritiqueScores { completeness: 3.0, accuracy: 3.0, actionability: 3.4, depth: 3.4 };
        assert!(scores.average() < 3.5);
        assert!(scores.needs_revision());
    }

    #[test]
    fn legacy_data_backed_alias_maps_to_accuracy() {
        let content = r#"{"completeness": 3, "dataBacked": 4, "actionability": 3, "depth": 3}"#;
        let outcome = parse_critique_response(content);
        assert_eq!(outcome.scores.accuracy, 4.0);
    }

    #[test]
    fn decompose_parse_failure_degrades_to_empty_structure() {
        let output = parse_decompose_response("not json");
        assert!(output.queries.is_empty());
        assert!(output.sub_questions.is_empty());
    }
}
