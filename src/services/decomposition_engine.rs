//! Decomposition Engine (§4.2): directive -> plan -> feasibility -> optional
//! re-plan -> persist -> hire -> two-pass step materialization.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::error::{PlanError, ServiceError};
use crate::domain::models::{
    Agent, AgentStatus, ApproachMemoryEntry, DecompositionPlan, EndStateTag, EscalationType,
    ModelTier, PlanStatus, PlanTask, Step,
};
use crate::domain::ports::llm::{LlmClient, LlmRequest};
use crate::domain::ports::store::Store;
use crate::services::capability_registry::{self, FeasibilityResult};
use crate::services::dag_validator;
use crate::services::external_mirror_sync::ExternalMirrorSync;

pub struct DecomposeInput {
    pub mission_id: Uuid,
    pub directive: String,
    pub planner_agent_id: Uuid,
}

#[derive(Debug)]
pub enum DecompositionOutcome {
    Escalated { escalation_type: EscalationType, reason: String },
    Created { plan: DecompositionPlan, step_ids: HashMap<String, Uuid> },
}

pub struct DecompositionEngine {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    mirror_sync: Arc<ExternalMirrorSync>,
    manifest: crate::domain::models::CapabilityManifest,
}

impl DecompositionEngine {
    pub fn new(store: Arc<dyn Store>, llm: Arc<dyn LlmClient>, mirror_sync: Arc<ExternalMirrorSync>) -> Self {
        Self { store, llm, mirror_sync, manifest: capability_registry::default_manifest() }
    }

    pub async fn decompose(&self, input: DecomposeInput) -> Result<DecompositionOutcome, ServiceError> {
        let roster = self.store.get_roster().await?;
        let topic_tags = extract_topic_tags(&input.directive);
        let approach_hints = self.approach_hints(&topic_tags).await?;

        let mut plan = match self.call_planner(&input.directive, &roster, &approach_hints, None).await {
            Some(parsed) => parsed,
            None => {
                warn!(mission_id = %input.mission_id, "planner JSON unparsable, falling back to single-task plan");
                DecompositionPlan::fallback(input.mission_id, &input.directive)
            }
        };
        plan.mission_id = input.mission_id;

        if !plan.is_fallback() {
            dag_validator::validate(&plan.tasks).map_err(|err| {
                warn!(mission_id = %input.mission_id, error = %err, "plan rejected: dependency cycle");
                err
            })?;

            let feasibility = capability_registry::validate_feasibility(self.llm.as_ref(), &self.manifest, &plan).await;
            if !feasibility.feasible {
                if let Some(replanned) = self.replan_with_feedback(&input.directive, &roster, &approach_hints, &feasibility).await {
                    if dag_validator::is_acyclic(&replanned.tasks) {
                        plan = replanned;
                        plan.mission_id = input.mission_id;
                    }
                }
                // Two total validation rounds maximum: whatever plan survives
                // here is accepted regardless of the second feasibility
                // result (§4.2 step 6 — never loop forever).
            }
        }

        self.store.save_plan(&plan).await?;

        for role in &plan.hiring_needed {
            self.hire_agent(role).await?;
        }

        if plan.escalation_needed {
            let reason = plan.escalation_reason.clone().unwrap_or_default();
            let escalation_type = EscalationType::infer_from_reason(&reason);
            self.store.create_escalation(input.mission_id, escalation_type, &reason).await?;
            return Ok(DecompositionOutcome::Escalated { escalation_type, reason });
        }

        let roster_after_hires = self.store.get_roster().await?;
        let role_assignee = build_role_assignee_map(&roster_after_hires, &plan.tasks);

        let mut step_ids: HashMap<String, Uuid> = HashMap::new();
        for task in &plan.tasks {
            let mut step = Step::new(
                input.mission_id,
                ModelTier::Medium,
                task.parallel_group,
                None,
                task.description.clone(),
                task.acceptance_criteria.clone(),
            );
            step.assigned_agent_id = role_assignee.get(task.required_role.as_str()).copied();
            self.store.create_step(&step).await?;
            step_ids.insert(task.task_id.clone(), step.id);
        }

        for task in &plan.tasks {
            let Some(&step_id) = step_ids.get(task.task_id.as_str()) else { continue };
            for dep_task_id in &task.depends_on {
                let Some(&depends_on_step_id) = step_ids.get(dep_task_id.as_str()) else { continue };
                let dependency = crate::domain::models::StepDependency {
                    id: Uuid::new_v4(),
                    step_id,
                    depends_on_step_id,
                    dependency_type: crate::domain::models::StepDependencyType::Blocks,
                };
                self.store.add_dependency(&dependency).await?;
            }
        }

        self.fire_and_forget_sync_and_memory(&input, &plan, &step_ids, &topic_tags).await;

        info!(mission_id = %input.mission_id, task_count = plan.tasks.len(), "decomposition complete");
        Ok(DecompositionOutcome::Created { plan, step_ids })
    }

    async fn approach_hints(&self, topic_tags: &[String]) -> Result<Vec<ApproachMemoryEntry>, ServiceError> {
        let mut entries = self.store.list_approach_memory().await?;
        entries.retain(|entry| entry.tag_overlap_score(topic_tags) > 0.0);
        entries.sort_by(|a, b| {
            b.critique_score
                .partial_cmp(&a.critique_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(3);
        Ok(entries)
    }

    async fn call_planner(
        &self,
        directive: &str,
        roster: &[Agent],
        approach_hints: &[ApproachMemoryEntry],
        feedback: Option<&FeasibilityResult>,
    ) -> Option<DecompositionPlan> {
        let system_prompt = PLAN_SCHEMA_INSTRUCTION.to_string();
        let manifest_text = capability_registry::build_manifest(&self.manifest);
        let roster_text = format_roster(roster);
        let hints_text = format_approach_hints(approach_hints);
        let mut user_message = format!(
            "DIRECTIVE\n{directive}\n\nROSTER\n{roster_text}\n\n{manifest_text}\n\nAPPROACH HINTS\n{hints_text}"
        );
        if let Some(result) = feedback {
            let issues: Vec<String> = result.issues.iter().map(|i| format!("{}: {}", i.task_id, i.issue)).collect();
            user_message.push_str(&format!("\n\nFEEDBACK FROM PRIOR FEASIBILITY CHECK\n{}", issues.join("\n")));
        }

        let request = LlmRequest {
            system_prompt,
            user_message,
            agent_id: None,
            mission_step_id: None,
            tier: ModelTier::Medium,
        };

        let response = self.llm.call(request).await.ok()?;
        parse_plan_json(&response.content)
    }

    async fn replan_with_feedback(
        &self,
        directive: &str,
        roster: &[Agent],
        approach_hints: &[ApproachMemoryEntry],
        feasibility: &FeasibilityResult,
    ) -> Option<DecompositionPlan> {
        self.call_planner(directive, roster, approach_hints, Some(feasibility)).await
    }

    async fn hire_agent(&self, role: &str) -> Result<(), ServiceError> {
        let agent = Agent {
            id: Uuid::new_v4(),
            role: role.to_string(),
            team_id: Some(Uuid::new_v4()),
            status: AgentStatus::Active,
            current_persona_id: None,
        };
        self.store.hire_agent(&agent).await.map_err(ServiceError::Store)
    }

    async fn fire_and_forget_sync_and_memory(
        &self,
        input: &DecomposeInput,
        plan: &DecompositionPlan,
        step_ids: &HashMap<String, Uuid>,
        topic_tags: &[String],
    ) {
        if let Ok(Some(mission)) = self.store.get_mission(input.mission_id).await {
            self.mirror_sync.sync_mission_created(&mission).await;
            for task in &plan.tasks {
                if let Some(&step_id) = step_ids.get(task.task_id.as_str()) {
                    if let Ok(Some(step)) = self.store.get_step(step_id).await {
                        self.mirror_sync.sync_step_created(&mission, &step).await;
                    }
                }
            }
        }

        let summary = format!("end_state={}, tasks={}", plan.end_state.as_str(), plan.tasks.len());
        let entry = ApproachMemoryEntry::new(input.mission_id, topic_tags.to_vec(), summary, 3.0);
        if let Err(err) = self.store.save_approach_memory(&entry).await {
            warn!(mission_id = %input.mission_id, error = %err, "failed to persist approach memory");
        }
    }
}

fn build_role_assignee_map(roster: &[Agent], tasks: &[PlanTask]) -> HashMap<String, Uuid> {
    let mut map = HashMap::new();
    for task in tasks {
        if map.contains_key(task.required_role.as_str()) {
            continue;
        }
        let assignee = roster
            .iter()
            .find(|agent| agent.role == task.required_role && agent.status == AgentStatus::Active)
            .or_else(|| roster.iter().find(|agent| agent.status == AgentStatus::Active))
            .map(|agent| agent.id);
        if let Some(id) = assignee {
            map.insert(task.required_role.clone(), id);
        }
    }
    map
}

fn format_roster(roster: &[Agent]) -> String {
    roster
        .iter()
        .map(|agent| {
            let tag = if agent.role == "qa" { "QA" } else if agent.team_id.is_none() { "" } else { "Lead" };
            format!("{} ({}) [{}]", agent.id, agent.role, tag)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_approach_hints(entries: &[ApproachMemoryEntry]) -> String {
    if entries.is_empty() {
        return "none".to_string();
    }
    entries
        .iter()
        .map(|entry| format!("- {} (score {:.1})", entry.approach_summary, entry.critique_score))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase, punctuation-stripped, stopword- and length-filtered tokens used
/// for approach-memory tag overlap (§4.2 step 2).
fn extract_topic_tags(directive: &str) -> Vec<String> {
    const STOPWORDS: &[&str] = &["the", "and", "for", "with", "that", "this", "from", "into", "our"];
    let mut seen = std::collections::HashSet::new();
    directive
        .split_whitespace()
        .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase())
        .filter(|word| word.len() > 2 && !STOPWORDS.contains(&word.as_str()))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

const PLAN_SCHEMA_INSTRUCTION: &str = r#"You are a planning assistant. Decompose the directive into a JSON plan.
Respond with ONLY JSON matching this schema, no markdown fences, no commentary:
{
  "tasks": [{"task_id": "T1", "description": string, "required_role": string, "parallel_group": integer, "depends_on": [string], "acceptance_criteria": [string]}],
  "end_state": "production_docs" | "working_prototype" | "hybrid",
  "escalation_needed": boolean,
  "escalation_reason": string | null,
  "hiring_needed": [string]
}"#;

/// Strips a leading/trailing markdown code fence (```` ``` ```` or
/// ` ```json `), if present. LLM JSON parsing must never throw (§9).
pub(crate) fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    let Some(stripped) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    let without_lang = stripped.strip_prefix("json").unwrap_or(stripped);
    without_lang.trim_start_matches('\n').trim_end().trim_end_matches("```").trim().to_string()
}

fn parse_plan_json(content: &str) -> Option<DecompositionPlan> {
    let cleaned = strip_code_fences(content);
    let value: serde_json::Value = serde_json::from_str(&cleaned).ok()?;

    let tasks: Vec<PlanTask> = value.get("tasks")?.as_array()?.iter().filter_map(parse_plan_task).collect();
    if tasks.is_empty() {
        return None;
    }

    let end_state = value
        .get("end_state")
        .and_then(serde_json::Value::as_str)
        .and_then(EndStateTag::from_str)
        .unwrap_or(EndStateTag::Hybrid);
    let escalation_needed = value.get("escalation_needed").and_then(serde_json::Value::as_bool).unwrap_or(false);
    let escalation_reason = value
        .get("escalation_reason")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string);
    let hiring_needed = value
        .get("hiring_needed")
        .and_then(serde_json::Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    Some(DecompositionPlan {
        id: Uuid::new_v4(),
        mission_id: Uuid::nil(),
        tasks,
        end_state,
        escalation_needed,
        escalation_reason,
        hiring_needed,
        status: PlanStatus::Active,
        created_at: chrono::Utc::now(),
    })
}

fn parse_plan_task(value: &serde_json::Value) -> Option<PlanTask> {
    Some(PlanTask {
        task_id: value.get("task_id")?.as_str()?.to_string(),
        description: value.get("description")?.as_str()?.to_string(),
        required_role: value.get("required_role").and_then(serde_json::Value::as_str).unwrap_or("generalist").to_string(),
        parallel_group: value.get("parallel_group").and_then(serde_json::Value::as_i64).unwrap_or(1),
        depends_on: value
            .get("depends_on")
            .and_then(serde_json::Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
        acceptance_criteria: value
            .get("acceptance_criteria")
            .and_then(serde_json::Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_code_fence() {
        let content = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(content), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_code_fence() {
        let content = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(content), "{\"a\": 1}");
    }

    #[test]
    fn parses_a_well_formed_plan() {
        let content = r#"{
            "tasks": [{"task_id": "T1", "description": "do it", "required_role": "engineer", "parallel_group": 1, "depends_on": [], "acceptance_criteria": ["works"]}],
            "end_state": "working_prototype",
            "escalation_needed": false,
            "escalation_reason": null,
            "hiring_needed": []
        }"#;
        let plan = parse_plan_json(content).unwrap();
        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.end_state, EndStateTag::WorkingPrototype);
    }

    #[test]
    fn malformed_json_returns_none() {
        assert!(parse_plan_json("not json").is_none());
    }

    #[test]
    fn extract_topic_tags_lowercases_and_dedupes() {
        let tags = extract_topic_tags("Build A Build system for the widget");
        assert!(tags.contains(&"build".to_string()));
        assert!(tags.contains(&"widget".to_string()));
        assert_eq!(tags.iter().filter(|t| *t == "build").count(), 1);
    }

    #[test]
    fn role_assignee_map_prefers_matching_role() {
        let engineer = Agent { id: Uuid::new_v4(), role: "engineer".into(), team_id: Some(Uuid::new_v4()), status: AgentStatus::Active, current_persona_id: None };
        let roster = vec![engineer.clone()];
        let tasks = vec![PlanTask {
            task_id: "T1".into(),
            description: String::new(),
            required_role: "engineer".into(),
            parallel_group: 1,
            depends_on: vec![],
            acceptance_criteria: vec![],
        }];
        let map = build_role_assignee_map(&roster, &tasks);
        assert_eq!(map.get("engineer"), Some(&engineer.id));
    }
}
