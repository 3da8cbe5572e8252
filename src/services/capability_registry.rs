//! Capability Registry (§4.1): the static, process-wide table behind plan
//! feasibility gating. Produces the manifest text injected into planning and
//! feasibility prompts, and runs the cheap-tier feasibility check itself.

use std::fmt::Write as _;

use crate::domain::models::{CapabilityManifest, DecompositionPlan, ModelTier, RoleCapability};
use crate::domain::ports::llm::{LlmClient, LlmRequest};

/// One task's feasibility issue, keyed by its synthetic task id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeasibilityIssue {
    pub task_id: String,
    pub issue: String,
}

#[derive(Debug, Clone, Default)]
pub struct FeasibilityResult {
    pub feasible: bool,
    pub issues: Vec<FeasibilityIssue>,
}

/// Default roster of role capabilities. Process-local immutable state (§5);
/// a real deployment could load this from config, but the manifest content
/// itself is the single source of truth for planning and execution limits
/// regardless of where it is defined.
pub fn default_manifest() -> CapabilityManifest {
    let mut manifest = CapabilityManifest::default();
    for role in [
        RoleCapability {
            role: "generalist".to_string(),
            tools: vec!["web_search".to_string(), "web_fetch".to_string()],
            strengths: vec!["broad research".to_string(), "synthesis".to_string()],
            cannots: vec!["cannot approve its own step".to_string()],
        },
        RoleCapability {
            role: "engineer".to_string(),
            tools: vec!["web_fetch".to_string()],
            strengths: vec!["code design".to_string(), "implementation detail".to_string()],
            cannots: vec!["cannot make brand or strategic calls".to_string()],
        },
        RoleCapability {
            role: "qa".to_string(),
            tools: vec![],
            strengths: vec!["rubric scoring".to_string(), "citation checking".to_string()],
            cannots: vec!["cannot review its own assigned step".to_string()],
        },
    ] {
        manifest.roles.insert(role.role.clone(), role);
    }
    manifest
}

/// Builds the textual manifest block: per-role tools/strengths/cannots, the
/// global numeric budget section, and the MapReduce splitting rule (§4.1).
pub fn build_manifest(manifest: &CapabilityManifest) -> String {
    let mut out = String::new();
    out.push_str("CAPABILITY MANIFEST\n\n");

    let mut roles: Vec<&RoleCapability> = manifest.roles.values().collect();
    roles.sort_by(|a, b| a.role.cmp(&b.role));
    for role in roles {
        let _ = writeln!(out, "## {}", role.role);
        let _ = writeln!(out, "Tools: {}", if role.tools.is_empty() { "none".to_string() } else { role.tools.join(", ") });
        let _ = writeln!(out, "Strengths: {}", role.strengths.join(", "));
        for cannot in &role.cannots {
            let _ = writeln!(out, "CANNOT: {cannot}");
        }
        out.push('\n');
    }

    let budgets = manifest.budgets;
    out.push_str("## Global constraints\n");
    let _ = writeln!(out, "{} queries/step", budgets.max_search_queries_per_step);
    let _ = writeln!(out, "{} fetches/step", budgets.max_page_fetches_per_step);
    let _ = writeln!(out, "{} URLs/query", budgets.max_urls_per_query);
    let _ = writeln!(out, "~{} chars/page", budgets.max_chars_per_page);
    let _ = writeln!(
        out,
        "{}-{} research iterations",
        budgets.min_research_iterations, budgets.max_research_iterations
    );
    out.push_str(
        "\nRules: acceptance criteria must be achievable inside one step's budget; \
         work covering more than N items must be split into multiple parallel steps \
         with a synthesis step merging them (MapReduce pattern).\n",
    );
    out
}

/// A cheap-tier LLM call scoring each task's achievability against the
/// manifest. Fail-open: any parse error returns `{feasible: true, issues: []}`
/// — validation must never block on itself (§4.1).
pub async fn validate_feasibility(
    llm: &dyn LlmClient,
    manifest: &CapabilityManifest,
    plan: &DecompositionPlan,
) -> FeasibilityResult {
    let manifest_text = build_manifest(manifest);
    let mut task_list = String::new();
    for task in &plan.tasks {
        let _ = writeln!(
            task_list,
            "{}: {} (role: {}, criteria: {})",
            task.task_id,
            task.description,
            task.required_role,
            task.acceptance_criteria.join("; ")
        );
    }

    let system_prompt = "You score whether each task in a plan is achievable inside one \
         step's tool budget, given the manifest below. Respond with strict JSON: \
         {\"feasible\": bool, \"issues\": [{\"task_id\": string, \"issue\": string}]}."
        .to_string();
    let user_message = format!("{manifest_text}\n\nTASKS\n{task_list}");

    let request = LlmRequest {
        system_prompt,
        user_message,
        agent_id: None,
        mission_step_id: None,
        tier: ModelTier::Cheap,
    };

    let Ok(response) = llm.call(request).await else {
        return FeasibilityResult { feasible: true, issues: vec![] };
    };

    parse_feasibility_response(&response.content)
}

fn parse_feasibility_response(content: &str) -> FeasibilityResult {
    let stripped = crate::services::decomposition_engine::strip_code_fences(content);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&stripped) else {
        return FeasibilityResult { feasible: true, issues: vec![] };
    };

    let feasible = value.get("feasible").and_then(serde_json::Value::as_bool).unwrap_or(true);
    let issues = value
        .get("issues")
        .and_then(serde_json::Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|item| {
                    let task_id = item.get("task_id")?.as_str()?.to_string();
                    let issue = item.get("issue")?.as_str()?.to_string();
                    Some(FeasibilityIssue { task_id, issue })
                })
                .collect()
        })
        .unwrap_or_default();

    FeasibilityResult { feasible, issues }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_includes_global_budgets() {
        let text = build_manifest(&default_manifest());
        assert!(text.contains("6 queries/step"));
        assert!(text.contains("16 fetches/step"));
        assert!(text.contains("MapReduce"));
    }

    #[test]
    fn malformed_feasibility_response_fails_open() {
        let result = parse_feasibility_response("not json at all");
        assert!(result.feasible);
        assert!(result.issues.is_empty());
    }

    #[test]
    fn parses_infeasible_response_with_issues() {
        let content = r#"{"feasible": false, "issues": [{"task_id": "T2", "issue": "needs more budget"}]}"#;
        let result = parse_feasibility_response(content);
        assert!(!result.feasible);
        assert_eq!(result.issues[0].task_id, "T2");
    }
}
