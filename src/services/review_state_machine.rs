//! Review & Revision State Machine (§4.5): QA -> team-lead approval chain,
//! rubric parsing, auto-reject gate, 3-strike cap, persona upgrade hook.

use std::sync::Arc;

use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::error::{ReviewError, ServiceError};
use crate::domain::models::{Agent, Approval, ApprovalStatus, ModelTier, ReviewType, Step, StepStatus};
use crate::domain::ports::llm::{LlmClient, LlmRequest};
use crate::domain::ports::mirror::MirrorIssueState;
use crate::domain::ports::store::Store;
use crate::services::completion_cascade::CompletionCascade;
use crate::services::event_sink::EventSink;
use crate::services::external_mirror_sync::ExternalMirrorSync;

/// Rejections beyond this count fail the step outright (invariant I5).
const REVISION_CAP: u32 = 3;
/// Unreachable under `REVISION_CAP` but kept as a latent hook (§9 Open
/// Question b): a persona-upgrade trigger fires if this count is ever hit.
const PERSONA_UPGRADE_THRESHOLD: u32 = 5;

const RUBRIC_CRITERIA: [&str; 5] = ["relevance", "depth", "actionability", "accuracy", "executive quality"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
struct ParsedReview {
    overall: f64,
    verdict: Verdict,
    feedback: Option<String>,
    auto_rejected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    EnqueuedTeamLead,
    StepCompleted,
    SentBackForRevision,
    StepFailedRevisionCap,
    NoPendingApprovals,
}

pub struct ReviewStateMachine {
    store: Arc<dyn Store>,
    llm: Arc<dyn LlmClient>,
    mirror_sync: Arc<ExternalMirrorSync>,
    events: Arc<EventSink>,
    completion_cascade: Arc<CompletionCascade>,
}

impl ReviewStateMachine {
    pub fn new(
        store: Arc<dyn Store>,
        llm: Arc<dyn LlmClient>,
        mirror_sync: Arc<ExternalMirrorSync>,
        events: Arc<EventSink>,
        completion_cascade: Arc<CompletionCascade>,
    ) -> Self {
        Self { store, llm, mirror_sync, events, completion_cascade }
    }

    /// Picks one pending approval per tick, QA ahead of team-lead (lower
    /// priority), and processes it to completion.
    pub async fn process_next_pending(&self) -> Result<ReviewOutcome, ServiceError> {
        let mut pending = self.store.get_pending_approvals(ReviewType::Qa, 1).await?;
        if pending.is_empty() {
            pending = self.store.get_pending_approvals(ReviewType::TeamLead, 1).await?;
        }
        let Some(approval) = pending.into_iter().next() else {
            return Ok(ReviewOutcome::NoPendingApprovals);
        };

        self.process_approval(approval).await
    }

    async fn process_approval(&self, mut approval: Approval) -> Result<ReviewOutcome, ServiceError> {
        let Some(step) = self.store.get_step(approval.step_id).await? else {
            return Ok(ReviewOutcome::NoPendingApprovals);
        };
        let assignee_id = step.assigned_agent_id.unwrap_or_else(Uuid::nil);

        let roster = self.store.get_roster().await?;
        let reviewer = roster
            .iter()
            .find(|agent| agent.id == approval.reviewer_agent_id && agent.eligible_reviewer_for(assignee_id))
            .or_else(|| roster.iter().find(|agent| agent.eligible_reviewer_for(assignee_id)))
            .ok_or(ReviewError::NoEligibleReviewer(step.id))?;

        let assignee_role = step
            .assigned_agent_id
            .and_then(|id| roster.iter().find(|a| a.id == id))
            .map(|a| a.role.clone())
            .unwrap_or_default();

        let prompt = build_review_prompt(&step, reviewer, approval.review_type, &assignee_role);
        let tier = match approval.review_type {
            ReviewType::Qa => ModelTier::Cheap,
            ReviewType::TeamLead => ModelTier::Medium,
        };

        let request = LlmRequest {
            system_prompt: prompt.system_prompt,
            user_message: prompt.user_message,
            agent_id: Some(reviewer.id),
            mission_step_id: Some(step.id),
            tier,
        };

        let content = self.llm.call(request).await.map(|r| r.content).unwrap_or_default();
        let parsed = parse_review_response(&content);

        approval.feedback = parsed.feedback.clone();
        approval.reviewed_at = Some(chrono::Utc::now());

        match parsed.verdict {
            Verdict::Approve => {
                approval.status = ApprovalStatus::Approved;
                self.store.update_approval(&approval).await?;
                self.on_approve(&step, approval.review_type).await
            }
            Verdict::Reject => {
                approval.status = ApprovalStatus::Rejected;
                self.store.update_approval(&approval).await?;
                self.on_reject(&step, &parsed).await
            }
        }
    }

    async fn on_approve(&self, step: &Step, review_type: ReviewType) -> Result<ReviewOutcome, ServiceError> {
        match review_type {
            ReviewType::Qa => {
                let roster = self.store.get_roster().await?;
                let assignee_id = step.assigned_agent_id.unwrap_or_else(Uuid::nil);
                let team_lead = roster
                    .iter()
                    .find(|agent| agent.eligible_reviewer_for(assignee_id))
                    .ok_or(ReviewError::NoEligibleReviewer(step.id))?;
                let approval = Approval::new_pending(step.id, team_lead.id, ReviewType::TeamLead);
                self.store.create_approval(&approval).await?;
                Ok(ReviewOutcome::EnqueuedTeamLead)
            }
            ReviewType::TeamLead => {
                self.store.set_step_status(step.id, StepStatus::Completed).await?;
                self.events.task_completed(step.id).await;
                self.mirror_sync.sync_step_state(step.id, MirrorIssueState::Done).await;
                self.completion_cascade.on_step_finalized(step).await?;
                Ok(ReviewOutcome::StepCompleted)
            }
        }
    }

    async fn on_reject(&self, step: &Step, parsed: &ParsedReview) -> Result<ReviewOutcome, ServiceError> {
        // `update_approval` above already persisted this rejection, so
        // `count_rejections` already includes it; no `+ 1` here, or a step
        // would fail after two rejections instead of three.
        let total = self.store.count_rejections(step.id).await?;

        if total >= PERSONA_UPGRADE_THRESHOLD {
            if let Some(agent_id) = step.assigned_agent_id {
                self.maybe_upskill_agent(agent_id, parsed.feedback.as_deref().unwrap_or_default()).await?;
            }
        }

        if total < REVISION_CAP {
            self.store.increment_revision_count(step.id).await?;
            self.store.set_step_status(step.id, StepStatus::Pending).await?;
            if let Some(feedback) = &parsed.feedback {
                info!(step_id = %step.id, "review rejected, sending back for revision");
                self.mirror_sync.post_feedback_comment(step.id, feedback).await;
            }
            Ok(ReviewOutcome::SentBackForRevision)
        } else {
            self.store.set_step_status(step.id, StepStatus::Failed).await?;
            self.events.revision_cap_reached(step.id).await;
            self.mirror_sync.sync_step_state(step.id, MirrorIssueState::Canceled).await;
            warn!(step_id = %step.id, "revision cap reached, step failed");
            Ok(ReviewOutcome::StepFailedRevisionCap)
        }
    }

    /// Persona-upgrade trigger (§4.5 step 7, §9 Open Question b): unreachable
    /// in the main flow because the 3-strike cap fails the step first, but
    /// kept as a latent hook rather than removed as dead code.
    async fn maybe_upskill_agent(&self, agent_id: Uuid, feedback: &str) -> Result<(), ServiceError> {
        let Some(agent) = self.store.get_agent(agent_id).await? else {
            return Ok(());
        };
        let Some(persona_id) = agent.current_persona_id else {
            return Ok(());
        };

        let system_prompt = "Analyze these rejection feedbacks and identify a SKILL_GAP and an \
            EXPERTISE_ADDITION to append to the agent's persona. Respond with strict JSON: \
            {\"skill_gap\": string, \"expertise_addition\": string}."
            .to_string();
        let request = LlmRequest {
            system_prompt,
            user_message: feedback.to_string(),
            agent_id: Some(agent_id),
            mission_step_id: None,
            tier: ModelTier::Cheap,
        };

        let Ok(response) = self.llm.call(request).await else { return Ok(()) };
        let cleaned = crate::services::decomposition_engine::strip_code_fences(&response.content);
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) else { return Ok(()) };
        let Some(expertise_addition) = value.get("expertise_addition").and_then(serde_json::Value::as_str) else {
            return Ok(());
        };

        let new_content = match self.store.get_persona(persona_id).await? {
            Some(existing) => existing.upgraded_content(expertise_addition),
            None => format!("[Acquired expertise] {expertise_addition}"),
        };
        let new_persona = crate::domain::models::Persona::new(agent_id, new_content);
        self.store.add_persona(&new_persona).await?;
        self.store.set_agent_persona(agent_id, new_persona.id).await?;
        self.events.agent_upskilled(agent_id, expertise_addition).await;
        Ok(())
    }
}

struct ReviewPrompt {
    system_prompt: String,
    user_message: String,
}

fn build_review_prompt(step: &Step, reviewer: &Agent, review_type: ReviewType, assignee_role: &str) -> ReviewPrompt {
    let mut system_prompt = format!(
        "You are a {} reviewer for role {}. Score the deliverable on a 5-criterion rubric, \
         each 1-5: Relevance, Depth, Actionability, Accuracy, Executive Quality. Respond with \
         SCORES, VERDICT, and FEEDBACK sections. The VERDICT section must contain exactly one \
         of [APPROVE] or [REJECT].",
        reviewer.role, assignee_role
    );

    // QA scope adjustment (§4.5 step 3): restrict QA reviewers on
    // non-engineering tasks to technical quality, citations, and acceptance
    // criteria, not domain expertise.
    if matches!(review_type, ReviewType::Qa) && assignee_role != "engineer" {
        system_prompt.push_str(
            "\n\nSCOPE: you may only judge technical quality, citation correctness, and \
             acceptance-criteria coverage. Do not critique domain expertise outside your role.",
        );
    }

    let deliverable = step.result_artifact.clone().unwrap_or_default();
    let user_message = format!("DELIVERABLE\n{deliverable}");

    ReviewPrompt { system_prompt, user_message }
}

fn verdict_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\[(approve|reject)\]").expect("static verdict pattern is valid"))
}

fn criterion_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(relevance|depth|actionability|accuracy|executive quality)\s*[:=]\s*([0-9]+(?:\.[0-9]+)?)")
            .expect("static criterion pattern is valid")
    })
}

fn feedback_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)FEEDBACK\s*:?\s*(.*)").expect("static feedback pattern is valid"))
}

/// Parses the reviewer's free-text response for per-criterion scores, the
/// verdict tag, and the feedback block, applying the auto-reject override
/// (§4.5 step 6). Default verdict on ambiguity (no tag found) is approve,
/// fail-open to avoid blocking the pipeline.
fn parse_review_response(content: &str) -> ParsedReview {
    let mut scores = Vec::new();
    for capture in criterion_regex().captures_iter(content) {
        if let Ok(value) = capture[2].parse::<f64>() {
            scores.push(value);
        }
    }
    let overall = if scores.is_empty() { 3.0 } else { scores.iter().sum::<f64>() / scores.len() as f64 };

    let mut verdict = match verdict_regex().captures(content) {
        Some(m) if m[1].eq_ignore_ascii_case("reject") => Verdict::Reject,
        Some(_) => Verdict::Approve,
        None => Verdict::Approve,
    };

    let mut auto_rejected = false;
    if overall < 3.0 && verdict == Verdict::Approve {
        verdict = Verdict::Reject;
        auto_rejected = true;
    }

    let feedback = feedback_regex()
        .captures(content)
        .and_then(|m| m.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    ParsedReview { overall, verdict, feedback, auto_rejected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_approve_parses_correctly() {
        let content = "SCORES\nRelevance: 4\nDepth: 4\nActionability: 4\nAccuracy: 4\nExecutive Quality: 4\n\nVERDICT\n[APPROVE]\n\nFEEDBACK\nSolid work.";
        let parsed = parse_review_response(content);
        assert_eq!(parsed.verdict, Verdict::Approve);
        assert_eq!(parsed.overall, 4.0);
        assert!(!parsed.auto_rejected);
        assert_eq!(parsed.feedback.as_deref(), Some("Solid work."));
    }

    #[test]
    fn low_overall_with_approve_tag_is_auto_rejected() {
        let content = "SCORES\nRelevance: 2\nDepth: 2\nActionability: 2\nAccuracy: 2\nExecutive Quality: 2\n\nVERDICT\n[APPROVE]\n\nFEEDBACK\nWeak.";
        let parsed = parse_review_response(content);
        assert_eq!(parsed.verdict, Verdict::Reject);
        assert!(parsed.auto_rejected);
    }

    #[test]
    fn ambiguous_response_defaults_to_approve() {
        let parsed = parse_review_response("no tag present here, scores missing too");
        assert_eq!(parsed.verdict, Verdict::Approve);
        assert_eq!(parsed.overall, 3.0);
    }

    #[test]
    fn explicit_reject_with_high_scores_is_not_auto_rejected_flag() {
        let content = "Relevance: 4 Depth: 4 Actionability: 4 Accuracy: 4 Executive Quality: 4 [REJECT] FEEDBACK: needs more detail";
        let parsed = parse_review_response(content);
        assert_eq!(parsed.verdict, Verdict::Reject);
        assert!(!parsed.auto_rejected);
    }
}
