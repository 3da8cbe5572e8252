//! DAG Scheduler (§4.3): the worker-loop tick that claims eligible pending
//! steps and runs them sequentially through the execution pipeline.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::error::ServiceError;
use crate::domain::models::{Agent, PipelineMode, Step, StepStatus};
use crate::domain::ports::mirror::MirrorIssueState;
use crate::domain::ports::store::Store;
use crate::services::completion_cascade::CompletionCascade;
use crate::services::event_sink::EventSink;
use crate::services::execution_pipeline::ExecutionPipeline;
use crate::services::external_mirror_sync::ExternalMirrorSync;

/// Default number of pending candidates fetched per tick. A real limit, not
/// multiplied by anything downstream (§4.3 step 1 — the head-of-line-blocking
/// bug this spec explicitly forbids reintroducing).
const DEFAULT_CANDIDATE_LIMIT: u32 = 50;
const TICK_INTERVAL: Duration = Duration::from_secs(10);

pub struct DagScheduler {
    store: Arc<dyn Store>,
    pipeline: Arc<ExecutionPipeline>,
    mirror_sync: Arc<ExternalMirrorSync>,
    events: Arc<EventSink>,
    completion_cascade: Arc<CompletionCascade>,
    candidate_limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Claimed,
    SkippedCasLost,
    Ineligible,
}

impl DagScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: Arc<ExecutionPipeline>,
        mirror_sync: Arc<ExternalMirrorSync>,
        events: Arc<EventSink>,
        completion_cascade: Arc<CompletionCascade>,
    ) -> Self {
        Self { store, pipeline, mirror_sync, events, completion_cascade, candidate_limit: DEFAULT_CANDIDATE_LIMIT }
    }

    /// Runs the fixed 10s-tick loop forever. Intended to be spawned as the
    /// worker process (§5, P3).
    pub async fn run_forever(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                error!(error = %err, "scheduler tick failed");
            }
        }
    }

    /// One scheduler tick: fetch candidates, filter to eligible ones, claim
    /// and execute each sequentially (§4.3 step 4 — bounded per-tick
    /// resource use, not parallel fan-out within a process).
    pub async fn tick(&self) -> Result<(), ServiceError> {
        let candidates = self.store.list_pending_steps(self.candidate_limit).await?;
        for step in candidates {
            match self.try_claim_and_execute(step).await {
                Ok(_) => {}
                Err(err) => warn!(error = %err, "step execution failed during tick"),
            }
        }
        Ok(())
    }

    async fn try_claim_and_execute(&self, step: Step) -> Result<TickOutcome, ServiceError> {
        if !self.is_eligible(&step).await? {
            return Ok(TickOutcome::Ineligible);
        }

        if !self.store.claim_step(step.id).await? {
            return Ok(TickOutcome::SkippedCasLost);
        }

        self.execute_claimed(step).await?;
        Ok(TickOutcome::Claimed)
    }

    /// Eligibility rule (§4.3 step 2): `blocks` predecessors win over the
    /// legacy `parent_step_id` pointer, which is only consulted when there
    /// are no `blocks` edges at all.
    async fn is_eligible(&self, step: &Step) -> Result<bool, ServiceError> {
        let predecessor_statuses = self.store.get_blocking_predecessor_statuses(step.id).await?;
        if !predecessor_statuses.is_empty() {
            return Ok(predecessor_statuses.iter().all(|s| *s == StepStatus::Completed));
        }
        if let Some(parent_id) = step.parent_step_id {
            let parent_completed = self
                .store
                .get_step(parent_id)
                .await?
                .is_some_and(|parent| parent.status == StepStatus::Completed);
            return Ok(parent_completed);
        }
        Ok(true)
    }

    async fn execute_claimed(&self, mut step: Step) -> Result<(), ServiceError> {
        step.status = StepStatus::InProgress;

        let roster = self.store.get_roster().await?;
        let persona_system_prompt = step
            .assigned_agent_id
            .and_then(|id| roster.iter().find(|a| a.id == id))
            .map(|agent| format!("You are a {}. Do focused, well-cited work within budget.", agent.role))
            .unwrap_or_else(|| "You are a general-purpose contributor. Do focused, well-cited work within budget.".to_string());

        // The decomposition-time `skipPipeline`/`skipResearch` classification
        // (§4.4) is not carried on the persisted `Step` row in this schema,
        // so every claimed step runs the full D-R-S-C pipeline here. A future
        // schema revision would thread the mode through from the plan task.
        let mode = PipelineMode::FullPipeline;

        match self.pipeline.execute_step(&step, mode, &persona_system_prompt, None).await {
            Ok(outcome) => {
                self.store.set_step_result(step.id, &outcome.artifact).await?;
                for record in &outcome.phase_records {
                    self.store.record_phase(record).await?;
                }
                self.store.set_step_status(step.id, StepStatus::InReview).await?;
                step.status = StepStatus::InReview;

                self.enqueue_qa_approval(&step, &roster).await?;
                self.mirror_sync.sync_step_state(step.id, MirrorIssueState::InReview).await;
                info!(step_id = %step.id, score = outcome.critique_score, "step moved to in_review");
            }
            Err(err) => {
                self.store.set_step_status(step.id, StepStatus::Failed).await?;
                step.status = StepStatus::Failed;
                self.events.task_failed(step.id, &err.to_string()).await;
                self.mirror_sync.sync_step_state(step.id, MirrorIssueState::Canceled).await;
                warn!(step_id = %step.id, error = %err, "step execution failed");
            }
        }

        self.completion_cascade.on_step_finalized(&step).await
    }

    async fn enqueue_qa_approval(&self, step: &Step, roster: &[Agent]) -> Result<(), ServiceError> {
        let assignee_id = step.assigned_agent_id.unwrap_or_else(Uuid::nil);
        let Some(reviewer) = select_qa_reviewer(roster, assignee_id) else {
            warn!(step_id = %step.id, "no eligible QA reviewer, step left without an approval row");
            return Ok(());
        };
        let approval = crate::domain::models::Approval::new_pending(step.id, reviewer.id, crate::domain::models::ReviewType::Qa);
        self.store.create_approval(&approval).await?;
        Ok(())
    }
}

/// Prefers an agent whose role is literally `"qa"`; falls back to any other
/// eligible reviewer so a team without a dedicated QA role still works.
fn select_qa_reviewer(roster: &[Agent], assignee_id: Uuid) -> Option<&Agent> {
    roster
        .iter()
        .filter(|agent| agent.eligible_reviewer_for(assignee_id))
        .find(|agent| agent.role == "qa")
        .or_else(|| roster.iter().find(|agent| agent.eligible_reviewer_for(assignee_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AgentStatus;

    fn agent(role: &str, team: Option<Uuid>) -> Agent {
        Agent { id: Uuid::new_v4(), role: role.to_string(), team_id: team, status: AgentStatus::Active, current_persona_id: None }
    }

    #[test]
    fn prefers_qa_role_reviewer() {
        let assignee = Uuid::new_v4();
        let qa = agent("qa", Some(Uuid::new_v4()));
        let engineer = agent("engineer", Some(Uuid::new_v4()));
        let roster = vec![engineer.clone(), qa.clone()];
        let selected = select_qa_reviewer(&roster, assignee).unwrap();
        assert_eq!(selected.id, qa.id);
    }

    #[test]
    fn falls_back_to_any_eligible_reviewer() {
        let assignee = Uuid::new_v4();
        let engineer = agent("engineer", Some(Uuid::new_v4()));
        let roster = vec![engineer.clone()];
        let selected = select_qa_reviewer(&roster, assignee).unwrap();
        assert_eq!(selected.id, engineer.id);
    }

    #[test]
    fn excludes_the_assignee_itself() {
        let assignee = Uuid::new_v4();
        let mut self_reviewer = agent("qa", Some(Uuid::new_v4()));
        self_reviewer.id = assignee;
        let roster = vec![self_reviewer];
        assert!(select_qa_reviewer(&roster, assignee).is_none());
    }
}
