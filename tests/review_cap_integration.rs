//! Revision-cap scenario (§8: "revision cap" scenario; invariant I5): a step
//! rejected three times in a row fails rather than looping forever.

mod helpers;

use std::sync::Arc;

use async_trait::async_trait;
use conclave_core::domain::error::LlmError;
use conclave_core::domain::models::{Agent, AgentStatus, Approval, ModelTier, ReviewType, Step, StepStatus};
use conclave_core::domain::ports::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use conclave_core::domain::ports::mirror::NullMirrorClient;
use conclave_core::domain::ports::store::Store;
use conclave_core::infrastructure::database::SqliteStore;
use conclave_core::services::{CompletionCascade, EventSink, ExternalMirrorSync, ReviewStateMachine};
use uuid::Uuid;

/// Always rejects with a well-formed rubric response, never approves.
struct AlwaysRejectLlmClient;

#[async_trait]
impl LlmClient for AlwaysRejectLlmClient {
    async fn call(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let content = "SCORES\nRelevance: 2\nDepth: 2\nActionability: 2\nAccuracy: 2\nExecutive Quality: 2\n\n\
             VERDICT\n[REJECT]\n\nFEEDBACK\nNot good enough yet."
            .to_string();
        Ok(LlmResponse { content, model: "fake".to_string(), tier: request.tier, usage: LlmUsage::default() })
    }
}

async fn qa_reviewer_id(store: &dyn Store) -> Uuid {
    store.get_roster().await.unwrap().into_iter().find(|a| a.role == "qa").unwrap().id
}

async fn setup() -> (Arc<dyn Store>, ReviewStateMachine, Step) {
    let pool = helpers::database::setup_test_db().await;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let assignee = Agent { id: Uuid::new_v4(), role: "engineer".to_string(), team_id: Some(Uuid::new_v4()), status: AgentStatus::Active, current_persona_id: None };
    let reviewer = Agent { id: Uuid::new_v4(), role: "qa".to_string(), team_id: Some(Uuid::new_v4()), status: AgentStatus::Active, current_persona_id: None };
    store.hire_agent(&assignee).await.unwrap();
    store.hire_agent(&reviewer).await.unwrap();

    let mission = conclave_core::domain::models::Mission::new("ship the thing", None, None);
    store.create_mission(&mission).await.unwrap();

    let mut step = Step::new(mission.id, ModelTier::Cheap, 0, None, "ship the thing", vec![]);
    step.assigned_agent_id = Some(assignee.id);
    step.status = StepStatus::InReview;
    step.result_artifact = Some("a deliverable".to_string());
    store.create_step(&step).await.unwrap();

    let approval = Approval::new_pending(step.id, reviewer.id, ReviewType::Qa);
    store.create_approval(&approval).await.unwrap();

    let mirror_sync = Arc::new(ExternalMirrorSync::new(store.clone(), Arc::new(NullMirrorClient)));
    let events = Arc::new(EventSink::new(store.clone()));
    let completion_cascade = Arc::new(CompletionCascade::new(store.clone(), events.clone()));
    let machine = ReviewStateMachine::new(store.clone(), Arc::new(AlwaysRejectLlmClient), mirror_sync, events, completion_cascade);

    (store, machine, step)
}

#[tokio::test]
async fn three_consecutive_rejections_fail_the_step() {
    let (store, machine, step) = setup().await;

    // Rejection 1: sent back for revision, step returns to pending.
    machine.process_next_pending().await.unwrap();
    assert_eq!(store.get_step(step.id).await.unwrap().unwrap().status, StepStatus::Pending);
    assert_eq!(store.get_step(step.id).await.unwrap().unwrap().revision_count, 1);

    // A fresh approval row models the scheduler re-running the step and
    // re-enqueuing QA review after the revision.
    store.set_step_status(step.id, StepStatus::InReview).await.unwrap();
    let approval2 = Approval::new_pending(step.id, qa_reviewer_id(store.as_ref()).await, ReviewType::Qa);
    store.create_approval(&approval2).await.unwrap();

    // Rejection 2: still under the cap.
    machine.process_next_pending().await.unwrap();
    assert_eq!(store.get_step(step.id).await.unwrap().unwrap().status, StepStatus::Pending);
    assert_eq!(store.get_step(step.id).await.unwrap().unwrap().revision_count, 2);

    store.set_step_status(step.id, StepStatus::InReview).await.unwrap();
    let approval3 = Approval::new_pending(step.id, qa_reviewer_id(store.as_ref()).await, ReviewType::Qa);
    store.create_approval(&approval3).await.unwrap();

    // Rejection 3: the cap is hit, the step fails outright rather than
    // looping a fourth time.
    machine.process_next_pending().await.unwrap();
    assert_eq!(store.get_step(step.id).await.unwrap().unwrap().status, StepStatus::Failed);
}
