//! Diamond-DAG scheduling scenario (§8: "diamond DAG" scenario; §4.3
//! eligibility rule) exercised against a real `SqliteStore`.

mod helpers;

use std::sync::Arc;

use async_trait::async_trait;
use conclave_core::domain::error::LlmError;
use conclave_core::domain::models::{
    Agent, AgentStatus, Approval, ApprovalStatus, ModelTier, ReviewType, Step, StepDependency, StepDependencyType,
    StepStatus,
};
use conclave_core::domain::ports::llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use conclave_core::domain::ports::mirror::NullMirrorClient;
use conclave_core::domain::ports::store::Store;
use conclave_core::domain::ports::web::NullWebClient;
use conclave_core::infrastructure::database::SqliteStore;
use conclave_core::services::capability_registry;
use conclave_core::services::{CompletionCascade, DagScheduler, EventSink, ExecutionPipeline, ExternalMirrorSync};
use uuid::Uuid;

/// Routes canned responses by a keyword in the system prompt so every
/// pipeline phase gets a parseable answer without a network dependency.
struct FakeLlmClient;

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn call(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let content = if request.system_prompt.contains("sub_questions") {
            r#"{"sub_questions": [], "queries": [], "key_requirements": ["ship it"]}"#.to_string()
        } else if request.system_prompt.contains("completeness") {
            r#"{"completeness": 4, "accuracy": 4, "actionability": 4, "depth": 4, "feedback": "solid"}"#.to_string()
        } else {
            "A well-cited deliverable.".to_string()
        };
        Ok(LlmResponse { content, model: "fake".to_string(), tier: request.tier, usage: LlmUsage::default() })
    }
}

async fn complete(store: &dyn Store, step_id: Uuid) {
    store.set_step_status(step_id, StepStatus::Completed).await.unwrap();
}

#[tokio::test]
async fn diamond_dag_schedules_join_step_only_after_both_branches_complete() {
    let pool = helpers::database::setup_test_db().await;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let assignee = Agent { id: Uuid::new_v4(), role: "generalist".to_string(), team_id: Some(Uuid::new_v4()), status: AgentStatus::Active, current_persona_id: None };
    let qa = Agent { id: Uuid::new_v4(), role: "qa".to_string(), team_id: Some(Uuid::new_v4()), status: AgentStatus::Active, current_persona_id: None };
    store.hire_agent(&assignee).await.unwrap();
    store.hire_agent(&qa).await.unwrap();

    let mission = conclave_core::domain::models::Mission::new("build a diamond-shaped plan", None, None);
    store.create_mission(&mission).await.unwrap();

    let mut t1 = Step::new(mission.id, ModelTier::Cheap, 0, None, "do the work", vec![]);
    let mut t2 = Step::new(mission.id, ModelTier::Cheap, 1, None, "do the work", vec![]);
    let mut t3 = Step::new(mission.id, ModelTier::Cheap, 1, None, "do the work", vec![]);
    let mut t4 = Step::new(mission.id, ModelTier::Cheap, 2, None, "do the work", vec![]);
    for step in [&mut t1, &mut t2, &mut t3, &mut t4] {
        step.assigned_agent_id = Some(assignee.id);
        store.create_step(step).await.unwrap();
    }

    for (child, parent) in [(&t2, &t1), (&t3, &t1), (&t4, &t2), (&t4, &t3)] {
        store
            .add_dependency(&StepDependency { id: Uuid::new_v4(), step_id: child.id, depends_on_step_id: parent.id, dependency_type: StepDependencyType::Blocks })
            .await
            .unwrap();
    }

    let pipeline = Arc::new(ExecutionPipeline::new(store.clone(), Arc::new(FakeLlmClient), Arc::new(NullWebClient), capability_registry::default_manifest()));
    let mirror_sync = Arc::new(ExternalMirrorSync::new(store.clone(), Arc::new(NullMirrorClient)));
    let events = Arc::new(EventSink::new(store.clone()));
    let completion_cascade = Arc::new(CompletionCascade::new(store.clone(), events.clone()));
    let scheduler = DagScheduler::new(store.clone(), pipeline, mirror_sync, events, completion_cascade);

    // Tick 1: only T1 has no blocking predecessors.
    scheduler.tick().await.unwrap();
    assert_eq!(store.get_step(t1.id).await.unwrap().unwrap().status, StepStatus::InReview);
    assert_eq!(store.get_step(t2.id).await.unwrap().unwrap().status, StepStatus::Pending);
    assert_eq!(store.get_step(t3.id).await.unwrap().unwrap().status, StepStatus::Pending);
    assert_eq!(store.get_step(t4.id).await.unwrap().unwrap().status, StepStatus::Pending);

    complete(store.as_ref(), t1.id).await;

    // Tick 2: T2 and T3 are both now eligible; T4 still waits on both.
    scheduler.tick().await.unwrap();
    assert_eq!(store.get_step(t2.id).await.unwrap().unwrap().status, StepStatus::InReview);
    assert_eq!(store.get_step(t3.id).await.unwrap().unwrap().status, StepStatus::InReview);
    assert_eq!(store.get_step(t4.id).await.unwrap().unwrap().status, StepStatus::Pending);

    complete(store.as_ref(), t2.id).await;

    // Only one of the two join predecessors is done: T4 must stay ineligible.
    scheduler.tick().await.unwrap();
    assert_eq!(store.get_step(t4.id).await.unwrap().unwrap().status, StepStatus::Pending);

    complete(store.as_ref(), t3.id).await;

    // Tick 4: both branches are complete, the join step is now eligible.
    scheduler.tick().await.unwrap();
    assert_eq!(store.get_step(t4.id).await.unwrap().unwrap().status, StepStatus::InReview);

    let approvals = store.get_pending_approvals(ReviewType::Qa, 10).await.unwrap();
    assert_eq!(approvals.len(), 4);
    assert!(approvals.iter().all(|a: &Approval| a.status == ApprovalStatus::Pending));
}

#[tokio::test]
async fn claimed_step_is_never_reclaimed_by_a_concurrent_tick() {
    let pool = helpers::database::setup_test_db().await;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let assignee = Agent { id: Uuid::new_v4(), role: "generalist".to_string(), team_id: Some(Uuid::new_v4()), status: AgentStatus::Active, current_persona_id: None };
    store.hire_agent(&assignee).await.unwrap();

    let mission = conclave_core::domain::models::Mission::new("single task", None, None);
    store.create_mission(&mission).await.unwrap();

    let mut step = Step::new(mission.id, ModelTier::Cheap, 0, None, "do the work", vec![]);
    step.assigned_agent_id = Some(assignee.id);
    store.create_step(&step).await.unwrap();

    // Claiming the step directly simulates a second process having already
    // won the CAS race before this tick runs (invariant I8).
    assert!(store.claim_step(step.id).await.unwrap());
    assert!(!store.claim_step(step.id).await.unwrap());
}
