//! Mission/project lifecycle scenario (§8: "mission completion" and
//! "failure cascade" scenarios; invariant I6) exercised against a real
//! `SqliteStore`.

mod helpers;

use std::sync::Arc;

use conclave_core::domain::models::{
    Mission, MissionStatus, ModelTier, Project, ProjectPhase, ProjectStatus, Step, StepDependency, StepDependencyType,
    StepStatus,
};
use conclave_core::domain::ports::store::Store;
use conclave_core::infrastructure::database::SqliteStore;
use conclave_core::services::{CompletionCascade, EventSink};

#[tokio::test]
async fn diamond_mission_completes_once_every_step_completes() {
    let pool = helpers::database::setup_test_db().await;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let mission = Mission::new("build a diamond-shaped plan", None, None);
    store.create_mission(&mission).await.unwrap();

    let t1 = Step::new(mission.id, ModelTier::Cheap, 0, None, "do the work", vec![]);
    let t2 = Step::new(mission.id, ModelTier::Cheap, 1, None, "do the work", vec![]);
    let t3 = Step::new(mission.id, ModelTier::Cheap, 1, None, "do the work", vec![]);
    let t4 = Step::new(mission.id, ModelTier::Cheap, 2, None, "do the work", vec![]);
    for step in [&t1, &t2, &t3, &t4] {
        store.create_step(step).await.unwrap();
    }
    for (child, parent) in [(&t2, &t1), (&t3, &t1), (&t4, &t2), (&t4, &t3)] {
        store
            .add_dependency(&StepDependency { id: uuid::Uuid::new_v4(), step_id: child.id, depends_on_step_id: parent.id, dependency_type: StepDependencyType::Blocks })
            .await
            .unwrap();
    }

    let events = Arc::new(EventSink::new(store.clone()));
    let cascade = CompletionCascade::new(store.clone(), events);

    // Three of four steps complete: mission is still undecidable.
    for step in [&t1, &t2, &t3] {
        store.set_step_status(step.id, StepStatus::Completed).await.unwrap();
        cascade.on_step_finalized(&store.get_step(step.id).await.unwrap().unwrap()).await.unwrap();
        assert_eq!(store.get_mission(mission.id).await.unwrap().unwrap().status, MissionStatus::InProgress);
    }

    store.set_step_status(t4.id, StepStatus::Completed).await.unwrap();
    cascade.on_step_finalized(&store.get_step(t4.id).await.unwrap().unwrap()).await.unwrap();
    assert_eq!(store.get_mission(mission.id).await.unwrap().unwrap().status, MissionStatus::Completed);

    // Idempotent: re-checking a terminal mission is a no-op, not an error.
    cascade.check_mission_completion(mission.id).await.unwrap();
    assert_eq!(store.get_mission(mission.id).await.unwrap().unwrap().status, MissionStatus::Completed);
}

#[tokio::test]
async fn failed_step_cascades_to_pending_downstream_steps_and_fails_the_mission() {
    let pool = helpers::database::setup_test_db().await;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let mission = Mission::new("a linear three-step chain", None, None);
    store.create_mission(&mission).await.unwrap();

    let t1 = Step::new(mission.id, ModelTier::Cheap, 0, None, "do the work", vec![]);
    let t2 = Step::new(mission.id, ModelTier::Cheap, 1, None, "do the work", vec![]);
    let t3 = Step::new(mission.id, ModelTier::Cheap, 2, None, "do the work", vec![]);
    for step in [&t1, &t2, &t3] {
        store.create_step(step).await.unwrap();
    }

    let events = Arc::new(EventSink::new(store.clone()));
    let cascade = CompletionCascade::new(store.clone(), events);

    store.set_step_status(t1.id, StepStatus::Failed).await.unwrap();
    cascade.on_step_finalized(&store.get_step(t1.id).await.unwrap().unwrap()).await.unwrap();

    // Steps at a later order than the failure are cascaded to Failed too.
    assert_eq!(store.get_step(t2.id).await.unwrap().unwrap().status, StepStatus::Failed);
    assert_eq!(store.get_step(t3.id).await.unwrap().unwrap().status, StepStatus::Failed);
    assert_eq!(store.get_mission(mission.id).await.unwrap().unwrap().status, MissionStatus::Failed);
}

#[tokio::test]
async fn mission_completion_advances_the_linked_project_by_one_phase() {
    let pool = helpers::database::setup_test_db().await;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

    let mut project = Project::new("a new initiative");
    project.advance_phase(ProjectPhase::Design).unwrap();
    store.create_project(&project).await.unwrap();

    let mission = Mission::new("design the thing", Some(project.id), Some(ProjectPhase::Design));
    store.create_mission(&mission).await.unwrap();

    let only_step = Step::new(mission.id, ModelTier::Cheap, 0, None, "design the thing", vec![]);
    store.create_step(&only_step).await.unwrap();

    let events = Arc::new(EventSink::new(store.clone()));
    let cascade = CompletionCascade::new(store.clone(), events);

    store.set_step_status(only_step.id, StepStatus::Completed).await.unwrap();
    cascade.on_step_finalized(&store.get_step(only_step.id).await.unwrap().unwrap()).await.unwrap();

    let reloaded = store.get_project(project.id).await.unwrap().unwrap();
    assert_eq!(reloaded.phase, ProjectPhase::Build);
    assert_eq!(reloaded.status, ProjectStatus::Active);
}
