//! Store collaborator port (§6): a relational store with CRUD over the
//! tables named in §3, supporting conditional updates (for atomic claim) and
//! simple filtered selects. One trait, not one trait per aggregate — the
//! specification names a single "Store collaborator".

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{
    Agent, Approval, ApproachMemoryEntry, DecompositionPlan, EscalationType, Event, ModelTier,
    Mission, MissionStatus, Persona, PipelinePhaseRecord, Project, ProjectPhase, ProjectStatus,
    ReviewType, Step, StepDependency, StepStatus,
};

#[async_trait]
pub trait Store: Send + Sync {
    // -- projects --
    async fn create_project(&self, project: &Project) -> Result<(), StoreError>;
    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError>;
    /// Persists a monotonic phase advance. The caller (completion cascade)
    /// must have already checked `ProjectPhase::precedes_or_equals`; this is
    /// the write side only.
    async fn save_project(&self, project: &Project) -> Result<(), StoreError>;
    async fn set_project_status(&self, id: Uuid, status: ProjectStatus) -> Result<(), StoreError>;

    // -- missions --
    async fn create_mission(&self, mission: &Mission) -> Result<(), StoreError>;
    async fn get_mission(&self, id: Uuid) -> Result<Option<Mission>, StoreError>;
    async fn set_mission_status(&self, id: Uuid, status: MissionStatus) -> Result<(), StoreError>;

    // -- decomposition plans --
    async fn save_plan(&self, plan: &DecompositionPlan) -> Result<(), StoreError>;
    async fn get_active_plan(&self, mission_id: Uuid) -> Result<Option<DecompositionPlan>, StoreError>;
    async fn supersede_active_plans(&self, mission_id: Uuid) -> Result<(), StoreError>;

    // -- approach memory --
    async fn save_approach_memory(&self, entry: &ApproachMemoryEntry) -> Result<(), StoreError>;
    /// All stored entries; the caller ranks by tag overlap and critique
    /// score and takes the top-k (§4.2 step 2) — kept as a plain select here
    /// because ranking is a pure domain computation, not a store concern.
    async fn list_approach_memory(&self) -> Result<Vec<ApproachMemoryEntry>, StoreError>;

    // -- steps --
    async fn create_step(&self, step: &Step) -> Result<(), StoreError>;
    async fn get_step(&self, id: Uuid) -> Result<Option<Step>, StoreError>;
    async fn list_steps_for_mission(&self, mission_id: Uuid) -> Result<Vec<Step>, StoreError>;
    /// Up to `limit` pending steps ordered by `created_at` ascending, with no
    /// artificial multiplier on the limit (§4.3 step 1 — a prior bug capped
    /// this and caused head-of-line blocking).
    async fn list_pending_steps(&self, limit: u32) -> Result<Vec<Step>, StoreError>;
    /// Conditional update `status: pending -> in_progress`. Returns `true`
    /// iff exactly one row was changed (invariant I8).
    async fn claim_step(&self, id: Uuid) -> Result<bool, StoreError>;
    async fn set_step_status(&self, id: Uuid, status: StepStatus) -> Result<(), StoreError>;
    async fn set_step_result(&self, id: Uuid, artifact: &str) -> Result<(), StoreError>;
    async fn increment_revision_count(&self, id: Uuid) -> Result<u32, StoreError>;
    async fn assign_step_agent(&self, id: Uuid, agent_id: Uuid) -> Result<(), StoreError>;
    /// Sets every `pending` step in `mission_id` whose `step_order` is
    /// strictly greater than `order` to `failed`. Returns the number of rows
    /// affected. Parallel steps at the same order are never touched
    /// (§4.3's failure cascade).
    async fn fail_pending_steps_after_order(&self, mission_id: Uuid, order: i64) -> Result<u64, StoreError>;
    /// Cancels every non-terminal step in `mission_id` (mission cancellation
    /// per §5).
    async fn cancel_nonterminal_steps(&self, mission_id: Uuid) -> Result<u64, StoreError>;

    // -- step dependencies --
    async fn add_dependency(&self, dependency: &StepDependency) -> Result<(), StoreError>;
    async fn get_dependencies(&self, step_id: Uuid) -> Result<Vec<StepDependency>, StoreError>;
    /// Resolved statuses of every `blocks`-typed predecessor of `step_id`.
    async fn get_blocking_predecessor_statuses(&self, step_id: Uuid) -> Result<Vec<StepStatus>, StoreError>;

    // -- pipeline phase records --
    async fn record_phase(&self, record: &PipelinePhaseRecord) -> Result<(), StoreError>;
    async fn list_phase_records(&self, step_id: Uuid) -> Result<Vec<PipelinePhaseRecord>, StoreError>;

    // -- approvals --
    async fn create_approval(&self, approval: &Approval) -> Result<(), StoreError>;
    async fn get_pending_approvals(&self, review_type: ReviewType, limit: u32) -> Result<Vec<Approval>, StoreError>;
    async fn update_approval(&self, approval: &Approval) -> Result<(), StoreError>;
    async fn count_rejections(&self, step_id: Uuid) -> Result<u32, StoreError>;

    // -- agents & personas --
    async fn get_roster(&self) -> Result<Vec<Agent>, StoreError>;
    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError>;
    async fn hire_agent(&self, agent: &Agent) -> Result<(), StoreError>;
    async fn add_persona(&self, persona: &Persona) -> Result<(), StoreError>;
    async fn get_persona(&self, id: Uuid) -> Result<Option<Persona>, StoreError>;
    async fn set_agent_persona(&self, agent_id: Uuid, persona_id: Uuid) -> Result<(), StoreError>;

    // -- escalations --
    async fn create_escalation(&self, mission_id: Uuid, escalation_type: EscalationType, reason: &str) -> Result<(), StoreError>;

    // -- mirror sync bookkeeping (§4.6) --
    async fn get_mission_mirror_project(&self, mission_id: Uuid) -> Result<Option<String>, StoreError>;
    async fn save_mission_mirror_project(&self, mission_id: Uuid, external_project_id: &str) -> Result<(), StoreError>;
    async fn get_step_mirror_issue(&self, step_id: Uuid) -> Result<Option<String>, StoreError>;
    async fn save_step_mirror_issue(&self, step_id: Uuid, external_issue_id: &str) -> Result<(), StoreError>;
    async fn has_inbound_synced(&self, external_id: &str) -> Result<bool, StoreError>;
    async fn record_inbound_synced(&self, external_id: &str, mission_id: Option<Uuid>) -> Result<(), StoreError>;

    // -- events --
    async fn append_event(&self, event: &Event) -> Result<(), StoreError>;

    // -- LLM usage ledger --
    async fn record_llm_usage(
        &self,
        agent_id: Option<String>,
        tier: ModelTier,
        prompt_tokens: u32,
        completion_tokens: u32,
        mission_step_id: Option<Uuid>,
    ) -> Result<(), StoreError>;
}
