//! SQLite implementation of `domain::ports::store::Store`, grounded on the
//! teacher's `infrastructure/database/task_repo.rs` row-mapping style.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::error::StoreError;
use crate::domain::models::{
    Agent, AgentStatus, Approval, ApprovalStatus, ApproachMemoryEntry, DecompositionPlan,
    EndStateTag, EscalationType, Event, ModelTier, Mission, MissionStatus, Persona,
    PhaseName, PipelinePhaseRecord, PlanStatus, PlanTask, Project, ProjectPhase, ProjectStatus,
    ReviewType, Step, StepDependency, StepDependencyType, StepStatus,
};
use crate::domain::ports::store::Store;

use super::utils::{format_datetime, parse_datetime};

fn query_failed(e: sqlx::Error) -> StoreError {
    StoreError::QueryFailed(e.to_string())
}

fn serialize(value: &impl serde::Serialize) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn deserialize<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_project(row: &SqliteRow) -> Result<Project, StoreError> {
        Ok(Project {
            id: Uuid::parse_str(row.get::<String, _>("id").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
            original_request: row.get("original_request"),
            phase: ProjectPhase::from_str(row.get::<String, _>("phase").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown project phase".to_string()))?,
            status: ProjectStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown project status".to_string()))?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_mission(row: &SqliteRow) -> Result<Mission, StoreError> {
        Ok(Mission {
            id: parse_uuid(row.get::<String, _>("id"))?,
            project_id: row.get::<Option<String>, _>("project_id").map(parse_uuid).transpose()?,
            directive: row.get("directive"),
            status: MissionStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown mission status".to_string()))?,
            phase_at_link: row
                .get::<Option<String>, _>("phase_at_link")
                .and_then(|s| ProjectPhase::from_str(&s)),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_plan(row: &SqliteRow) -> Result<DecompositionPlan, StoreError> {
        let tasks: Vec<PlanTask> = deserialize(row.get::<String, _>("tasks_json").as_str())?;
        let hiring_needed: Vec<String> = deserialize(row.get::<String, _>("hiring_json").as_str())?;
        Ok(DecompositionPlan {
            id: parse_uuid(row.get::<String, _>("id"))?,
            mission_id: parse_uuid(row.get::<String, _>("mission_id"))?,
            tasks,
            end_state: EndStateTag::from_str(row.get::<String, _>("end_state").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown end state".to_string()))?,
            escalation_needed: row.get::<i64, _>("escalation_needed") != 0,
            escalation_reason: row.get("escalation_reason"),
            hiring_needed,
            status: if row.get::<String, _>("status") == "active" { PlanStatus::Active } else { PlanStatus::Superseded },
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_step(row: &SqliteRow) -> Result<Step, StoreError> {
        Ok(Step {
            id: parse_uuid(row.get::<String, _>("id"))?,
            mission_id: parse_uuid(row.get::<String, _>("mission_id"))?,
            assigned_agent_id: row.get::<Option<String>, _>("assigned_agent_id").map(parse_uuid).transpose()?,
            model_tier: ModelTier::from_str(row.get::<String, _>("model_tier").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown model tier".to_string()))?,
            step_order: row.get("step_order"),
            status: StepStatus::from_str(row.get::<String, _>("status").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown step status".to_string()))?,
            task_description: row.get("task_description"),
            acceptance_criteria: deserialize(row.get::<String, _>("acceptance_criteria_json").as_str())?,
            result_artifact: row.get("result_artifact"),
            parent_step_id: row.get::<Option<String>, _>("parent_step_id").map(parse_uuid).transpose()?,
            revision_count: row.get::<i64, _>("revision_count") as u32,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_dependency(row: &SqliteRow) -> Result<StepDependency, StoreError> {
        Ok(StepDependency {
            id: parse_uuid(row.get::<String, _>("id"))?,
            step_id: parse_uuid(row.get::<String, _>("step_id"))?,
            depends_on_step_id: parse_uuid(row.get::<String, _>("depends_on_step_id"))?,
            dependency_type: StepDependencyType::from_str(row.get::<String, _>("type").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown dependency type".to_string()))?,
        })
    }

    fn row_to_phase_record(row: &SqliteRow) -> Result<PipelinePhaseRecord, StoreError> {
        let metadata: serde_json::Value = deserialize(row.get::<String, _>("metadata_json").as_str())?;
        let phase_name = match row.get::<String, _>("phase_name").as_str() {
            "decompose" => PhaseName::Decompose,
            "research" => PhaseName::Research,
            "synthesize" => PhaseName::Synthesize,
            "critique" => PhaseName::Critique,
            "revise" => PhaseName::Revise,
            other => return Err(StoreError::Serialization(format!("unknown phase name: {other}"))),
        };
        Ok(PipelinePhaseRecord {
            id: parse_uuid(row.get::<String, _>("id"))?,
            step_id: parse_uuid(row.get::<String, _>("step_id"))?,
            phase_name,
            phase_order: row.get("phase_order"),
            model_tier: row.get::<Option<String>, _>("model_tier").and_then(|s| ModelTier::from_str(&s)),
            score: row.get("score"),
            duration_ms: row.get::<i64, _>("duration_ms") as u64,
            metadata,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_approval(row: &SqliteRow) -> Result<Approval, StoreError> {
        Ok(Approval {
            id: parse_uuid(row.get::<String, _>("id"))?,
            step_id: parse_uuid(row.get::<String, _>("step_id"))?,
            reviewer_agent_id: parse_uuid(row.get::<String, _>("reviewer_agent_id"))?,
            review_type: ReviewType::from_str(row.get::<String, _>("review_type").as_str())
                .ok_or_else(|| StoreError::Serialization("unknown review type".to_string()))?,
            status: match row.get::<String, _>("status").as_str() {
                "pending" => ApprovalStatus::Pending,
                "approved" => ApprovalStatus::Approved,
                "rejected" => ApprovalStatus::Rejected,
                other => return Err(StoreError::Serialization(format!("unknown approval status: {other}"))),
            },
            feedback: row.get("feedback"),
            reviewed_at: row
                .get::<Option<String>, _>("reviewed_at")
                .map(|s| parse_datetime(&s))
                .transpose()
                .map_err(|e| StoreError::Serialization(e.to_string()))?,
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_agent(row: &SqliteRow) -> Result<Agent, StoreError> {
        Ok(Agent {
            id: parse_uuid(row.get::<String, _>("id"))?,
            role: row.get("role"),
            team_id: row.get::<Option<String>, _>("team_id").map(parse_uuid).transpose()?,
            status: match row.get::<String, _>("status").as_str() {
                "active" => AgentStatus::Active,
                "idle" => AgentStatus::Idle,
                _ => AgentStatus::Disabled,
            },
            current_persona_id: row.get::<Option<String>, _>("current_persona_id").map(parse_uuid).transpose()?,
        })
    }

    fn row_to_persona(row: &SqliteRow) -> Result<Persona, StoreError> {
        Ok(Persona {
            id: parse_uuid(row.get::<String, _>("id"))?,
            agent_id: parse_uuid(row.get::<String, _>("agent_id"))?,
            content: row.get("content"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }

    fn row_to_approach_memory(row: &SqliteRow) -> Result<ApproachMemoryEntry, StoreError> {
        let topic_tags: Vec<String> = deserialize(row.get::<String, _>("topic_tags_json").as_str())?;
        Ok(ApproachMemoryEntry {
            id: parse_uuid(row.get::<String, _>("id"))?,
            mission_id: parse_uuid(row.get::<String, _>("mission_id"))?,
            topic_tags,
            approach_summary: row.get("approach_summary"),
            critique_score: row.get("critique_score"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str()).map_err(|e| StoreError::Serialization(e.to_string()))?,
        })
    }
}

fn parse_uuid(s: String) -> Result<Uuid, StoreError> {
    Uuid::parse_str(&s).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_project(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO projects (id, original_request, phase, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(project.id.to_string())
        .bind(&project.original_request)
        .bind(project.phase.as_str())
        .bind(project.status.as_str())
        .bind(format_datetime(project.created_at))
        .bind(format_datetime(project.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_project).transpose()
    }

    async fn save_project(&self, project: &Project) -> Result<(), StoreError> {
        sqlx::query("UPDATE projects SET phase = ?, status = ?, updated_at = ? WHERE id = ?")
            .bind(project.phase.as_str())
            .bind(project.status.as_str())
            .bind(format_datetime(project.updated_at))
            .bind(project.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn set_project_status(&self, id: Uuid, status: ProjectStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn create_mission(&self, mission: &Mission) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO missions (id, project_id, directive, status, phase_at_link, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(mission.id.to_string())
        .bind(mission.project_id.map(|id| id.to_string()))
        .bind(&mission.directive)
        .bind(mission.status.as_str())
        .bind(mission.phase_at_link.map(ProjectPhase::as_str))
        .bind(format_datetime(mission.created_at))
        .bind(format_datetime(mission.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_mission(&self, id: Uuid) -> Result<Option<Mission>, StoreError> {
        let row = sqlx::query("SELECT * FROM missions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_mission).transpose()
    }

    async fn set_mission_status(&self, id: Uuid, status: MissionStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE missions SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn save_plan(&self, plan: &DecompositionPlan) -> Result<(), StoreError> {
        let tasks_json = serialize(&plan.tasks)?;
        let hiring_json = serialize(&plan.hiring_needed)?;
        sqlx::query(
            "INSERT INTO decomposition_plans
             (id, mission_id, tasks_json, end_state, escalation_needed, escalation_reason, hiring_json, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(plan.id.to_string())
        .bind(plan.mission_id.to_string())
        .bind(tasks_json)
        .bind(plan.end_state.as_str())
        .bind(i64::from(plan.escalation_needed))
        .bind(&plan.escalation_reason)
        .bind(hiring_json)
        .bind(if plan.status == PlanStatus::Active { "active" } else { "superseded" })
        .bind(format_datetime(plan.created_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_active_plan(&self, mission_id: Uuid) -> Result<Option<DecompositionPlan>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM decomposition_plans WHERE mission_id = ? AND status = 'active'
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(mission_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_plan).transpose()
    }

    async fn supersede_active_plans(&self, mission_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE decomposition_plans SET status = 'superseded' WHERE mission_id = ? AND status = 'active'")
            .bind(mission_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn save_approach_memory(&self, entry: &ApproachMemoryEntry) -> Result<(), StoreError> {
        let tags_json = serialize(&entry.topic_tags)?;
        sqlx::query(
            "INSERT INTO approach_memory (id, mission_id, topic_tags_json, approach_summary, critique_score, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.mission_id.to_string())
        .bind(tags_json)
        .bind(&entry.approach_summary)
        .bind(entry.critique_score)
        .bind(format_datetime(entry.created_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn list_approach_memory(&self) -> Result<Vec<ApproachMemoryEntry>, StoreError> {
        let rows = sqlx::query("SELECT * FROM approach_memory ORDER BY created_at DESC LIMIT 500")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_approach_memory).collect()
    }

    async fn create_step(&self, step: &Step) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO steps
             (id, mission_id, assigned_agent_id, model_tier, step_order, status, task_description, acceptance_criteria_json, result_artifact, parent_step_id, revision_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(step.id.to_string())
        .bind(step.mission_id.to_string())
        .bind(step.assigned_agent_id.map(|id| id.to_string()))
        .bind(step.model_tier.as_str())
        .bind(step.step_order)
        .bind(step.status.as_str())
        .bind(&step.task_description)
        .bind(serialize(&step.acceptance_criteria)?)
        .bind(&step.result_artifact)
        .bind(step.parent_step_id.map(|id| id.to_string()))
        .bind(i64::from(step.revision_count))
        .bind(format_datetime(step.created_at))
        .bind(format_datetime(step.updated_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_step(&self, id: Uuid) -> Result<Option<Step>, StoreError> {
        let row = sqlx::query("SELECT * FROM steps WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_step).transpose()
    }

    async fn list_steps_for_mission(&self, mission_id: Uuid) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query("SELECT * FROM steps WHERE mission_id = ? ORDER BY step_order ASC")
            .bind(mission_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_step).collect()
    }

    async fn list_pending_steps(&self, limit: u32) -> Result<Vec<Step>, StoreError> {
        let rows = sqlx::query("SELECT * FROM steps WHERE status = 'pending' ORDER BY created_at ASC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_step).collect()
    }

    async fn claim_step(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE steps SET status = 'in_progress', updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(format_datetime(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_step_status(&self, id: Uuid, status: StepStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE steps SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn set_step_result(&self, id: Uuid, artifact: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE steps SET result_artifact = ?, updated_at = ? WHERE id = ?")
            .bind(artifact)
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn increment_revision_count(&self, id: Uuid) -> Result<u32, StoreError> {
        sqlx::query("UPDATE steps SET revision_count = revision_count + 1, updated_at = ? WHERE id = ?")
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        let row = sqlx::query("SELECT revision_count FROM steps WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.get::<i64, _>("revision_count") as u32)
    }

    async fn assign_step_agent(&self, id: Uuid, agent_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE steps SET assigned_agent_id = ?, updated_at = ? WHERE id = ?")
            .bind(agent_id.to_string())
            .bind(format_datetime(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn fail_pending_steps_after_order(&self, mission_id: Uuid, order: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE steps SET status = 'failed', updated_at = ?
             WHERE mission_id = ? AND status = 'pending' AND step_order > ?",
        )
        .bind(format_datetime(Utc::now()))
        .bind(mission_id.to_string())
        .bind(order)
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected())
    }

    async fn cancel_nonterminal_steps(&self, mission_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE steps SET status = 'canceled', updated_at = ?
             WHERE mission_id = ? AND status NOT IN ('completed', 'failed', 'canceled')",
        )
        .bind(format_datetime(Utc::now()))
        .bind(mission_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(result.rows_affected())
    }

    async fn add_dependency(&self, dependency: &StepDependency) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO step_dependencies (id, step_id, depends_on_step_id, type) VALUES (?, ?, ?, ?)")
            .bind(dependency.id.to_string())
            .bind(dependency.step_id.to_string())
            .bind(dependency.depends_on_step_id.to_string())
            .bind(dependency.dependency_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn get_dependencies(&self, step_id: Uuid) -> Result<Vec<StepDependency>, StoreError> {
        let rows = sqlx::query("SELECT * FROM step_dependencies WHERE step_id = ?")
            .bind(step_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_dependency).collect()
    }

    async fn get_blocking_predecessor_statuses(&self, step_id: Uuid) -> Result<Vec<StepStatus>, StoreError> {
        let rows = sqlx::query(
            "SELECT s.status AS status
             FROM step_dependencies d
             JOIN steps s ON s.id = d.depends_on_step_id
             WHERE d.step_id = ? AND d.type = 'blocks'",
        )
        .bind(step_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        rows.iter()
            .map(|row| {
                StepStatus::from_str(row.get::<String, _>("status").as_str())
                    .ok_or_else(|| StoreError::Serialization("unknown step status".to_string()))
            })
            .collect()
    }

    async fn record_phase(&self, record: &PipelinePhaseRecord) -> Result<(), StoreError> {
        let metadata_json = serde_json::to_string(&record.metadata).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query(
            "INSERT INTO pipeline_phase_records
             (id, step_id, phase_name, phase_order, model_tier, score, duration_ms, metadata_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(record.step_id.to_string())
        .bind(record.phase_name.as_str())
        .bind(record.phase_order)
        .bind(record.model_tier.map(ModelTier::as_str))
        .bind(record.score)
        .bind(record.duration_ms as i64)
        .bind(metadata_json)
        .bind(format_datetime(record.created_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn list_phase_records(&self, step_id: Uuid) -> Result<Vec<PipelinePhaseRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM pipeline_phase_records WHERE step_id = ? ORDER BY phase_order ASC")
            .bind(step_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_phase_record).collect()
    }

    async fn create_approval(&self, approval: &Approval) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO approvals (id, step_id, reviewer_agent_id, review_type, status, feedback, reviewed_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(approval.id.to_string())
        .bind(approval.step_id.to_string())
        .bind(approval.reviewer_agent_id.to_string())
        .bind(approval.review_type.as_str())
        .bind(approval.status.as_str())
        .bind(&approval.feedback)
        .bind(approval.reviewed_at.map(format_datetime))
        .bind(format_datetime(approval.created_at))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_pending_approvals(&self, review_type: ReviewType, limit: u32) -> Result<Vec<Approval>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM approvals WHERE status = 'pending' AND review_type = ? ORDER BY created_at ASC LIMIT ?",
        )
        .bind(review_type.as_str())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed)?;
        rows.iter().map(Self::row_to_approval).collect()
    }

    async fn update_approval(&self, approval: &Approval) -> Result<(), StoreError> {
        sqlx::query("UPDATE approvals SET status = ?, feedback = ?, reviewed_at = ? WHERE id = ?")
            .bind(approval.status.as_str())
            .bind(&approval.feedback)
            .bind(approval.reviewed_at.map(format_datetime))
            .bind(approval.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn count_rejections(&self, step_id: Uuid) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM approvals WHERE step_id = ? AND status = 'rejected'")
            .bind(step_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.get::<i64, _>("n") as u32)
    }

    async fn get_roster(&self) -> Result<Vec<Agent>, StoreError> {
        let rows = sqlx::query("SELECT * FROM agents WHERE status != 'disabled'")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed)?;
        rows.iter().map(Self::row_to_agent).collect()
    }

    async fn get_agent(&self, id: Uuid) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_agent).transpose()
    }

    async fn hire_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agents (id, role, team_id, status, current_persona_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(agent.id.to_string())
        .bind(&agent.role)
        .bind(agent.team_id.map(|id| id.to_string()))
        .bind(match agent.status {
            AgentStatus::Active => "active",
            AgentStatus::Idle => "idle",
            AgentStatus::Disabled => "disabled",
        })
        .bind(agent.current_persona_id.map(|id| id.to_string()))
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn add_persona(&self, persona: &Persona) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO personas (id, agent_id, content, created_at) VALUES (?, ?, ?, ?)")
            .bind(persona.id.to_string())
            .bind(persona.agent_id.to_string())
            .bind(&persona.content)
            .bind(format_datetime(persona.created_at))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn get_persona(&self, id: Uuid) -> Result<Option<Persona>, StoreError> {
        let row = sqlx::query("SELECT * FROM personas WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        row.as_ref().map(Self::row_to_persona).transpose()
    }

    async fn set_agent_persona(&self, agent_id: Uuid, persona_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE agents SET current_persona_id = ? WHERE id = ?")
            .bind(persona_id.to_string())
            .bind(agent_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn create_escalation(&self, mission_id: Uuid, escalation_type: EscalationType, reason: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO escalations (id, mission_id, escalation_type, reason, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(mission_id.to_string())
            .bind(escalation_type.as_str())
            .bind(reason)
            .bind(format_datetime(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn get_mission_mirror_project(&self, mission_id: Uuid) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT external_project_id FROM mirror_sync_records WHERE mission_id = ?")
            .bind(mission_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.map(|r| r.get("external_project_id")))
    }

    async fn save_mission_mirror_project(&self, mission_id: Uuid, external_project_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mirror_sync_records (id, mission_id, external_project_id, last_synced_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(mission_id) DO UPDATE SET external_project_id = excluded.external_project_id, last_synced_at = excluded.last_synced_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(mission_id.to_string())
        .bind(external_project_id)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn get_step_mirror_issue(&self, step_id: Uuid) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT external_issue_id FROM mirror_issue_sync WHERE step_id = ?")
            .bind(step_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.map(|r| r.get("external_issue_id")))
    }

    async fn save_step_mirror_issue(&self, step_id: Uuid, external_issue_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO mirror_issue_sync (id, step_id, external_issue_id, last_state, last_synced_at)
             VALUES (?, ?, ?, NULL, ?)
             ON CONFLICT(step_id) DO UPDATE SET external_issue_id = excluded.external_issue_id, last_synced_at = excluded.last_synced_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(step_id.to_string())
        .bind(external_issue_id)
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }

    async fn has_inbound_synced(&self, external_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM inbound_sync WHERE external_id = ?")
            .bind(external_id)
            .fetch_one(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(row.get::<i64, _>("n") > 0)
    }

    async fn record_inbound_synced(&self, external_id: &str, mission_id: Option<Uuid>) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO inbound_sync (id, external_id, mission_id, imported_at) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(external_id)
            .bind(mission_id.map(|id| id.to_string()))
            .bind(format_datetime(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        let payload_json = serde_json::to_string(&event.payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
        sqlx::query("INSERT INTO events (id, event_type, payload_json, created_at) VALUES (?, ?, ?, ?)")
            .bind(event.id.to_string())
            .bind(event.event_type.as_str())
            .bind(payload_json)
            .bind(format_datetime(event.created_at))
            .execute(&self.pool)
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn record_llm_usage(
        &self,
        agent_id: Option<String>,
        tier: ModelTier,
        prompt_tokens: u32,
        completion_tokens: u32,
        mission_step_id: Option<Uuid>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO llm_usage (id, agent_id, tier, prompt_tokens, completion_tokens, mission_step_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(agent_id)
        .bind(tier.as_str())
        .bind(i64::from(prompt_tokens))
        .bind(i64::from(completion_tokens))
        .bind(mission_step_id.map(|id| id.to_string()))
        .bind(format_datetime(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(query_failed)?;
        Ok(())
    }
}
