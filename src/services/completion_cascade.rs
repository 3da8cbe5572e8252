//! Completion Cascade: failure propagation, mission completion, and project
//! phase advancement (§4.3 failure cascade, §9 mission/project linkage).

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::domain::error::ServiceError;
use crate::domain::models::{MissionStatus, ProjectPhase, ProjectStatus, Step, StepStatus};
use crate::domain::ports::store::Store;
use crate::services::event_sink::EventSink;

pub struct CompletionCascade {
    store: Arc<dyn Store>,
    events: Arc<EventSink>,
}

/// Terminal outcome for a mission once every one of its steps has reached a
/// terminal status. `None` means the mission is not yet decidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissionOutcome {
    Completed,
    Failed,
}

/// Pure decision: given the statuses of every step in a mission, what
/// terminal outcome (if any) the mission has reached. A mission with zero
/// steps is never decidable this way (it has nothing to complete).
fn decide_mission_outcome(statuses: &[StepStatus]) -> Option<MissionOutcome> {
    if statuses.is_empty() || !statuses.iter().all(|s| s.is_terminal()) {
        return None;
    }
    if statuses.iter().any(|s| *s == StepStatus::Completed) {
        Some(MissionOutcome::Completed)
    } else {
        Some(MissionOutcome::Failed)
    }
}

/// Pure decision: the next project phase to advance to when a linked
/// mission completes, and whether that advance crosses out of `deploy`
/// (which changes the event emitted). `None` if the project is already at
/// `Completed` and there is nothing left to advance to.
fn decide_next_phase(phase_at_link: Option<ProjectPhase>, current_phase: ProjectPhase) -> Option<(ProjectPhase, bool)> {
    let base = phase_at_link.unwrap_or(current_phase);
    let next = base.next_phase()?;
    Some((next, base.is_deploy()))
}

impl CompletionCascade {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventSink>) -> Self {
        Self { store, events }
    }

    /// Called once a step reaches a terminal status. Cascades failure to
    /// downstream pending steps (§4.3: parallel steps at the same order are
    /// left alone) and then re-checks whether the mission as a whole is
    /// decidable.
    pub async fn on_step_finalized(&self, step: &Step) -> Result<(), ServiceError> {
        if matches!(step.status, StepStatus::Failed | StepStatus::Canceled) {
            let affected = self.store.fail_pending_steps_after_order(step.mission_id, step.step_order).await?;
            if affected > 0 {
                info!(mission_id = %step.mission_id, step_order = step.step_order, affected, "cascaded failure to downstream steps");
            }
        }
        self.check_mission_completion(step.mission_id).await
    }

    /// Idempotent: a mission already in a terminal status is left untouched,
    /// so calling this twice for the same mission is a no-op the second
    /// time (the *Idempotence* law from §8).
    pub async fn check_mission_completion(&self, mission_id: Uuid) -> Result<(), ServiceError> {
        let steps = self.store.list_steps_for_mission(mission_id).await?;
        let statuses: Vec<StepStatus> = steps.iter().map(|s| s.status).collect();
        let Some(outcome) = decide_mission_outcome(&statuses) else {
            return Ok(());
        };

        let Some(mission) = self.store.get_mission(mission_id).await? else {
            return Ok(());
        };
        if mission.status.is_terminal() {
            return Ok(());
        }

        match outcome {
            MissionOutcome::Completed => {
                self.store.set_mission_status(mission_id, MissionStatus::Completed).await?;
                self.events.mission_completed(mission_id).await;
                if let Some(project_id) = mission.project_id {
                    self.advance_project(project_id, mission.phase_at_link).await?;
                }
            }
            MissionOutcome::Failed => {
                self.store.set_mission_status(mission_id, MissionStatus::Failed).await?;
                self.events.mission_failed(mission_id).await;
            }
        }
        Ok(())
    }

    /// Advances the linked project by one phase, enforcing monotonicity via
    /// `Project::advance_phase`, and marks the project completed once it
    /// reaches `ProjectPhase::Completed`.
    async fn advance_project(&self, project_id: Uuid, phase_at_link: Option<ProjectPhase>) -> Result<(), ServiceError> {
        let Some(mut project) = self.store.get_project(project_id).await? else {
            return Ok(());
        };
        let Some((next, from_deploy)) = decide_next_phase(phase_at_link, project.phase) else {
            return Ok(());
        };
        if project.advance_phase(next).is_none() {
            return Ok(());
        }
        self.store.save_project(&project).await?;
        self.events.project_phase_advanced(project_id, next.as_str(), from_deploy).await;
        if next == ProjectPhase::Completed {
            self.store.set_project_status(project_id, ProjectStatus::Completed).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undecidable_while_any_step_nonterminal() {
        let statuses = [StepStatus::Completed, StepStatus::InProgress];
        assert_eq!(decide_mission_outcome(&statuses), None);
    }

    #[test]
    fn empty_step_list_is_undecidable() {
        assert_eq!(decide_mission_outcome(&[]), None);
    }

    #[test]
    fn all_terminal_with_one_completed_is_mission_completed() {
        let statuses = [StepStatus::Completed, StepStatus::Failed, StepStatus::Canceled];
        assert_eq!(decide_mission_outcome(&statuses), Some(MissionOutcome::Completed));
    }

    #[test]
    fn all_failed_or_canceled_is_mission_failed() {
        let statuses = [StepStatus::Failed, StepStatus::Canceled];
        assert_eq!(decide_mission_outcome(&statuses), Some(MissionOutcome::Failed));
    }

    #[test]
    fn phase_advance_uses_phase_at_link_as_base() {
        let (next, from_deploy) = decide_next_phase(Some(ProjectPhase::Design), ProjectPhase::Build).unwrap();
        assert_eq!(next, ProjectPhase::Build);
        assert!(!from_deploy);
    }

    #[test]
    fn advancing_out_of_deploy_is_flagged() {
        let (next, from_deploy) = decide_next_phase(Some(ProjectPhase::Deploy), ProjectPhase::Deploy).unwrap();
        assert_eq!(next, ProjectPhase::Completed);
        assert!(from_deploy);
    }

    #[test]
    fn already_completed_has_no_next_phase() {
        assert_eq!(decide_next_phase(Some(ProjectPhase::Completed), ProjectPhase::Completed), None);
    }
}
