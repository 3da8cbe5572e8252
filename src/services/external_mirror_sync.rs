//! External Mirror Sync (§4.6): fire-and-forget projection of missions and
//! steps onto the Linear-shaped mirror port. Every public method here logs
//! on error and returns — mirror failures never alter step or mission state
//! (invariant I7).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{Mission, Step};
use crate::domain::ports::mirror::{InboundIssue, MirrorClient, MirrorIssueState};
use crate::domain::ports::store::Store;

const DESCRIPTION_LIMIT: usize = 255;

/// Truncates a description field to `DESCRIPTION_LIMIT` chars with a
/// trailing ellipsis (§4.6). Operates on chars, not bytes, so multi-byte
/// UTF-8 text is never split mid-codepoint.
pub fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text.to_string();
    }
    let truncated: String = text.chars().take(DESCRIPTION_LIMIT.saturating_sub(1)).collect();
    format!("{truncated}…")
}

/// Agent-id sanitization for usage logs (§4.6): values not of the form
/// `agent-*` (e.g. `"system"`, `"frasier"`) must be normalized to `None`
/// before writing any foreign-keyed row.
pub fn sanitize_agent_id(agent_id: Option<&str>) -> Option<String> {
    agent_id.filter(|id| id.starts_with("agent-")).map(str::to_string)
}

/// Lazily-initialized, process-local cache. Populated once per process;
/// `ensure_initialized` must not flip the populated flag unless the
/// population actually succeeded, so a transient failure is retried on the
/// next call rather than latched as a permanent "ready" state (§4.6, §9).
struct MirrorCache {
    ready: bool,
}

pub struct ExternalMirrorSync {
    store: Arc<dyn Store>,
    mirror: Arc<dyn MirrorClient>,
    cache: RwLock<Option<MirrorCache>>,
}

impl ExternalMirrorSync {
    pub fn new(store: Arc<dyn Store>, mirror: Arc<dyn MirrorClient>) -> Self {
        Self { store, mirror, cache: RwLock::new(None) }
    }

    async fn ensure_initialized(&self) {
        if self.cache.read().await.is_some() {
            return;
        }
        let mut guard = self.cache.write().await;
        if guard.is_some() {
            return;
        }
        // Population has no network dependency in this deployment (state
        // names and label ids are config, not discovered) but the
        // idempotent-retry shape is kept so a future network-backed cache
        // slots in without changing call sites.
        *guard = Some(MirrorCache { ready: true });
    }

    /// Idempotent project creation (§4.6): checks the sync record first, and
    /// only calls the mirror on a cache miss.
    pub async fn sync_mission_created(&self, mission: &Mission) {
        self.ensure_initialized().await;

        match self.store.get_mission_mirror_project(mission.id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!(mission_id = %mission.id, error = %err, "failed to check mirror sync record");
                return;
            }
        }

        let description = truncate_description(&mission.directive);
        let project_name = format!("Mission {}", mission.id);
        let external_id = match self.mirror.create_project(&project_name, &description).await {
            Ok(id) => id,
            Err(err) => {
                warn!(mission_id = %mission.id, error = %err, "mirror project creation failed");
                return;
            }
        };

        if let Err(err) = self.store.save_mission_mirror_project(mission.id, &external_id).await {
            warn!(mission_id = %mission.id, error = %err, "failed to persist mirror sync record");
        }
    }

    /// Fire-and-forget issue creation for a newly materialized step.
    pub async fn sync_step_created(&self, mission: &Mission, step: &Step) {
        self.ensure_initialized().await;

        let Ok(Some(project_external_id)) = self.store.get_mission_mirror_project(mission.id).await else {
            return;
        };

        match self.store.get_step_mirror_issue(step.id).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!(step_id = %step.id, error = %err, "failed to check mirror issue record");
                return;
            }
        }

        let title = format!("Step {}", step.id);
        let description = truncate_description(&step.task_description);
        let external_id = match self.mirror.create_issue(&project_external_id, &title, &description).await {
            Ok(id) => id,
            Err(err) => {
                warn!(step_id = %step.id, error = %err, "mirror issue creation failed");
                return;
            }
        };

        if let Err(err) = self.store.save_step_mirror_issue(step.id, &external_id).await {
            warn!(step_id = %step.id, error = %err, "failed to persist mirror issue record");
        }
    }

    pub async fn sync_step_state(&self, step_id: Uuid, state: MirrorIssueState) {
        let Ok(Some(issue_id)) = self.store.get_step_mirror_issue(step_id).await else {
            return;
        };
        if let Err(err) = self.mirror.set_issue_state(&issue_id, state).await {
            warn!(step_id = %step_id, error = %err, "mirror state sync failed");
        }
    }

    pub async fn post_feedback_comment(&self, step_id: Uuid, feedback: &str) {
        let Ok(Some(issue_id)) = self.store.get_step_mirror_issue(step_id).await else {
            return;
        };
        if let Err(err) = self.mirror.post_comment(&issue_id, feedback).await {
            warn!(step_id = %step_id, error = %err, "mirror comment post failed");
        }
    }

    /// Pulls items created since `since`. Loop prevention (two independent
    /// layers) and inbound dedup are the caller's (`inbound_poller`)
    /// responsibility — this method is a thin, fire-and-forget wrapper that
    /// returns an empty list rather than an error on failure.
    pub async fn poll_recent_issues(&self, since: DateTime<Utc>) -> Vec<InboundIssue> {
        match self.mirror.poll_recent_issues(since).await {
            Ok(issues) => issues,
            Err(err) => {
                warn!(error = %err, "mirror inbound poll failed");
                vec![]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn description_under_limit_is_unchanged() {
        assert_eq!(truncate_description("short"), "short");
    }

    #[test]
    fn description_over_limit_is_truncated_with_ellipsis() {
        let long = "x".repeat(300);
        let truncated = truncate_description(&long);
        assert_eq!(truncated.chars().count(), DESCRIPTION_LIMIT);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn agent_id_sanitization_keeps_only_agent_prefixed_ids() {
        assert_eq!(sanitize_agent_id(Some("agent-42")), Some("agent-42".to_string()));
        assert_eq!(sanitize_agent_id(Some("system")), None);
        assert_eq!(sanitize_agent_id(Some("frasier")), None);
        assert_eq!(sanitize_agent_id(None), None);
    }
}
