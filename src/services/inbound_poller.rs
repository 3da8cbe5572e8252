//! Inbound Poller (§4.6): pulls recently created mirror issues, applies the
//! two-layer loop-prevention rule, and materializes accepted ones as new
//! missions.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::error::ServiceError;
use crate::domain::models::Mission;
use crate::domain::ports::mirror::InboundIssue;
use crate::domain::ports::store::Store;
use crate::services::event_sink::EventSink;
use crate::services::external_mirror_sync::ExternalMirrorSync;

/// First poll looks back this far (§4.6: "first poll looks back 60s").
const INITIAL_LOOKBACK_SECONDS: i64 = 60;

pub struct InboundPoller {
    store: Arc<dyn Store>,
    mirror_sync: Arc<ExternalMirrorSync>,
    events: Arc<EventSink>,
    system_api_user_id: Option<String>,
    system_label_id: Option<String>,
    last_poll_time: Mutex<Option<DateTime<Utc>>>,
}

impl InboundPoller {
    pub fn new(
        store: Arc<dyn Store>,
        mirror_sync: Arc<ExternalMirrorSync>,
        events: Arc<EventSink>,
        system_api_user_id: Option<String>,
        system_label_id: Option<String>,
    ) -> Self {
        Self { store, mirror_sync, events, system_api_user_id, system_label_id, last_poll_time: Mutex::new(None) }
    }

    /// One poll cycle: advances the monotonic `last_poll_time` watermark
    /// regardless of outcome, so a transient failure never replays the same
    /// window twice nor silently skips ahead.
    pub async fn poll_once(&self) -> Result<u32, ServiceError> {
        let since = {
            let mut guard = self.last_poll_time.lock().await;
            let since = guard.unwrap_or_else(|| Utc::now() - ChronoDuration::seconds(INITIAL_LOOKBACK_SECONDS));
            *guard = Some(Utc::now());
            since
        };

        let issues = self.mirror_sync.poll_recent_issues(since).await;
        let mut accepted = 0u32;
        for issue in issues {
            if self.should_skip(&issue) {
                continue;
            }
            if self.store.has_inbound_synced(&issue.external_id).await? {
                continue;
            }
            self.accept_issue(issue).await?;
            accepted += 1;
        }
        Ok(accepted)
    }

    fn should_skip(&self, issue: &InboundIssue) -> bool {
        is_loop_echo(issue, self.system_api_user_id.as_deref(), self.system_label_id.as_deref())
    }

    async fn accept_issue(&self, issue: InboundIssue) -> Result<(), ServiceError> {
        let directive = format!("{}\n\n{}", issue.title, issue.description);
        let mission = Mission::new(directive, None, None);
        self.store.create_mission(&mission).await?;
        self.store.record_inbound_synced(&issue.external_id, Some(mission.id)).await?;
        self.events.linear_inbound_issue(&issue.external_id).await;
        info!(external_id = %issue.external_id, mission_id = %mission.id, "inbound issue accepted as mission");
        Ok(())
    }
}

/// Two independent loop-prevention layers (§4.6): Conclave's own API user
/// creating issues, and Conclave's own system-managed label being present,
/// both indicate the item is an echo of Conclave's own sync rather than a
/// genuine external request.
fn is_loop_echo(issue: &InboundIssue, system_api_user_id: Option<&str>, system_label_id: Option<&str>) -> bool {
    if let Some(system_user) = system_api_user_id {
        if issue.creator_id == system_user {
            return true;
        }
    }
    if let Some(system_label) = system_label_id {
        if issue.label_ids.iter().any(|label| label == system_label) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(external_id: &str, creator_id: &str, label_ids: Vec<String>) -> InboundIssue {
        InboundIssue {
            external_id: external_id.to_string(),
            title: "title".to_string(),
            description: "description".to_string(),
            creator_id: creator_id.to_string(),
            label_ids,
            url: "https://example.com/issue/1".to_string(),
            identifier: "ENG-1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn skips_items_created_by_the_system_api_user() {
        assert!(is_loop_echo(&issue("ext-1", "user-system", vec![]), Some("user-system"), None));
        assert!(!is_loop_echo(&issue("ext-2", "user-human", vec![]), Some("user-system"), None));
    }

    #[test]
    fn skips_items_carrying_the_system_managed_label() {
        let with_label = issue("ext-3", "user-human", vec!["label-conclave".to_string()]);
        assert!(is_loop_echo(&with_label, None, Some("label-conclave")));

        let without_label = issue("ext-4", "user-human", vec!["label-other".to_string()]);
        assert!(!is_loop_echo(&without_label, None, Some("label-conclave")));
    }

    #[test]
    fn no_system_ids_configured_never_skips() {
        assert!(!is_loop_echo(&issue("ext-5", "anyone", vec!["any-label".to_string()]), None, None));
    }
}
