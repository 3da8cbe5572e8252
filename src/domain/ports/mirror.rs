//! Mirror collaborator port (§6): the external project-tracker projection.
//! Never authoritative, never blocking — every operation is fire-and-forget
//! from the caller's point of view (the service layer logs and discards
//! errors; see `services::external_mirror_sync`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::error::MirrorError;

/// Workflow states the mirror issue can occupy. The mirror is the
/// external source of truth for *its own* states; this is the closed set
/// Conclave knows how to map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorIssueState {
    Backlog,
    InProgress,
    InReview,
    Done,
    Canceled,
}

impl MirrorIssueState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "Backlog",
            Self::InProgress => "In Progress",
            Self::InReview => "In Review",
            Self::Done => "Done",
            Self::Canceled => "Canceled",
        }
    }
}

/// An inbound item pulled by the poller, pre-filtered to `action=create,
/// type=Issue` by the adapter (§6's Inbound event format).
#[derive(Debug, Clone)]
pub struct InboundIssue {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub creator_id: String,
    pub label_ids: Vec<String>,
    pub url: String,
    pub identifier: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait MirrorClient: Send + Sync {
    /// Idempotent: the adapter may be called many times; the caller is
    /// responsible for checking the sync table first (§4.6).
    async fn create_project(&self, name: &str, description: &str) -> Result<String, MirrorError>;

    async fn create_issue(&self, project_external_id: &str, title: &str, description: &str) -> Result<String, MirrorError>;

    async fn set_issue_state(&self, issue_external_id: &str, state: MirrorIssueState) -> Result<(), MirrorError>;

    async fn post_comment(&self, issue_external_id: &str, body: &str) -> Result<(), MirrorError>;

    /// Items created since `since`, used by the inbound poller.
    async fn poll_recent_issues(&self, since: DateTime<Utc>) -> Result<Vec<InboundIssue>, MirrorError>;
}

/// No-op client substituted when `LINEAR_API_KEY` is unset. The core must
/// still function fully without the mirror (§1).
pub struct NullMirrorClient;

#[async_trait]
impl MirrorClient for NullMirrorClient {
    async fn create_project(&self, _name: &str, _description: &str) -> Result<String, MirrorError> {
        Err(MirrorError::RequestFailed("no mirror client configured".to_string()))
    }

    async fn create_issue(&self, _project_external_id: &str, _title: &str, _description: &str) -> Result<String, MirrorError> {
        Err(MirrorError::RequestFailed("no mirror client configured".to_string()))
    }

    async fn set_issue_state(&self, _issue_external_id: &str, _state: MirrorIssueState) -> Result<(), MirrorError> {
        Err(MirrorError::RequestFailed("no mirror client configured".to_string()))
    }

    async fn post_comment(&self, _issue_external_id: &str, _body: &str) -> Result<(), MirrorError> {
        Err(MirrorError::RequestFailed("no mirror client configured".to_string()))
    }

    async fn poll_recent_issues(&self, _since: DateTime<Utc>) -> Result<Vec<InboundIssue>, MirrorError> {
        Ok(vec![])
    }
}
