//! Domain error taxonomy for the orchestration core.
//!
//! One `thiserror` enum per concern, mirroring the failure policy table in
//! the specification: each error knows whether it is transient (retry /
//! degrade) or permanent (fail the step/plan). `ServiceError` aggregates them
//! for the services layer; `main.rs` and the process loops work in terms of
//! `anyhow::Result` at the outermost boundary.

use thiserror::Error;
use uuid::Uuid;

/// Errors from the store port (persistence substrate).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("conditional update affected 0 rows (lost a claim race)")]
    CasConflict,

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::QueryFailed(_))
    }
}

/// Errors from decomposition-plan validation and construction.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("dependency cycle detected in plan")]
    CycleDetected,

    #[error("plan references unknown task id: {0}")]
    UnknownTaskId(String),

    #[error("no roster available to materialize assignees")]
    EmptyRoster,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PlanError {
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::CycleDetected | Self::UnknownTaskId(_))
    }
}

/// Errors from the per-step execution pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("research budget exhausted before gap analysis completed")]
    BudgetExhausted,

    #[error("step was cancelled at a phase boundary")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the review & revision state machine.
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("step {0} has no eligible reviewer (all agents are the assignee or system agents)")]
    NoEligibleReviewer(Uuid),

    #[error("unknown review type: {0}")]
    UnknownReviewType(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors from the external mirror collaborator.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("mirror request failed: {0}")]
    RequestFailed(String),

    #[error("mirror returned an unknown workflow state: {0}")]
    UnknownWorkflowState(String),

    #[error("webhook signature did not match")]
    InvalidSignature,
}

impl MirrorError {
    /// Mirror failures are always transient from the core's point of view:
    /// they are logged and swallowed, never propagated into step/mission
    /// state (invariant I7).
    pub const fn is_transient(&self) -> bool {
        true
    }
}

/// Errors from the LLM collaborator.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("timeout after {0}s")]
    Timeout(u64),
}

impl LlmError {
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::Timeout(_) | Self::RequestFailed(_)
        )
    }
}

/// Errors from the web search/fetch collaborator.
#[derive(Error, Debug)]
pub enum WebError {
    #[error("search failed: {0}")]
    SearchFailed(String),

    #[error("fetch failed: {0}")]
    FetchFailed(String),

    #[error("timeout after {0}s")]
    Timeout(u64),
}

/// Aggregate error returned by the services layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Web(#[from] WebError),

    /// Programmer error / invariant breach: crash-and-log, rely on the
    /// process supervisor to restart (per the spec's error-handling table).
    #[error("invariant breach: {0}")]
    InvariantBreach(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_cas_conflict_is_not_transient() {
        assert!(!StoreError::CasConflict.is_transient());
    }

    #[test]
    fn plan_error_cycle_is_fatal() {
        assert!(PlanError::CycleDetected.is_fatal());
        assert!(!PlanError::EmptyRoster.is_fatal());
    }

    #[test]
    fn mirror_error_always_transient() {
        assert!(MirrorError::RequestFailed("boom".into()).is_transient());
        assert!(MirrorError::InvalidSignature.is_transient());
    }

    #[test]
    fn llm_error_classification() {
        assert!(LlmError::RateLimitExceeded.is_transient());
        assert!(LlmError::Timeout(10).is_transient());
        assert!(!LlmError::InvalidResponse("bad json".into()).is_transient());
    }

    #[test]
    fn service_error_from_store() {
        let err: ServiceError = StoreError::NotFound("step".into()).into();
        assert!(matches!(err, ServiceError::Store(_)));
    }
}
