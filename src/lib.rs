//! Conclave core — durable multi-agent task orchestration.
//!
//! A pipeline over a shared store: a free-text directive is decomposed into a
//! validated DAG of typed steps, steps are executed through a multi-phase
//! LLM-driven pipeline (research, synthesize, critique, revise), and a
//! two-stage review chain gates promotion to `completed` with a bounded
//! rejection cap.

pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::error::ServiceError;
