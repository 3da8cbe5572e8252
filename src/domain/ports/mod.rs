//! Ports: narrow trait interfaces to the four external collaborators named
//! in the specification's External Interfaces section. Production adapters
//! live under `infrastructure::*`; tests substitute in-memory or mock
//! implementations.

pub mod llm;
pub mod mirror;
pub mod store;
pub mod web;

pub use llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use mirror::{InboundIssue, MirrorClient, MirrorIssueState};
pub use store::Store;
pub use web::{FetchedPage, SearchResult, WebClient};
