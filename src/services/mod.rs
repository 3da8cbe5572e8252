//! Service layer: business logic orchestrating domain ports. Each service is
//! a plain struct holding `Arc<dyn Trait>` collaborators, grounded on the
//! teacher's adapter-struct pattern rather than a framework DI container.

pub mod capability_registry;
pub mod citation_validator;
pub mod completion_cascade;
pub mod dag_scheduler;
pub mod dag_validator;
pub mod decomposition_engine;
pub mod event_sink;
pub mod execution_pipeline;
pub mod external_mirror_sync;
pub mod inbound_poller;
pub mod review_state_machine;

pub use completion_cascade::CompletionCascade;
pub use dag_scheduler::DagScheduler;
pub use decomposition_engine::DecompositionEngine;
pub use event_sink::EventSink;
pub use execution_pipeline::ExecutionPipeline;
pub use external_mirror_sync::ExternalMirrorSync;
pub use inbound_poller::InboundPoller;
pub use review_state_machine::ReviewStateMachine;
