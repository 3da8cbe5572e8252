//! Domain entities (§3 of the specification).

pub mod agent;
pub mod approval;
pub mod capability;
pub mod decomposition;
pub mod events;
pub mod mission;
pub mod pipeline;
pub mod project;
pub mod step;

pub use agent::{Agent, AgentStatus, Persona};
pub use approval::{Approval, ApprovalStatus, ReviewType};
pub use capability::{CapabilityManifest, RoleCapability};
pub use decomposition::{ApproachMemoryEntry, DecompositionPlan, EndStateTag, EscalationType, PlanStatus, PlanTask};
pub use events::{Event, EventType};
pub use mission::{Mission, MissionStatus};
pub use pipeline::{PhaseName, PipelineMode, PipelinePhaseRecord};
pub use project::{Project, ProjectPhase, ProjectStatus};
pub use step::{ModelTier, Step, StepDependency, StepDependencyType, StepStatus};
