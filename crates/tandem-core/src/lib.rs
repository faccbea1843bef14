//! # tandem-core
//!
//! Orchestration engine for a two-agent, all-or-nothing code-generation
//! transaction. Two independent agents work the same task concurrently; each
//! runs a bounded generate→test→refine loop against a sandboxed test bundle.
//! The saga succeeds only when both agents produce passing code; any terminal
//! failure triggers a compensation sweep over the agents that had already
//! confirmed success.
//!
//! ## Layout
//!
//! - [`types`]: request, identifiers, run state, reports, snapshots, outcome
//! - [`error`]: request / call / agent / saga error taxonomy
//! - [`collaborators`]: traits for the generator, sandbox, and compensator
//! - [`classify`]: sandbox-report classification (pass / retry / stop)
//! - [`prompt`]: corrective prompt construction
//! - [`agent`]: per-agent retry state machine
//! - [`saga`]: the coordinator running both agents and the rollback sweep
//!
//! Production collaborator implementations live in `tandem-gateway`; the
//! durable-execution seams (clock, retry evaluator, transition journal) in
//! `tandem-substrate`.

pub mod agent;
pub mod classify;
pub mod collaborators;
pub mod error;
pub mod prompt;
pub mod saga;
pub mod types;

pub use agent::AgentStateMachine;
pub use classify::{classify_report, IterationOutcome};
pub use collaborators::{CodeGenerator, Compensator, SandboxRunner};
pub use error::{AgentError, CallError, RequestError, SagaError};
pub use prompt::refinement_prompt;
pub use saga::SagaCoordinator;
pub use types::{
    AgentId, AgentPhase, AgentRunState, AgentSnapshot, CompensationOutcome, CompensationRecord,
    FinalOutcome, InitialRequest, SagaSnapshot, SagaStatus, TestReport, TestSummary, TraceId,
};

/// Crate version, reported in the worker's startup banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience imports for downstream crates and tests.
pub mod prelude {
    pub use crate::collaborators::{CodeGenerator, Compensator, SandboxRunner};
    pub use crate::error::{AgentError, CallError, RequestError, SagaError};
    pub use crate::saga::SagaCoordinator;
    pub use crate::types::{
        AgentId, AgentPhase, FinalOutcome, InitialRequest, SagaSnapshot, SagaStatus, TestReport,
        TestSummary, TraceId,
    };
}
