//! Core types for the tandem orchestrator
//!
//! Defines the fundamental values the engine passes around:
//! - The validated initial request
//! - Trace and agent identifiers
//! - Per-agent run state and sandbox test reports
//! - Saga status, query snapshots, and the final outcome

use crate::error::RequestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Minimum accepted length of a functional description.
pub const MIN_DESCRIPTION_LEN: usize = 10;
/// Lowest accepted iteration bound.
pub const MIN_ITERATIONS: u32 = 1;
/// Highest accepted iteration bound.
pub const MAX_ITERATIONS: u32 = 20;

/// Opaque identifier correlating every call of one saga.
///
/// Generated exactly once at the saga boundary and propagated unchanged to
/// both agents, every collaborator call, and the final outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub Uuid);

impl TraceId {
    /// Generate a new trace id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two fixed agent slots of a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    /// First agent ("agent_a")
    #[serde(rename = "agent_a")]
    A,
    /// Second agent ("agent_b")
    #[serde(rename = "agent_b")]
    B,
}

impl AgentId {
    /// Canonical wire name of this slot
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AgentId::A => "agent_a",
            AgentId::B => "agent_b",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, immutable request that triggers one saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialRequest {
    /// Natural-language description of the function to build
    pub functional_description: String,
    /// URL of the archive containing the test bundle
    pub test_files_url: Url,
    /// Upper bound on generate/test cycles per agent (1..=20)
    pub max_iterations: u32,
}

impl InitialRequest {
    /// Build a validated request.
    ///
    /// # Errors
    /// - `RequestError::DescriptionTooShort` if the description has fewer
    ///   than [`MIN_DESCRIPTION_LEN`] characters after trimming
    /// - `RequestError::IterationsOutOfRange` if `max_iterations` falls
    ///   outside `1..=20`
    pub fn new(
        functional_description: impl Into<String>,
        test_files_url: Url,
        max_iterations: u32,
    ) -> Result<Self, RequestError> {
        let functional_description = functional_description.into();
        let len = functional_description.trim().chars().count();
        if len < MIN_DESCRIPTION_LEN {
            return Err(RequestError::DescriptionTooShort { len });
        }
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&max_iterations) {
            return Err(RequestError::IterationsOutOfRange {
                got: max_iterations,
            });
        }
        Ok(Self {
            functional_description,
            test_files_url,
            max_iterations,
        })
    }

    /// Build a validated request from an unparsed URL string.
    ///
    /// # Errors
    /// Additionally returns `RequestError::InvalidUrl` for a malformed URL.
    pub fn from_parts(
        functional_description: impl Into<String>,
        test_files_url: &str,
        max_iterations: u32,
    ) -> Result<Self, RequestError> {
        let url = Url::parse(test_files_url)?;
        Self::new(functional_description, url, max_iterations)
    }
}

/// Structured pass/fail counts from the sandbox report.
///
/// Unknown summary fields are preserved so refinement prompts can show the
/// sandbox's full picture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Number of passing tests
    #[serde(default)]
    pub passed: u64,
    /// Number of failing tests
    #[serde(default)]
    pub failed: u64,
    /// Any other counters the sandbox reports
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Structured report returned by the sandbox collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Aggregate counters; absent when execution broke before reporting
    #[serde(default)]
    pub summary: Option<TestSummary>,
    /// Per-test detail entries, passed through verbatim
    #[serde(default)]
    pub tests: Vec<serde_json::Value>,
    /// Captured standard output
    #[serde(default)]
    pub stdout: String,
    /// Captured standard error
    #[serde(default)]
    pub stderr: String,
    /// Hard execution error; non-empty means the run itself broke
    #[serde(default)]
    pub error: Option<String>,
}

/// Complete state of one agent's run.
///
/// Exclusively owned and mutated by its [`crate::AgentStateMachine`]; the
/// request and trace id it references are immutable and shared with the
/// sibling agent.
#[derive(Debug, Clone)]
pub struct AgentRunState {
    /// Which slot this agent occupies
    pub agent_id: AgentId,
    /// Opaque selector resolved by the gateway to a code-gen endpoint
    pub endpoint_selector: String,
    /// Saga-wide trace id
    pub trace_id: TraceId,
    /// Completed-or-in-progress iteration count, 0 before the first cycle
    pub current_iteration: u32,
    /// Iteration bound copied from the request
    pub max_iterations: u32,
    /// The request this run serves
    pub initial_request: Arc<InitialRequest>,
    /// Code produced by the most recent generation call
    pub last_generated_code: Option<String>,
    /// Report of the most recent failing test run
    pub last_test_errors: Option<TestReport>,
}

impl AgentRunState {
    /// Derive a fresh run state from the shared request.
    #[must_use]
    pub fn derive(
        agent_id: AgentId,
        endpoint_selector: impl Into<String>,
        trace_id: TraceId,
        initial_request: Arc<InitialRequest>,
    ) -> Self {
        Self {
            agent_id,
            endpoint_selector: endpoint_selector.into(),
            trace_id,
            current_iteration: 0,
            max_iterations: initial_request.max_iterations,
            initial_request,
            last_generated_code: None,
            last_test_errors: None,
        }
    }
}

/// Coarse phase label of an agent state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentPhase {
    /// Not started yet
    Pending,
    /// Generating code from the raw description
    Generating,
    /// Generating code from a refinement prompt
    Refining,
    /// Waiting on the sandbox run
    Testing,
    /// Classifying the sandbox report
    Parsing,
    /// Terminal: tests passed
    Succeeded,
    /// Terminal: unrecoverable failure
    Failed,
}

impl std::fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AgentPhase::Pending => "PENDING",
            AgentPhase::Generating => "GENERATING",
            AgentPhase::Refining => "REFINING",
            AgentPhase::Testing => "TESTING",
            AgentPhase::Parsing => "PARSING",
            AgentPhase::Succeeded => "SUCCEEDED",
            AgentPhase::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Lifecycle status of a saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Accepted, not yet running
    Pending,
    /// Both agents in flight
    Running,
    /// Both agents succeeded
    Success,
    /// A child failed terminally; compensations in flight
    FailedAndRollingBack,
    /// Compensation sweep finished
    RolledBack,
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SagaStatus::Pending => "PENDING",
            SagaStatus::Running => "RUNNING",
            SagaStatus::Success => "SUCCESS",
            SagaStatus::FailedAndRollingBack => "FAILED_AND_ROLLING_BACK",
            SagaStatus::RolledBack => "ROLLED_BACK",
        };
        f.write_str(label)
    }
}

/// Read-only view of one agent, servable at any point of its run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Which slot this snapshot describes
    pub agent_id: AgentId,
    /// Current coarse phase
    pub phase: AgentPhase,
    /// Iteration in progress (0 before the first)
    pub current_iteration: u32,
    /// Iteration bound
    pub max_iterations: u32,
    /// Summary of the most recent test run, if any completed
    pub last_test_summary: Option<TestSummary>,
}

impl AgentSnapshot {
    /// Placeholder snapshot for an agent that has not started.
    #[must_use]
    pub fn not_started(agent_id: AgentId, max_iterations: u32) -> Self {
        Self {
            agent_id,
            phase: AgentPhase::Pending,
            current_iteration: 0,
            max_iterations,
            last_test_summary: None,
        }
    }
}

/// Read-only view of a saga and its two agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaSnapshot {
    /// Saga lifecycle status
    pub status: SagaStatus,
    /// Trace id, absent until a run starts
    pub trace_id: Option<TraceId>,
    /// Agent A's latest snapshot, absent before the run starts
    pub agent_a: Option<AgentSnapshot>,
    /// Agent B's latest snapshot, absent before the run starts
    pub agent_b: Option<AgentSnapshot>,
}

/// Outcome of one compensation attempt; transient to the rollback phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationRecord {
    /// Agent whose artifacts were rolled back
    pub agent_id: AgentId,
    /// Whether the attempt succeeded
    pub outcome: CompensationOutcome,
}

/// Result of a single compensation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompensationOutcome {
    /// The compensating action completed
    Succeeded,
    /// The compensating action failed; logged, never blocks siblings
    Failed {
        /// Failure reason
        reason: String,
    },
}

/// Final report returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalOutcome {
    /// `Success` or `RolledBack`
    pub status: SagaStatus,
    /// Human-readable summary carrying the triggering reason on failure
    pub message: String,
    /// Saga-wide trace id
    pub trace_id: TraceId,
    /// Agent A's artifact; present only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_a: Option<String>,
    /// Agent B's artifact; present only on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_b: Option<String>,
    /// Structured failure detail for agent A; failure paths only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors_a: Option<serde_json::Value>,
    /// Structured failure detail for agent B; failure paths only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors_b: Option<serde_json::Value>,
}

impl FinalOutcome {
    /// Outcome for a saga where both agents passed.
    #[must_use]
    pub fn success(trace_id: TraceId, code_a: String, code_b: String) -> Self {
        Self {
            status: SagaStatus::Success,
            message: "Both agents succeeded.".to_string(),
            trace_id,
            code_a: Some(code_a),
            code_b: Some(code_b),
            errors_a: None,
            errors_b: None,
        }
    }

    /// Outcome for a saga that failed and finished its compensation sweep.
    #[must_use]
    pub fn rolled_back(
        trace_id: TraceId,
        reason: impl std::fmt::Display,
        errors_a: Option<serde_json::Value>,
        errors_b: Option<serde_json::Value>,
    ) -> Self {
        Self {
            status: SagaStatus::RolledBack,
            message: format!("Saga failed and was rolled back. Reason: {reason}"),
            trace_id,
            code_a: None,
            code_b: None,
            errors_a,
            errors_b,
        }
    }
}
