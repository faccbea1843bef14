//! Error taxonomy for the tandem orchestrator
//!
//! Three layers, matching how failures propagate:
//! - [`RequestError`]: the inbound request was invalid; nothing started.
//! - [`CallError`]: one outbound collaborator call failed, already classified
//!   for the retry evaluator.
//! - [`AgentError`]: an agent reached a terminal failure; only these surface
//!   to the saga, where they trigger compensation rather than a generic abort.

use tandem_substrate::{Classify, ErrorClass};

/// Validation failures for the inbound request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Description shorter than the accepted minimum
    #[error("functional description too short ({len} chars, minimum {})", crate::types::MIN_DESCRIPTION_LEN)]
    DescriptionTooShort {
        /// Observed character count
        len: usize,
    },

    /// Iteration bound outside 1..=20
    #[error("max_iterations out of range: {got} (accepted {}..={})", crate::types::MIN_ITERATIONS, crate::types::MAX_ITERATIONS)]
    IterationsOutOfRange {
        /// Observed value
        got: u32,
    },

    /// Test bundle URL did not parse
    #[error("invalid test_files_url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Failure of a single outbound collaborator call.
///
/// The gateway classifies at the point of failure; the retry evaluator acts
/// on the classification and nothing else.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Missing or unresolvable configuration; retrying cannot help
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level or service failure; eligible for retry
    #[error("transient call failure: {0}")]
    Transient(String),
}

impl Classify for CallError {
    fn class(&self) -> ErrorClass {
        match self {
            CallError::Configuration(_) => ErrorClass::NonRetryable,
            CallError::Transient(_) => ErrorClass::Retryable,
        }
    }
}

/// Terminal failure of one agent's run.
///
/// Retryable conditions are resolved inside the agent loop; by the time one
/// of these is returned the agent is done.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Unresolvable endpoint selector or similar deployment defect
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Code-generation call failed even after the gateway's retries
    #[error("code generation failed after retries: {0}")]
    GenerationExhausted(String),

    /// Sandbox call failed even after the gateway's retries
    #[error("sandbox unavailable after retries: {0}")]
    SandboxUnavailable(String),

    /// Sandbox reported a hard error or produced no parseable report
    #[error("unrecoverable execution failure: {0}")]
    ExecutionTerminal(String),

    /// Loop reached the iteration bound without a passing run
    #[error("max iterations ({max_iterations}) reached without passing tests")]
    IterationsExhausted {
        /// The bound that was exhausted
        max_iterations: u32,
    },

    /// Hard-terminated by saga cancellation
    #[error("agent cancelled")]
    Cancelled,
}

impl AgentError {
    /// Whether this failure is a deployment defect rather than a run outcome.
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

/// Saga-level failures that are not part of the normal rolled-back outcome.
#[derive(Debug, thiserror::Error)]
pub enum SagaError {
    /// Inbound request failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    /// The saga itself was hard-terminated
    #[error("saga cancelled")]
    Cancelled,
}
