//! Collaborator seams
//!
//! The engine calls its three external collaborators through these traits.
//! Production implementations live in `tandem-gateway`; scripted doubles in
//! `tandem-test-utils`. Retry behavior for transient failures belongs to the
//! implementation: by the time a [`CallError`] reaches the state machine,
//! its retry budget is already spent.

use crate::error::CallError;
use crate::types::{AgentId, TestReport, TraceId};
use async_trait::async_trait;
use url::Url;

/// Outbound code-generation service.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate code for `prompt` against the endpoint named by `selector`.
    ///
    /// # Errors
    /// - `CallError::Configuration` when `selector` cannot be resolved
    /// - `CallError::Transient` when the service stayed unreachable or kept
    ///   returning errors through the implementation's retry budget
    async fn generate(
        &self,
        prompt: &str,
        selector: &str,
        trace_id: TraceId,
    ) -> Result<String, CallError>;
}

/// Outbound sandboxed test-execution service.
///
/// The implementation is trusted to run the code with no outbound network,
/// bounded memory and process counts, a read-only root filesystem outside one
/// scratch workspace, a hard wall-clock timeout, and safe archive extraction
/// that rejects entries escaping the workspace.
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    /// Execute `code` against the test bundle at `test_files_url`.
    ///
    /// A broken execution is reported inside the returned [`TestReport`]
    /// (`error` populated), not as a `CallError`; `CallError::Transient`
    /// covers only exhausted connectivity retries.
    async fn run_tests(
        &self,
        code: &str,
        test_files_url: &Url,
        trace_id: TraceId,
    ) -> Result<TestReport, CallError>;
}

/// Outbound compensation action.
#[async_trait]
pub trait Compensator: Send + Sync {
    /// Undo the artifacts of a previously successful agent.
    ///
    /// Must be idempotent: invoking it more than once for the same
    /// `agent_id` has no effect beyond the first successful invocation.
    async fn compensate(&self, agent_id: AgentId) -> Result<(), CallError>;
}
