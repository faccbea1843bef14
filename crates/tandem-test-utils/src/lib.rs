//! # tandem-test-utils
//!
//! Scripted collaborator doubles and report fixtures for tandem tests.
//!
//! The doubles implement the `tandem-core` collaborator traits with queued,
//! per-call scripts plus full call recording, so tests can assert exactly
//! which prompts, selectors, and agents reached each collaborator.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tandem_core::collaborators::{CodeGenerator, Compensator, SandboxRunner};
use tandem_core::error::CallError;
use tandem_core::types::{AgentId, InitialRequest, TestReport, TestSummary, TraceId};
use url::Url;

/// One recorded call to [`ScriptedGenerator::generate`].
#[derive(Debug, Clone)]
pub struct GenerateCall {
    /// The prompt as the state machine built it
    pub prompt: String,
    /// The endpoint selector routed to
    pub selector: String,
    /// The trace id carried on the call
    pub trace_id: TraceId,
}

/// Code generator double with per-selector response queues.
///
/// Unscripted calls succeed with a placeholder snippet, so tests only script
/// the calls they care about.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<HashMap<String, VecDeque<Result<String, CallError>>>>,
    calls: Mutex<Vec<GenerateCall>>,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for calls routed to `selector`.
    pub fn script(&self, selector: &str, response: Result<String, CallError>) {
        self.responses
            .lock()
            .entry(selector.to_string())
            .or_default()
            .push_back(response);
    }

    /// Queue one successful generation for `selector`.
    pub fn script_code(&self, selector: &str, code: &str) {
        self.script(selector, Ok(code.to_string()));
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        selector: &str,
        trace_id: TraceId,
    ) -> Result<String, CallError> {
        self.calls.lock().push(GenerateCall {
            prompt: prompt.to_string(),
            selector: selector.to_string(),
            trace_id,
        });
        if let Some(queue) = self.responses.lock().get_mut(selector) {
            if let Some(response) = queue.pop_front() {
                return response;
            }
        }
        Ok(format!("// candidate for selector {selector}"))
    }
}

/// One recorded call to [`ScriptedSandbox::run_tests`].
#[derive(Debug, Clone)]
pub struct SandboxCall {
    /// The submitted code
    pub code: String,
    /// The test bundle URL
    pub test_files_url: Url,
    /// The trace id carried on the call
    pub trace_id: TraceId,
}

/// Sandbox double with marker-keyed and fallback response queues.
///
/// A marker rule fires when the submitted code contains its marker string;
/// otherwise the shared fallback queue is popped. With nothing queued, the
/// run reports one passing test.
#[derive(Default)]
pub struct ScriptedSandbox {
    rules: Mutex<Vec<(String, VecDeque<Result<TestReport, CallError>>)>>,
    fallback: Mutex<VecDeque<Result<TestReport, CallError>>>,
    calls: Mutex<Vec<SandboxCall>>,
}

impl ScriptedSandbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `report` for submissions whose code contains `marker`.
    pub fn on_code(&self, marker: &str, report: TestReport) {
        self.on_code_response(marker, Ok(report));
    }

    /// Queue a call error for submissions whose code contains `marker`.
    pub fn on_code_error(&self, marker: &str, error: CallError) {
        self.on_code_response(marker, Err(error));
    }

    fn on_code_response(&self, marker: &str, response: Result<TestReport, CallError>) {
        let mut rules = self.rules.lock();
        if let Some((_, queue)) = rules.iter_mut().find(|(m, _)| m == marker) {
            queue.push_back(response);
        } else {
            rules.push((marker.to_string(), VecDeque::from([response])));
        }
    }

    /// Queue `report` on the shared fallback queue.
    pub fn push(&self, report: TestReport) {
        self.fallback.lock().push_back(Ok(report));
    }

    /// Queue a call error on the shared fallback queue.
    pub fn push_error(&self, error: CallError) {
        self.fallback.lock().push_back(Err(error));
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<SandboxCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SandboxRunner for ScriptedSandbox {
    async fn run_tests(
        &self,
        code: &str,
        test_files_url: &Url,
        trace_id: TraceId,
    ) -> Result<TestReport, CallError> {
        self.calls.lock().push(SandboxCall {
            code: code.to_string(),
            test_files_url: test_files_url.clone(),
            trace_id,
        });
        {
            let mut rules = self.rules.lock();
            if let Some((_, queue)) = rules
                .iter_mut()
                .find(|(marker, queue)| code.contains(marker.as_str()) && !queue.is_empty())
            {
                if let Some(response) = queue.pop_front() {
                    return response;
                }
            }
        }
        if let Some(response) = self.fallback.lock().pop_front() {
            return response;
        }
        Ok(passing_report(1))
    }
}

/// Compensator double recording every call, optionally failing per agent.
#[derive(Default)]
pub struct RecordingCompensator {
    calls: Mutex<Vec<AgentId>>,
    failing: Mutex<HashSet<AgentId>>,
}

impl RecordingCompensator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every compensation call for `agent_id` fail.
    pub fn fail_for(&self, agent_id: AgentId) {
        self.failing.lock().insert(agent_id);
    }

    /// Every compensation call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<AgentId> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Compensator for RecordingCompensator {
    async fn compensate(&self, agent_id: AgentId) -> Result<(), CallError> {
        self.calls.lock().push(agent_id);
        if self.failing.lock().contains(&agent_id) {
            return Err(CallError::Transient(format!(
                "scripted compensation failure for {agent_id}"
            )));
        }
        Ok(())
    }
}

/// Generator that never completes; for cancellation tests.
#[derive(Debug, Default)]
pub struct StalledGenerator;

#[async_trait]
impl CodeGenerator for StalledGenerator {
    async fn generate(
        &self,
        _prompt: &str,
        _selector: &str,
        _trace_id: TraceId,
    ) -> Result<String, CallError> {
        futures::future::pending().await
    }
}

/// Report with `passed` passing tests and no failures.
#[must_use]
pub fn passing_report(passed: u64) -> TestReport {
    TestReport {
        summary: Some(TestSummary {
            passed,
            failed: 0,
            ..TestSummary::default()
        }),
        stdout: format!("{passed} passed"),
        ..TestReport::default()
    }
}

/// Report with mixed pass/fail counts.
#[must_use]
pub fn failing_report(passed: u64, failed: u64) -> TestReport {
    TestReport {
        summary: Some(TestSummary {
            passed,
            failed,
            ..TestSummary::default()
        }),
        stderr: format!("{failed} failed"),
        ..TestReport::default()
    }
}

/// Report with a hard execution error and no summary.
#[must_use]
pub fn error_report(message: &str) -> TestReport {
    TestReport {
        error: Some(message.to_string()),
        ..TestReport::default()
    }
}

/// A valid request with the given iteration bound.
///
/// # Panics
/// Never; the inputs satisfy request validation by construction.
#[must_use]
pub fn sample_request_with_iterations(max_iterations: u32) -> InitialRequest {
    match InitialRequest::from_parts(
        "Implement a bounded FIFO queue with push, pop, and len",
        "https://example.com/tests.tar.gz",
        max_iterations,
    ) {
        Ok(request) => request,
        Err(err) => unreachable!("fixture request is valid: {err}"),
    }
}

/// A valid request with a three-iteration bound.
#[must_use]
pub fn sample_request() -> InitialRequest {
    sample_request_with_iterations(3)
}
