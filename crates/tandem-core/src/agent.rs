//! Per-agent retry state machine
//!
//! Drives one agent through its bounded generate→test→refine loop:
//! `Pending → {Generating | Refining} → Testing → Parsing → (loop) |
//! Succeeded | Failed`. Each run state is exclusively owned by its machine;
//! the only shared inputs (request, trace id) are immutable.
//!
//! Suspension points are exactly the two collaborator calls and the backoff
//! timer. Backoff always goes through the substrate clock so a durable
//! deployment can replay it deterministically.

use crate::classify::{classify_report, IterationOutcome};
use crate::collaborators::{CodeGenerator, SandboxRunner};
use crate::error::{AgentError, CallError};
use crate::prompt::refinement_prompt;
use crate::types::{AgentPhase, AgentRunState, AgentSnapshot, TestSummary};
use std::sync::Arc;
use std::time::Duration;
use tandem_substrate::{SagaClock, TransitionJournal};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Deterministic backoff before the next iteration: `2^i` seconds for the
/// zero-based iteration index, optionally capped.
fn backoff_delay(iteration_index: u32, ceiling: Option<Duration>) -> Duration {
    // Shift saturates at 2^62s, far beyond any configurable ceiling.
    let delay = Duration::from_secs(1u64 << iteration_index.min(62));
    match ceiling {
        Some(cap) => delay.min(cap),
        None => delay,
    }
}

/// State machine for one agent's bounded retry loop.
pub struct AgentStateMachine {
    state: AgentRunState,
    phase: AgentPhase,
    last_summary: Option<TestSummary>,
    generator: Arc<dyn CodeGenerator>,
    sandbox: Arc<dyn SandboxRunner>,
    clock: Arc<dyn SagaClock>,
    journal: Arc<TransitionJournal>,
    backoff_ceiling: Option<Duration>,
    cancel: CancellationToken,
    snapshot_tx: watch::Sender<AgentSnapshot>,
}

impl AgentStateMachine {
    /// Create a machine in the `Pending` phase.
    #[must_use]
    pub fn new(
        state: AgentRunState,
        generator: Arc<dyn CodeGenerator>,
        sandbox: Arc<dyn SandboxRunner>,
        clock: Arc<dyn SagaClock>,
        journal: Arc<TransitionJournal>,
        backoff_ceiling: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        let initial = AgentSnapshot::not_started(state.agent_id, state.max_iterations);
        let (snapshot_tx, _) = watch::channel(initial);
        Self {
            state,
            phase: AgentPhase::Pending,
            last_summary: None,
            generator,
            sandbox,
            clock,
            journal,
            backoff_ceiling,
            cancel,
            snapshot_tx,
        }
    }

    /// Subscribe to live snapshots.
    ///
    /// The receiver keeps serving the last published snapshot after the
    /// machine's task has finished, which is what the saga's status query
    /// returns for completed agents.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AgentSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current read-only snapshot.
    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.state.agent_id,
            phase: self.phase,
            current_iteration: self.state.current_iteration,
            max_iterations: self.state.max_iterations,
            last_test_summary: self.last_summary.clone(),
        }
    }

    /// Record a phase transition: journal it, publish a fresh snapshot.
    fn enter(&mut self, next: AgentPhase) {
        self.journal.append(
            &self.state.trace_id.to_string(),
            self.state.agent_id.as_str(),
            &self.phase.to_string(),
            &next.to_string(),
        );
        tracing::debug!(
            agent_id = %self.state.agent_id,
            trace_id = %self.state.trace_id,
            from = %self.phase,
            to = %next,
            "agent transition"
        );
        self.phase = next;
        self.snapshot_tx.send_replace(self.snapshot());
    }

    fn fail(&mut self, err: AgentError) -> AgentError {
        self.enter(AgentPhase::Failed);
        err
    }

    /// Run the loop to a terminal outcome.
    ///
    /// Returns the passing code on success. Every error is terminal for this
    /// agent; retryable conditions never escape the loop.
    pub async fn run(mut self) -> Result<String, AgentError> {
        tracing::info!(
            agent_id = %self.state.agent_id,
            trace_id = %self.state.trace_id,
            max_iterations = self.state.max_iterations,
            "agent state machine started"
        );
        let cancel = self.cancel.clone();

        for i in 0..self.state.max_iterations {
            if cancel.is_cancelled() {
                return Err(self.fail(AgentError::Cancelled));
            }
            self.state.current_iteration = i + 1;
            tracing::info!(
                agent_id = %self.state.agent_id,
                trace_id = %self.state.trace_id,
                iteration = self.state.current_iteration,
                max_iterations = self.state.max_iterations,
                "starting iteration"
            );

            // 1. Raw prompt on a fresh attempt; corrective prompt once a
            //    candidate has failed tests.
            let prompt = match (&self.state.last_generated_code, &self.state.last_test_errors) {
                (Some(code), Some(errors)) => {
                    let prompt = refinement_prompt(&self.state.initial_request, code, errors);
                    self.enter(AgentPhase::Refining);
                    prompt
                }
                _ => {
                    self.enter(AgentPhase::Generating);
                    self.state.initial_request.functional_description.clone()
                }
            };

            // 2. Code generation.
            let generated = tokio::select! {
                _ = cancel.cancelled() => return Err(self.fail(AgentError::Cancelled)),
                result = self.generator.generate(
                    &prompt,
                    &self.state.endpoint_selector,
                    self.state.trace_id,
                ) => match result {
                    Ok(code) => code,
                    Err(CallError::Configuration(reason)) => {
                        return Err(self.fail(AgentError::Configuration(reason)));
                    }
                    Err(CallError::Transient(reason)) => {
                        return Err(self.fail(AgentError::GenerationExhausted(reason)));
                    }
                },
            };
            self.state.last_generated_code = Some(generated.clone());

            // 3. Sandbox run.
            self.enter(AgentPhase::Testing);
            let report = tokio::select! {
                _ = cancel.cancelled() => return Err(self.fail(AgentError::Cancelled)),
                result = self.sandbox.run_tests(
                    &generated,
                    &self.state.initial_request.test_files_url,
                    self.state.trace_id,
                ) => match result {
                    Ok(report) => report,
                    Err(CallError::Configuration(reason)) => {
                        return Err(self.fail(AgentError::Configuration(reason)));
                    }
                    Err(CallError::Transient(reason)) => {
                        return Err(self.fail(AgentError::SandboxUnavailable(reason)));
                    }
                },
            };
            self.last_summary = report.summary.clone();

            // 4. Classification.
            self.enter(AgentPhase::Parsing);
            match classify_report(&report) {
                IterationOutcome::Passed => {
                    tracing::info!(
                        agent_id = %self.state.agent_id,
                        trace_id = %self.state.trace_id,
                        iteration = self.state.current_iteration,
                        "tests passed"
                    );
                    self.enter(AgentPhase::Succeeded);
                    return Ok(generated);
                }
                IterationOutcome::TerminalFailure(reason) => {
                    tracing::error!(
                        agent_id = %self.state.agent_id,
                        trace_id = %self.state.trace_id,
                        reason = %reason,
                        "terminal execution failure"
                    );
                    return Err(self.fail(AgentError::ExecutionTerminal(reason)));
                }
                IterationOutcome::RetryableFailure => {
                    tracing::warn!(
                        agent_id = %self.state.agent_id,
                        trace_id = %self.state.trace_id,
                        iteration = self.state.current_iteration,
                        "tests failed, will refine"
                    );
                    self.state.last_test_errors = Some(report);
                    if self.state.current_iteration == self.state.max_iterations {
                        break;
                    }

                    // 5. Deterministic backoff through the substrate timer.
                    let delay = backoff_delay(i, self.backoff_ceiling);
                    tracing::info!(
                        agent_id = %self.state.agent_id,
                        trace_id = %self.state.trace_id,
                        delay_secs = delay.as_secs(),
                        "backing off before next iteration"
                    );
                    let clock = Arc::clone(&self.clock);
                    let cancelled = tokio::select! {
                        _ = cancel.cancelled() => true,
                        _ = clock.sleep(delay) => false,
                    };
                    if cancelled {
                        return Err(self.fail(AgentError::Cancelled));
                    }
                }
            }
        }

        let max_iterations = self.state.max_iterations;
        Err(self.fail(AgentError::IterationsExhausted { max_iterations }))
    }
}

#[cfg(test)]
mod tests {
    use super::backoff_delay;
    use std::sync::Arc;
    use std::time::Duration;
    use tandem_core::error::{AgentError, CallError};
    use tandem_core::types::{AgentId, AgentPhase, AgentRunState, TraceId};
    use tandem_core::AgentStateMachine;
    use tandem_substrate::{TransitionJournal, VirtualClock};
    use tandem_test_utils::{
        error_report, failing_report, passing_report, sample_request_with_iterations,
        ScriptedGenerator, ScriptedSandbox,
    };
    use tokio_util::sync::CancellationToken;

    fn machine(
        max_iterations: u32,
        generator: Arc<ScriptedGenerator>,
        sandbox: Arc<ScriptedSandbox>,
        clock: Arc<VirtualClock>,
    ) -> AgentStateMachine {
        let request = Arc::new(sample_request_with_iterations(max_iterations));
        let state = AgentRunState::derive(
            AgentId::A,
            "model_a",
            TraceId::new(),
            request,
        );
        AgentStateMachine::new(
            state,
            generator,
            sandbox,
            clock,
            Arc::new(TransitionJournal::new()),
            None,
            CancellationToken::new(),
        )
    }

    #[test]
    fn backoff_is_exactly_two_to_the_i_seconds() {
        assert_eq!(backoff_delay(0, None), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, None), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, None), Duration::from_secs(4));
        assert_eq!(backoff_delay(10, None), Duration::from_secs(1024));
    }

    #[test]
    fn backoff_ceiling_caps_the_delay() {
        let ceiling = Some(Duration::from_secs(60));
        assert_eq!(backoff_delay(3, ceiling), Duration::from_secs(8));
        assert_eq!(backoff_delay(10, ceiling), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn first_pass_succeeds_without_refinement() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.script_code("model_a", "fn add(a: i32, b: i32) -> i32 { a + b }");
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.push(passing_report(3));
        let clock = Arc::new(VirtualClock::new());

        let result = machine(3, generator.clone(), sandbox, clock.clone())
            .run()
            .await;

        assert_eq!(
            result.unwrap(),
            "fn add(a: i32, b: i32) -> i32 { a + b }"
        );
        assert_eq!(generator.calls().len(), 1);
        assert!(clock.slept().is_empty());
    }

    #[tokio::test]
    async fn failing_tests_feed_the_refinement_prompt() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.script_code("model_a", "broken candidate");
        generator.script_code("model_a", "fixed candidate");
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.push(failing_report(1, 2));
        sandbox.push(passing_report(3));
        let clock = Arc::new(VirtualClock::new());

        let result = machine(3, generator.clone(), sandbox, clock.clone())
            .run()
            .await;

        assert_eq!(result.unwrap(), "fixed candidate");
        let calls = generator.calls();
        assert_eq!(calls.len(), 2);
        // Second prompt is corrective: original task + failing code + report.
        assert!(calls[1].prompt.contains("broken candidate"));
        assert!(calls[1].prompt.contains("\"failed\": 2"));
        assert_eq!(clock.slept(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn never_passing_agent_runs_exactly_max_iterations() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sandbox = Arc::new(ScriptedSandbox::new());
        for _ in 0..4 {
            sandbox.push(failing_report(0, 1));
        }
        let clock = Arc::new(VirtualClock::new());

        let result = machine(4, generator.clone(), sandbox.clone(), clock.clone())
            .run()
            .await;

        assert!(matches!(
            result,
            Err(AgentError::IterationsExhausted { max_iterations: 4 })
        ));
        assert_eq!(generator.calls().len(), 4);
        assert_eq!(sandbox.calls().len(), 4);
        // No backoff after the final iteration.
        assert_eq!(
            clock.slept(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );
    }

    #[tokio::test]
    async fn sandbox_error_field_is_terminal_despite_summary() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sandbox = Arc::new(ScriptedSandbox::new());
        let mut report = passing_report(3);
        report.error = Some("workspace corrupted".to_string());
        sandbox.push(report);
        let clock = Arc::new(VirtualClock::new());

        let result = machine(5, generator, sandbox, clock.clone()).run().await;

        match result {
            Err(AgentError::ExecutionTerminal(reason)) => {
                assert_eq!(reason, "workspace corrupted");
            }
            other => panic!("expected terminal failure, got {other:?}"),
        }
        assert!(clock.slept().is_empty());
    }

    #[tokio::test]
    async fn unparseable_report_is_terminal() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.push(error_report("report.json not found"));
        let clock = Arc::new(VirtualClock::new());

        let result = machine(5, generator, sandbox, clock).run().await;
        assert!(matches!(result, Err(AgentError::ExecutionTerminal(_))));
    }

    #[tokio::test]
    async fn unresolvable_selector_fails_immediately() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.script(
            "model_a",
            Err(CallError::Configuration(
                "unknown model endpoint selector: model_a".to_string(),
            )),
        );
        let sandbox = Arc::new(ScriptedSandbox::new());
        let clock = Arc::new(VirtualClock::new());

        let result = machine(5, generator, sandbox.clone(), clock).run().await;

        assert!(matches!(result, Err(AgentError::Configuration(_))));
        // Never reached the sandbox.
        assert!(sandbox.calls().is_empty());
    }

    #[tokio::test]
    async fn exhausted_generation_retries_are_terminal() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.script(
            "model_a",
            Err(CallError::Transient("503 after 3 attempts".to_string())),
        );
        let sandbox = Arc::new(ScriptedSandbox::new());
        let clock = Arc::new(VirtualClock::new());

        let result = machine(5, generator, sandbox, clock).run().await;
        assert!(matches!(result, Err(AgentError::GenerationExhausted(_))));
    }

    #[tokio::test]
    async fn snapshot_is_servable_while_running_and_after_completion() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sandbox = Arc::new(ScriptedSandbox::new());
        sandbox.push(failing_report(2, 1));
        sandbox.push(passing_report(3));
        let clock = Arc::new(VirtualClock::new());

        let m = machine(3, generator, sandbox, clock);
        let rx = m.subscribe();
        assert_eq!(rx.borrow().phase, AgentPhase::Pending);

        m.run().await.unwrap();

        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.phase, AgentPhase::Succeeded);
        assert_eq!(snapshot.current_iteration, 2);
        assert_eq!(snapshot.last_test_summary.unwrap().passed, 3);
    }

    #[tokio::test]
    async fn pre_cancelled_agent_fails_without_calls() {
        let generator = Arc::new(ScriptedGenerator::new());
        let sandbox = Arc::new(ScriptedSandbox::new());
        let clock = Arc::new(VirtualClock::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let request = Arc::new(sample_request_with_iterations(3));
        let state = AgentRunState::derive(
            AgentId::B,
            "model_b",
            TraceId::new(),
            request,
        );
        let m = AgentStateMachine::new(
            state,
            generator.clone(),
            sandbox,
            clock,
            Arc::new(TransitionJournal::new()),
            None,
            cancel,
        );

        assert!(matches!(m.run().await, Err(AgentError::Cancelled)));
        assert!(generator.calls().is_empty());
    }
}
