//! Saga coordinator
//!
//! Runs the all-or-nothing transaction over two concurrent agents:
//! - Forks one [`AgentStateMachine`] per slot and awaits both.
//! - On joint success, reports both artifacts.
//! - On any terminal failure, sweeps compensation over every agent that had
//!   confirmed success and reports a rolled-back outcome.
//!
//! The coordinator never aborts on the first child failure; a partial success
//! is indistinguishable from a full failure in the final report, except for
//! the structured per-agent error detail.

use crate::agent::AgentStateMachine;
use crate::collaborators::{CodeGenerator, Compensator, SandboxRunner};
use crate::error::{AgentError, SagaError};
use crate::types::{
    AgentId, AgentRunState, AgentSnapshot, CompensationOutcome, CompensationRecord, FinalOutcome,
    InitialRequest, SagaSnapshot, SagaStatus, TraceId,
};
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tandem_substrate::{SagaClock, TransitionJournal};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Journal subject for saga-level transitions; agents use their slot names.
const SAGA_SUBJECT: &str = "saga";

/// Queryable state shared between `run` and `snapshot`.
struct QueryState {
    status: SagaStatus,
    trace_id: Option<TraceId>,
    rx_a: Option<watch::Receiver<AgentSnapshot>>,
    rx_b: Option<watch::Receiver<AgentSnapshot>>,
}

/// Coordinator for one two-agent saga.
pub struct SagaCoordinator {
    generator: Arc<dyn CodeGenerator>,
    sandbox: Arc<dyn SandboxRunner>,
    compensator: Arc<dyn Compensator>,
    clock: Arc<dyn SagaClock>,
    journal: Arc<TransitionJournal>,
    selector_a: String,
    selector_b: String,
    backoff_ceiling: Option<Duration>,
    inner: Mutex<QueryState>,
}

impl SagaCoordinator {
    /// Create a coordinator with default endpoint selectors.
    #[must_use]
    pub fn new(
        generator: Arc<dyn CodeGenerator>,
        sandbox: Arc<dyn SandboxRunner>,
        compensator: Arc<dyn Compensator>,
        clock: Arc<dyn SagaClock>,
        journal: Arc<TransitionJournal>,
    ) -> Self {
        Self {
            generator,
            sandbox,
            compensator,
            clock,
            journal,
            selector_a: "model_a".to_string(),
            selector_b: "model_b".to_string(),
            backoff_ceiling: None,
            inner: Mutex::new(QueryState {
                status: SagaStatus::Pending,
                trace_id: None,
                rx_a: None,
                rx_b: None,
            }),
        }
    }

    /// Set the per-slot endpoint selectors, fixed for the deployment.
    #[must_use]
    pub fn with_selectors(
        mut self,
        selector_a: impl Into<String>,
        selector_b: impl Into<String>,
    ) -> Self {
        self.selector_a = selector_a.into();
        self.selector_b = selector_b.into();
        self
    }

    /// Cap the exponential backoff between iterations.
    #[must_use]
    pub fn with_backoff_ceiling(mut self, ceiling: Duration) -> Self {
        self.backoff_ceiling = Some(ceiling);
        self
    }

    /// Last-known snapshot of the saga and both agents.
    ///
    /// Servable at any time, including after completion; the watch channels
    /// retain each agent's final snapshot once its task has finished.
    #[must_use]
    pub fn snapshot(&self) -> SagaSnapshot {
        let inner = self.inner.lock();
        SagaSnapshot {
            status: inner.status,
            trace_id: inner.trace_id,
            agent_a: inner.rx_a.as_ref().map(|rx| rx.borrow().clone()),
            agent_b: inner.rx_b.as_ref().map(|rx| rx.borrow().clone()),
        }
    }

    fn set_status(&self, trace_id: TraceId, next: SagaStatus) {
        let from = {
            let mut inner = self.inner.lock();
            let from = inner.status;
            inner.status = next;
            from
        };
        self.journal.append(
            &trace_id.to_string(),
            SAGA_SUBJECT,
            &from.to_string(),
            &next.to_string(),
        );
        tracing::info!(trace_id = %trace_id, from = %from, to = %next, "saga transition");
    }

    /// Run the saga to completion.
    ///
    /// Both the success and the rolled-back outcome are `Ok`; `Err` covers
    /// invalid requests (via conversion) and hard cancellation, where agents
    /// stop at their next suspension point and no compensation runs.
    pub async fn run(
        &self,
        request: InitialRequest,
        cancel: CancellationToken,
    ) -> Result<FinalOutcome, SagaError> {
        let trace_id = TraceId::new();
        tracing::info!(
            trace_id = %trace_id,
            max_iterations = request.max_iterations,
            "saga accepted"
        );
        let request = Arc::new(request);

        // Child tokens so cancelling the saga reaches both agents; the drop
        // guard stops them if this future itself is dropped mid-flight.
        let agents_token = cancel.child_token();
        let _guard = agents_token.clone().drop_guard();

        let machine_a = self.fork(AgentId::A, &self.selector_a, trace_id, &request, &agents_token);
        let machine_b = self.fork(AgentId::B, &self.selector_b, trace_id, &request, &agents_token);
        {
            let mut inner = self.inner.lock();
            inner.trace_id = Some(trace_id);
            inner.rx_a = Some(machine_a.subscribe());
            inner.rx_b = Some(machine_b.subscribe());
        }
        self.set_status(trace_id, SagaStatus::Running);

        let task_a = tokio::spawn(machine_a.run());
        let task_b = tokio::spawn(machine_b.run());
        let (result_a, result_b) = tokio::join!(task_a, task_b);
        let result_a = flatten_join(result_a);
        let result_b = flatten_join(result_b);

        if cancel.is_cancelled() {
            tracing::warn!(trace_id = %trace_id, "saga cancelled");
            return Err(SagaError::Cancelled);
        }

        match (result_a, result_b) {
            (Ok(code_a), Ok(code_b)) => {
                self.set_status(trace_id, SagaStatus::Success);
                Ok(FinalOutcome::success(trace_id, code_a, code_b))
            }
            (result_a, result_b) => {
                self.set_status(trace_id, SagaStatus::FailedAndRollingBack);

                // The message carries the first terminal failure by slot
                // order; both failures stay visible in the structured detail.
                let reason = result_a
                    .as_ref()
                    .err()
                    .or_else(|| result_b.as_ref().err())
                    .map_or_else(|| "unknown failure".to_string(), ToString::to_string);

                let to_compensate: Vec<AgentId> = [
                    result_a.is_ok().then_some(AgentId::A),
                    result_b.is_ok().then_some(AgentId::B),
                ]
                .into_iter()
                .flatten()
                .collect();
                let records = self.compensate_all(trace_id, &to_compensate).await;
                for record in &records {
                    if let CompensationOutcome::Failed { reason } = &record.outcome {
                        tracing::error!(
                            trace_id = %trace_id,
                            agent_id = %record.agent_id,
                            reason = %reason,
                            "compensation failed; continuing sweep"
                        );
                    }
                }

                self.set_status(trace_id, SagaStatus::RolledBack);
                let errors_a = self.failure_detail(AgentId::A, result_a.err());
                let errors_b = self.failure_detail(AgentId::B, result_b.err());
                Ok(FinalOutcome::rolled_back(
                    trace_id, reason, errors_a, errors_b,
                ))
            }
        }
    }

    fn fork(
        &self,
        agent_id: AgentId,
        selector: &str,
        trace_id: TraceId,
        request: &Arc<InitialRequest>,
        agents_token: &CancellationToken,
    ) -> AgentStateMachine {
        let state = AgentRunState::derive(agent_id, selector, trace_id, Arc::clone(request));
        AgentStateMachine::new(
            state,
            Arc::clone(&self.generator),
            Arc::clone(&self.sandbox),
            Arc::clone(&self.clock),
            Arc::clone(&self.journal),
            self.backoff_ceiling,
            agents_token.child_token(),
        )
    }

    /// Fan compensation out over every confirmed-successful agent.
    ///
    /// All calls run concurrently and every one is attempted; a failure is
    /// recorded, never allowed to short-circuit its siblings.
    async fn compensate_all(
        &self,
        trace_id: TraceId,
        agents: &[AgentId],
    ) -> Vec<CompensationRecord> {
        join_all(agents.iter().copied().map(|agent_id| {
            let compensator = Arc::clone(&self.compensator);
            async move {
                tracing::info!(trace_id = %trace_id, agent_id = %agent_id, "compensating");
                let outcome = match compensator.compensate(agent_id).await {
                    Ok(()) => CompensationOutcome::Succeeded,
                    Err(err) => CompensationOutcome::Failed {
                        reason: err.to_string(),
                    },
                };
                CompensationRecord { agent_id, outcome }
            }
        }))
        .await
    }

    /// Structured failure detail for one agent, folding in its last snapshot.
    fn failure_detail(
        &self,
        agent_id: AgentId,
        error: Option<AgentError>,
    ) -> Option<serde_json::Value> {
        let error = error?;
        let last_summary = {
            let inner = self.inner.lock();
            let rx = match agent_id {
                AgentId::A => inner.rx_a.as_ref(),
                AgentId::B => inner.rx_b.as_ref(),
            };
            rx.and_then(|rx| rx.borrow().last_test_summary.clone())
        };
        Some(serde_json::json!({
            "agent_id": agent_id.as_str(),
            "error": error.to_string(),
            "last_test_summary": last_summary,
        }))
    }
}

fn flatten_join(
    result: Result<Result<String, AgentError>, tokio::task::JoinError>,
) -> Result<String, AgentError> {
    match result {
        Ok(inner) => inner,
        Err(join_error) => Err(AgentError::ExecutionTerminal(format!(
            "agent task aborted: {join_error}"
        ))),
    }
}
