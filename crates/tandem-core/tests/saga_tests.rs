//! End-to-end saga scenarios against scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tandem_core::prelude::*;
use tandem_core::types::AgentPhase;
use tandem_substrate::{TransitionJournal, VirtualClock};
use tandem_test_utils::{
    error_report, failing_report, passing_report, sample_request, RecordingCompensator,
    ScriptedGenerator, ScriptedSandbox, StalledGenerator,
};
use tokio_util::sync::CancellationToken;

struct Harness {
    generator: Arc<ScriptedGenerator>,
    sandbox: Arc<ScriptedSandbox>,
    compensator: Arc<RecordingCompensator>,
    clock: Arc<VirtualClock>,
    journal: Arc<TransitionJournal>,
}

impl Harness {
    fn new() -> Self {
        Self {
            generator: Arc::new(ScriptedGenerator::new()),
            sandbox: Arc::new(ScriptedSandbox::new()),
            compensator: Arc::new(RecordingCompensator::new()),
            clock: Arc::new(VirtualClock::new()),
            journal: Arc::new(TransitionJournal::new()),
        }
    }

    fn coordinator(&self) -> SagaCoordinator {
        SagaCoordinator::new(
            self.generator.clone(),
            self.sandbox.clone(),
            self.compensator.clone(),
            self.clock.clone(),
            self.journal.clone(),
        )
    }
}

#[tokio::test]
async fn both_agents_passing_yields_success_with_both_artifacts() {
    let h = Harness::new();
    h.generator.script_code("model_a", "code by a");
    h.generator.script_code("model_b", "code by b");
    h.sandbox.on_code("code by a", passing_report(4));
    h.sandbox.on_code("code by b", passing_report(4));

    let outcome = h
        .coordinator()
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, SagaStatus::Success);
    assert_eq!(outcome.message, "Both agents succeeded.");
    assert_eq!(outcome.code_a.as_deref(), Some("code by a"));
    assert_eq!(outcome.code_b.as_deref(), Some("code by b"));
    assert!(outcome.errors_a.is_none() && outcome.errors_b.is_none());
    assert!(h.compensator.calls().is_empty());
}

#[tokio::test]
async fn partial_failure_compensates_only_the_successful_agent() {
    let h = Harness::new();
    h.generator.script_code("model_a", "good candidate");
    h.generator.script_code("model_b", "bad candidate");
    h.sandbox.on_code("good candidate", passing_report(2));
    // Slot B exhausts its three iterations without passing.
    h.sandbox.on_code("bad candidate", failing_report(0, 2));
    h.sandbox.on_code("candidate for selector", failing_report(0, 2));
    h.sandbox.on_code("candidate for selector", failing_report(0, 2));

    let outcome = h
        .coordinator()
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, SagaStatus::RolledBack);
    assert!(outcome
        .message
        .starts_with("Saga failed and was rolled back. Reason: "));
    assert!(outcome.message.contains("max iterations (3)"));
    assert!(outcome.code_a.is_none() && outcome.code_b.is_none());

    // Structured detail only for the failed slot.
    assert!(outcome.errors_a.is_none());
    let errors_b = outcome.errors_b.unwrap();
    assert_eq!(errors_b["agent_id"], "agent_b");
    assert_eq!(errors_b["last_test_summary"]["failed"], 2);

    assert_eq!(h.compensator.calls(), vec![AgentId::A]);
}

#[tokio::test]
async fn double_failure_compensates_nothing() {
    let h = Harness::new();
    h.sandbox.push(error_report("workspace setup failed"));
    h.sandbox.push(error_report("workspace setup failed"));

    let outcome = h
        .coordinator()
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, SagaStatus::RolledBack);
    assert!(h.compensator.calls().is_empty());
    assert!(outcome.errors_a.is_some() && outcome.errors_b.is_some());
}

#[tokio::test]
async fn one_slot_failing_never_aborts_the_sibling() {
    let h = Harness::new();
    // Slot B dies on a deployment defect before its first sandbox run.
    h.generator.script(
        "model_b",
        Err(CallError::Configuration(
            "unknown model endpoint selector: model_b".to_string(),
        )),
    );
    h.generator.script_code("model_a", "slow but fine");
    h.sandbox.on_code("slow but fine", passing_report(1));

    let outcome = h
        .coordinator()
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    // Slot A ran to its own conclusion and was then rolled back.
    let a_calls: Vec<_> = h
        .sandbox
        .calls()
        .into_iter()
        .filter(|c| c.code == "slow but fine")
        .collect();
    assert_eq!(a_calls.len(), 1);
    assert_eq!(outcome.status, SagaStatus::RolledBack);
    assert!(outcome.message.contains("configuration error"));
    assert_eq!(h.compensator.calls(), vec![AgentId::A]);
}

#[tokio::test]
async fn trace_id_is_propagated_to_every_collaborator_call() {
    let h = Harness::new();
    h.sandbox.push(failing_report(0, 1));
    h.sandbox.push(passing_report(1));
    h.sandbox.push(passing_report(1));

    let outcome = h
        .coordinator()
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    let trace_id = outcome.trace_id;
    assert!(h
        .generator
        .calls()
        .iter()
        .all(|c| c.trace_id == trace_id));
    assert!(h.sandbox.calls().iter().all(|c| c.trace_id == trace_id));
}

#[tokio::test]
async fn journal_chain_survives_a_full_run() {
    let h = Harness::new();
    h.sandbox.push(failing_report(1, 1));
    h.sandbox.push(passing_report(2));
    h.sandbox.push(passing_report(2));

    h.coordinator()
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    h.journal.verify_integrity().unwrap();
    let final_states = h.journal.replay();
    assert_eq!(final_states.get("saga").map(String::as_str), Some("SUCCESS"));
    assert_eq!(
        final_states.get("agent_a").map(String::as_str),
        Some("SUCCEEDED")
    );
    assert_eq!(
        final_states.get("agent_b").map(String::as_str),
        Some("SUCCEEDED")
    );
}

#[tokio::test]
async fn cancellation_stops_agents_and_skips_compensation() {
    let h = Harness::new();
    let compensator = h.compensator.clone();
    let coordinator = Arc::new(SagaCoordinator::new(
        Arc::new(StalledGenerator),
        h.sandbox.clone(),
        compensator.clone(),
        h.clock.clone(),
        h.journal.clone(),
    ));

    let cancel = CancellationToken::new();
    let task = {
        let coordinator = coordinator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { coordinator.run(sample_request(), cancel).await })
    };

    // Let both agents park inside their generation calls, then pull the plug.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.status, SagaStatus::Running);
    assert_eq!(snapshot.agent_a.unwrap().phase, AgentPhase::Generating);

    cancel.cancel();
    let result = task.await.unwrap();

    assert!(matches!(result, Err(SagaError::Cancelled)));
    assert!(compensator.calls().is_empty());
}

#[tokio::test]
async fn snapshot_remains_servable_after_completion() {
    let h = Harness::new();
    h.sandbox.push(passing_report(1));
    h.sandbox.push(passing_report(1));
    let coordinator = h.coordinator();

    let outcome = coordinator
        .run(sample_request(), CancellationToken::new())
        .await
        .unwrap();

    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.status, SagaStatus::Success);
    assert_eq!(snapshot.trace_id, Some(outcome.trace_id));
    let agent_a = snapshot.agent_a.unwrap();
    assert_eq!(agent_a.phase, AgentPhase::Succeeded);
    assert_eq!(agent_a.last_test_summary.unwrap().passed, 1);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_anything_starts() {
    let err = InitialRequest::from_parts("short", "https://example.com/t.tar.gz", 3)
        .map_err(SagaError::from)
        .unwrap_err();
    assert!(matches!(err, SagaError::InvalidRequest(_)));

    let err = InitialRequest::from_parts(
        "Implement a bounded FIFO queue",
        "https://example.com/t.tar.gz",
        0,
    )
    .map_err(SagaError::from)
    .unwrap_err();
    assert!(err.to_string().contains("max_iterations out of range"));
}
