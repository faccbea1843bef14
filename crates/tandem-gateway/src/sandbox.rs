//! HTTP sandbox client
//!
//! POSTs the candidate code and test bundle URL to the sandbox service and
//! parses its report. Connectivity failures are retried on a slower schedule
//! than generation calls; a response that cannot be parsed as a report is
//! folded into a report with `error` set, so classification treats it as a
//! terminal execution failure rather than a transport problem.

use crate::config::SettingsError;
use crate::TRACE_HEADER;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tandem_core::collaborators::SandboxRunner;
use tandem_core::error::CallError;
use tandem_core::types::{TestReport, TraceId};
use tandem_substrate::{retry_call, RetryPolicy, SagaClock};
use url::Url;

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    code_to_test: &'a str,
    test_files_url: &'a str,
    trace_id: String,
}

/// HTTP-backed [`SandboxRunner`].
pub struct HttpSandboxRunner {
    client: reqwest::Client,
    execute_url: Url,
    policy: RetryPolicy,
    clock: Arc<dyn SagaClock>,
}

impl HttpSandboxRunner {
    /// Create a client for the sandbox service rooted at `sandbox_url`.
    ///
    /// # Errors
    /// Returns [`SettingsError::InvalidVar`] when the base URL cannot carry
    /// the execution path (for example a `mailto:` URL).
    pub fn new(
        client: reqwest::Client,
        sandbox_url: &Url,
        clock: Arc<dyn SagaClock>,
    ) -> Result<Self, SettingsError> {
        let execute_url =
            sandbox_url
                .join("execute_tests")
                .map_err(|err| SettingsError::InvalidVar {
                    name: "TANDEM_SANDBOX_URL".to_string(),
                    reason: err.to_string(),
                })?;
        Ok(Self {
            client,
            execute_url,
            policy: RetryPolicy::new(5)
                .with_initial_interval(Duration::from_secs(5))
                .with_backoff_coefficient(2.0),
            clock,
        })
    }

    /// Replace the retry policy for sandbox calls.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl SandboxRunner for HttpSandboxRunner {
    async fn run_tests(
        &self,
        code: &str,
        test_files_url: &Url,
        trace_id: TraceId,
    ) -> Result<TestReport, CallError> {
        tracing::debug!(
            trace_id = %trace_id,
            execute_url = %self.execute_url,
            code_len = code.len(),
            "dispatching sandbox run"
        );

        retry_call(&self.policy, self.clock.as_ref(), || async {
            let response = self
                .client
                .post(self.execute_url.clone())
                .header(TRACE_HEADER, trace_id.to_string())
                .json(&ExecuteRequest {
                    code_to_test: code,
                    test_files_url: test_files_url.as_str(),
                    trace_id: trace_id.to_string(),
                })
                .send()
                .await
                .map_err(|err| CallError::Transient(format!("sandbox request failed: {err}")))?;
            let response = response
                .error_for_status()
                .map_err(|err| CallError::Transient(format!("sandbox service error: {err}")))?;

            // A 2xx body that is not a report means the run broke on the
            // sandbox side; that is a terminal execution outcome, not a
            // reason to retry the call.
            match response.json::<TestReport>().await {
                Ok(report) => Ok(report),
                Err(err) => Ok(TestReport {
                    error: Some(format!("unparseable sandbox report: {err}")),
                    ..TestReport::default()
                }),
            }
        })
        .await
    }
}
