//! HTTP code-generation client
//!
//! Resolves the agent's opaque endpoint selector to a concrete service URL
//! and POSTs the prompt. Transport and status failures are transient and
//! retried under this client's policy; an unresolvable selector is a
//! deployment defect and fails immediately.

use crate::TRACE_HEADER;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tandem_core::collaborators::CodeGenerator;
use tandem_core::error::CallError;
use tandem_core::types::TraceId;
use tandem_substrate::{retry_call, RetryPolicy, SagaClock};
use url::Url;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    generated_code: String,
}

/// HTTP-backed [`CodeGenerator`].
pub struct HttpCodeGenerator {
    client: reqwest::Client,
    endpoints: HashMap<String, Url>,
    policy: RetryPolicy,
    clock: Arc<dyn SagaClock>,
}

impl HttpCodeGenerator {
    /// Create a client over a fixed selector→endpoint map.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        endpoints: HashMap<String, Url>,
        clock: Arc<dyn SagaClock>,
    ) -> Self {
        Self {
            client,
            endpoints,
            policy: RetryPolicy::new(3),
            clock,
        }
    }

    /// Replace the retry policy for generation calls.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl CodeGenerator for HttpCodeGenerator {
    async fn generate(
        &self,
        prompt: &str,
        selector: &str,
        trace_id: TraceId,
    ) -> Result<String, CallError> {
        let endpoint = self.endpoints.get(selector).ok_or_else(|| {
            CallError::Configuration(format!("unknown model endpoint selector: {selector}"))
        })?;
        tracing::debug!(
            trace_id = %trace_id,
            selector,
            endpoint = %endpoint,
            prompt_len = prompt.len(),
            "dispatching generation request"
        );

        retry_call(&self.policy, self.clock.as_ref(), || async {
            let response = self
                .client
                .post(endpoint.clone())
                .header(TRACE_HEADER, trace_id.to_string())
                .json(&GenerateRequest { prompt })
                .send()
                .await
                .map_err(|err| {
                    CallError::Transient(format!("code-generation request failed: {err}"))
                })?;
            let response = response.error_for_status().map_err(|err| {
                CallError::Transient(format!("code-generation service error: {err}"))
            })?;
            let body: GenerateResponse = response.json().await.map_err(|err| {
                CallError::Transient(format!("malformed code-generation response: {err}"))
            })?;
            Ok(body.generated_code)
        })
        .await
    }
}
