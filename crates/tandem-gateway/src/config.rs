//! Deployment configuration
//!
//! One explicit [`Settings`] value, built from the environment by the worker
//! binary and passed by reference to whoever needs it. No globals, no lazy
//! caches.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Prefix shared by every environment variable this crate reads.
const ENV_PREFIX: &str = "TANDEM_";

/// Failure to assemble a usable [`Settings`] value.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// A required environment variable is unset or empty
    #[error("missing required environment variable {name}")]
    MissingVar {
        /// Variable name, prefix included
        name: String,
    },

    /// An environment variable is present but unusable
    #[error("invalid value for {name}: {reason}")]
    InvalidVar {
        /// Variable name, prefix included
        name: String,
        /// What was wrong with it
        reason: String,
    },
}

/// Deployment configuration for the gateways and the worker.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Endpoint selector → code-generation service URL
    pub model_endpoints: HashMap<String, Url>,
    /// Base URL of the sandbox execution service
    pub sandbox_url: Url,
    /// Directory holding per-agent artifact subdirectories
    pub artifact_root: PathBuf,
    /// Per-request timeout applied to the HTTP client
    pub request_timeout: Duration,
    /// Optional cap on the agents' iteration backoff
    pub backoff_ceiling: Option<Duration>,
    /// Endpoint selector for the first agent slot
    pub selector_a: String,
    /// Endpoint selector for the second agent slot
    pub selector_b: String,
}

impl Settings {
    /// Load settings from `TANDEM_*` environment variables.
    ///
    /// Required: `TANDEM_MODEL_ENDPOINTS` (comma-separated `selector=url`
    /// pairs) and `TANDEM_SANDBOX_URL`. Optional, with defaults:
    /// `TANDEM_ARTIFACT_ROOT`, `TANDEM_AGENT_A_SELECTOR`,
    /// `TANDEM_AGENT_B_SELECTOR`, `TANDEM_REQUEST_TIMEOUT_SECS`,
    /// `TANDEM_BACKOFF_CEILING_SECS`.
    ///
    /// # Errors
    /// Returns [`SettingsError`] naming the offending variable.
    pub fn from_env() -> Result<Self, SettingsError> {
        let model_endpoints = parse_endpoint_map(&require_var("MODEL_ENDPOINTS")?)?;
        let sandbox_url = parse_url("SANDBOX_URL", &require_var("SANDBOX_URL")?)?;
        let artifact_root = optional_var("ARTIFACT_ROOT")
            .map_or_else(|| std::env::temp_dir().join("tandem-artifacts"), PathBuf::from);
        let selector_a = optional_var("AGENT_A_SELECTOR").unwrap_or_else(|| "model_a".to_string());
        let selector_b = optional_var("AGENT_B_SELECTOR").unwrap_or_else(|| "model_b".to_string());
        let request_timeout = match optional_var("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_secs("REQUEST_TIMEOUT_SECS", &raw)?),
            None => Duration::from_secs(120),
        };
        let backoff_ceiling = match optional_var("BACKOFF_CEILING_SECS") {
            Some(raw) => Some(Duration::from_secs(parse_secs("BACKOFF_CEILING_SECS", &raw)?)),
            None => None,
        };

        let settings = Self {
            model_endpoints,
            sandbox_url,
            artifact_root,
            request_timeout,
            backoff_ceiling,
            selector_a,
            selector_b,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check cross-field consistency: both slot selectors must resolve.
    ///
    /// # Errors
    /// Returns [`SettingsError::InvalidVar`] naming the unresolvable slot.
    pub fn validate(&self) -> Result<(), SettingsError> {
        for (var, selector) in [
            ("AGENT_A_SELECTOR", &self.selector_a),
            ("AGENT_B_SELECTOR", &self.selector_b),
        ] {
            if !self.model_endpoints.contains_key(selector.as_str()) {
                return Err(SettingsError::InvalidVar {
                    name: format!("{ENV_PREFIX}{var}"),
                    reason: format!("selector {selector} has no entry in the endpoint map"),
                });
            }
        }
        Ok(())
    }
}

fn require_var(name: &str) -> Result<String, SettingsError> {
    optional_var(name).ok_or_else(|| SettingsError::MissingVar {
        name: format!("{ENV_PREFIX}{name}"),
    })
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn parse_url(name: &str, raw: &str) -> Result<Url, SettingsError> {
    Url::parse(raw).map_err(|err| SettingsError::InvalidVar {
        name: format!("{ENV_PREFIX}{name}"),
        reason: err.to_string(),
    })
}

fn parse_secs(name: &str, raw: &str) -> Result<u64, SettingsError> {
    raw.parse().map_err(|_| SettingsError::InvalidVar {
        name: format!("{ENV_PREFIX}{name}"),
        reason: format!("expected a whole number of seconds, got {raw:?}"),
    })
}

/// Parse `selector=url,selector=url` into the endpoint map.
fn parse_endpoint_map(raw: &str) -> Result<HashMap<String, Url>, SettingsError> {
    let name = format!("{ENV_PREFIX}MODEL_ENDPOINTS");
    let mut endpoints = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (selector, url) = pair.split_once('=').ok_or_else(|| SettingsError::InvalidVar {
            name: name.clone(),
            reason: format!("expected selector=url, got {pair:?}"),
        })?;
        let url = Url::parse(url.trim()).map_err(|err| SettingsError::InvalidVar {
            name: name.clone(),
            reason: format!("bad URL for selector {selector}: {err}"),
        })?;
        endpoints.insert(selector.trim().to_string(), url);
    }
    if endpoints.is_empty() {
        return Err(SettingsError::InvalidVar {
            name,
            reason: "no selector=url pairs".to_string(),
        });
    }
    Ok(endpoints)
}
