//! # tandem-gateway
//!
//! Production implementations of the `tandem-core` collaborator seams, plus
//! deployment configuration:
//!
//! - [`HttpCodeGenerator`]: selector-routed code-generation client
//! - [`HttpSandboxRunner`]: sandbox execution client
//! - [`ArtifactCleaner`]: idempotent filesystem compensation
//! - [`archive`]: workspace path-escape guard for test-bundle entries
//! - [`Settings`]: explicit, environment-built configuration
//!
//! Both HTTP clients classify failures at the point of failure and spend
//! their own retry budget through the substrate's retry evaluator before a
//! `CallError` ever reaches an agent.

pub mod archive;
pub mod codegen;
pub mod compensation;
pub mod config;
pub mod sandbox;

pub use archive::{plan_extraction, resolve_entry_path, ArchiveError};
pub use codegen::HttpCodeGenerator;
pub use compensation::ArtifactCleaner;
pub use config::{Settings, SettingsError};
pub use sandbox::HttpSandboxRunner;

/// Header carrying the saga trace id on every outbound call.
pub const TRACE_HEADER: &str = "X-Trace-ID";
