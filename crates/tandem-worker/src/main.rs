//! Worker entrypoint: wire the HTTP gateways to a tokio substrate, run one
//! two-agent saga, and print the final outcome as JSON.
//!
//! All bootstrap lives here. The library crates never install subscribers,
//! read the environment, or touch process exit codes.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tandem_core::prelude::*;
use tandem_gateway::{ArtifactCleaner, HttpCodeGenerator, HttpSandboxRunner, Settings};
use tandem_substrate::{TokioClock, TransitionJournal};
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(Debug, Parser)]
#[command(
    name = "tandem-worker",
    version,
    about = "Run two competing code-generation agents as one all-or-nothing saga"
)]
struct Args {
    /// Natural-language description of the function to build
    #[arg(long)]
    description: String,

    /// URL of the archive containing the test bundle
    #[arg(long)]
    test_files_url: Url,

    /// Upper bound on generate/test cycles per agent (1..=20)
    #[arg(long, default_value_t = 5)]
    max_iterations: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(version = tandem_core::VERSION, "tandem worker starting");

    let settings = Settings::from_env().context("loading TANDEM_* settings")?;
    let request = InitialRequest::new(args.description, args.test_files_url, args.max_iterations)
        .context("validating request")?;

    let client = reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .build()
        .context("building HTTP client")?;
    let clock = Arc::new(TokioClock::new());
    let journal = Arc::new(TransitionJournal::new());
    let generator = Arc::new(HttpCodeGenerator::new(
        client.clone(),
        settings.model_endpoints.clone(),
        clock.clone(),
    ));
    let sandbox = Arc::new(
        HttpSandboxRunner::new(client, &settings.sandbox_url, clock.clone())
            .context("building sandbox client")?,
    );
    let compensator = Arc::new(ArtifactCleaner::new(&settings.artifact_root));

    let mut coordinator = SagaCoordinator::new(generator, sandbox, compensator, clock, journal.clone())
        .with_selectors(settings.selector_a.clone(), settings.selector_b.clone());
    if let Some(ceiling) = settings.backoff_ceiling {
        coordinator = coordinator.with_backoff_ceiling(ceiling);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling saga");
                cancel.cancel();
            }
        });
    }

    let outcome = coordinator.run(request, cancel).await?;
    journal
        .verify_integrity()
        .context("verifying transition journal")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if outcome.status != SagaStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}
