//! CLI for publishing one payload
//!
//! Reads a JSON `PublicationPayload` from a file and prints the outcome as
//! JSON on stdout. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use publisher_core::domains::publishing::{self, PublicationPayload, PublicationResult};
use publisher_core::kernel::PublisherDeps;
use publisher_core::Config;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "publish")]
#[command(about = "Publish a post payload into the database")]
struct Cli {
    /// Path to the JSON payload
    payload: PathBuf,

    /// Run every step, then roll back instead of committing
    #[arg(long)]
    dry_run: bool,
}

// ============================================================================
// JSON Response Types
// ============================================================================

#[derive(Serialize)]
struct Response {
    success: bool,
    dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<PublicationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorResponse>,
}

#[derive(Serialize)]
struct ErrorResponse {
    kind: String,
    message: String,
    retryable: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to encode response")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,publisher_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let response = match run(&cli).await {
        Ok(response) => response,
        Err(err) => Response {
            success: false,
            dry_run: cli.dry_run,
            result: None,
            error: Some(ErrorResponse {
                kind: "setup".to_string(),
                message: format!("{:#}", err),
                retryable: false,
            }),
        },
    };

    let success = response.success;
    if let Err(err) = print_json(&response) {
        eprintln!("{:#}", err);
        return ExitCode::FAILURE;
    }

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Setup failures (config, connection, payload parsing) are returned as
/// `Err`; publication failures are part of the response.
async fn run(cli: &Cli) -> Result<Response> {
    let raw = tokio::fs::read_to_string(&cli.payload)
        .await
        .with_context(|| format!("Failed to read payload {}", cli.payload.display()))?;
    let payload: PublicationPayload =
        serde_json::from_str(&raw).context("Payload is not a valid publication")?;

    let config = Config::from_env().context("Failed to load configuration")?;
    let deps = PublisherDeps::connect(&config).await?;
    deps.migrate().await?;

    let outcome = if cli.dry_run {
        publishing::dry_run(payload, &deps).await
    } else {
        publishing::publish(payload, &deps).await
    };

    Ok(match outcome {
        Ok(result) => Response {
            success: true,
            dry_run: cli.dry_run,
            result: Some(result),
            error: None,
        },
        Err(err) => {
            tracing::error!(error = %err, kind = err.kind(), "Publication failed");
            Response {
                success: false,
                dry_run: cli.dry_run,
                result: None,
                error: Some(ErrorResponse {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                    retryable: err.is_retryable(),
                }),
            }
        }
    })
}
