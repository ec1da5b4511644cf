//! # Newsgram
//!
//! Turns the latest headlines from a set of RSS/Atom feeds into one
//! Instagram post: an LLM writes the caption and hashtags, an image model
//! draws the picture, imgbb hosts it and the Meta Graph API publishes it.
//!
//! ## Usage
//!
//! ```sh
//! newsgram --tone "Calm & Informative" --image-policy strict
//! ```
//!
//! Credentials come from flags, the environment, or a `.env` file in the
//! working directory.
//!
//! ## Architecture
//!
//! One strictly sequential run:
//! 1. **Feeds**: fetch and merge headlines from every configured source
//! 2. **Copy**: generate caption, hashtags and an image subject as JSON
//! 3. **Image**: generate the picture, retrying on rate limits
//! 4. **Hosting**: upload the picture to get a public URL
//! 5. **Publish**: create a media container, then publish it
//!
//! Exit status is 0 on success, 2 for configuration errors and 1 for any
//! other failure.

use clap::Parser;
use reqwest::Client;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod config;
mod copy;
mod error;
mod feeds;
mod hosting;
mod image;
mod models;
mod pipeline;
mod publish;
mod utils;

#[cfg(test)]
mod testing;

use api::GeminiClient;
use cli::Cli;
use config::Config;
use error::{PipelineError, PipelineResult};
use feeds::HttpFeedFetcher;
use hosting::ImgbbClient;
use models::RunReport;
use pipeline::Pipeline;
use publish::GraphClient;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so RUST_LOG may live there too
    let dotenv = dotenvy::dotenv();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "newsgram starting up");
    match dotenv {
        Ok(path) => debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => debug!("No .env file; using process environment"),
        Err(e) => error!(error = %e, "Ignoring unreadable .env file"),
    }

    let args = Cli::parse();
    let result = run(args).await;
    let status = exit_status(&result);

    match result {
        Ok(report) => {
            info!(
                items = report.items_collected,
                image_source = report.image_source,
                image_url = ?report.image_url,
                "Run finished"
            );
            match &report.published {
                Some(post) => println!("Post is live. ID: {}", post.id),
                None => println!("Dry run complete. Caption:\n{}", report.caption),
            }
        }
        Err(e) => {
            error!(error = %e, exit_code = status, "Run aborted");
            eprintln!("FATAL ERROR: {e}");
            if let Some(hint) = e.hint() {
                eprintln!("{hint}");
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    ExitCode::from(status)
}

/// Validate configuration, wire the real clients and run the pipeline.
///
/// Configuration is checked before any client is built, so a missing
/// credential never costs a network call.
async fn run(args: Cli) -> PipelineResult<RunReport> {
    let config = Config::from_cli(args)?;
    let client = http_client()?;

    let pipeline = Pipeline::new(
        HttpFeedFetcher::new(client.clone()),
        GeminiClient::new(client.clone(), &config.gemini),
        ImgbbClient::new(client.clone(), &config.hosting),
        GraphClient::new(client, &config.graph),
    );
    pipeline.run(&config).await
}

fn http_client() -> PipelineResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| PipelineError::ConfigurationInvalid {
            name: "HTTP_CLIENT",
            reason: e.to_string(),
        })
}

fn exit_status(result: &PipelineResult<RunReport>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}
