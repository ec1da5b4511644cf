//! Image production: the third pipeline stage.
//!
//! Generation is attempted up to a fixed number of times. Only rate-limited
//! attempts are retried, each after the same fixed pause:
//!
//! ```text
//! Idle -> Attempting(n) -> Success
//!                       -> RetryWait -> Attempting(n + 1)
//!                       -> Exhausted
//! ```
//!
//! What `Exhausted` means depends on [`ImagePolicy`]: the strict policy
//! aborts the run, the resilient policy substitutes the fallback image.

use crate::api::{ImageAttempt, ImageGeneration};
use crate::cli::ImagePolicy;
use crate::config::ImageConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{GeneratedPost, ImageAsset, InlineImage};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Style wrapped around every image subject.
pub const STYLE_TEMPLATE: &str = "Eye-catching square illustration for an Instagram tech news post. \
     Bold colors, clean composition, professional look, no text or logos.";

/// Subject used when the copy did not propose one.
pub const GENERIC_PROMPT: &str = "Abstract tech background, neon, professional";

/// Attempt limit and pause between rate-limited attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl From<&ImageConfig> for RetryPolicy {
    fn from(config: &ImageConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.backoff,
        }
    }
}

/// Terminal state of the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success { image: InlineImage, attempts: u32 },
    /// Every attempt was rate limited.
    Exhausted { attempts: u32, last_error: String },
    /// A non-retryable failure ended the loop early.
    Failed { attempts: u32, error: String },
}

pub fn build_image_prompt(post: &GeneratedPost) -> String {
    let subject = post.image_prompt.as_deref().unwrap_or(GENERIC_PROMPT);
    format!("{STYLE_TEMPLATE} Subject: {subject}")
}

/// Run image attempts until one succeeds, fails for good, or the attempt
/// limit is reached while rate limited.
#[instrument(level = "info", skip_all, fields(max_attempts = policy.max_attempts))]
pub async fn generate_with_retry<G: ImageGeneration>(
    model: &G,
    prompt: &str,
    policy: RetryPolicy,
) -> GenerationOutcome {
    let total_t0 = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, max = policy.max_attempts, "Attempting image generation");
        let attempt_t0 = Instant::now();

        match model.generate_image(prompt).await {
            ImageAttempt::Generated(image) => {
                info!(
                    attempt,
                    mime_type = %image.mime_type,
                    encoded_bytes = image.data.len(),
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    "Image generated"
                );
                return GenerationOutcome::Success {
                    image,
                    attempts: attempt,
                };
            }
            ImageAttempt::Failed(error) => {
                warn!(
                    attempt,
                    elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                    %error,
                    "Image generation failed; not retryable"
                );
                return GenerationOutcome::Failed {
                    attempts: attempt,
                    error,
                };
            }
            ImageAttempt::RateLimited(error) => {
                if attempt >= policy.max_attempts {
                    error!(
                        attempt,
                        max = policy.max_attempts,
                        elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                        %error,
                        "Image generation exhausted retries"
                    );
                    return GenerationOutcome::Exhausted {
                        attempts: attempt,
                        last_error: error,
                    };
                }
                warn!(
                    attempt,
                    max = policy.max_attempts,
                    delay = ?policy.backoff,
                    %error,
                    "Image generation rate limited; backing off"
                );
                sleep(policy.backoff).await;
            }
        }
    }
}

/// Apply the exhaustion policy to an image failure.
///
/// Under the resilient policy the fallback image replaces the failure and a
/// warning is logged; under the strict policy the failure is returned.
pub fn fallback_or_fail(config: &ImageConfig, err: PipelineError) -> PipelineResult<ImageAsset> {
    match (config.policy, config.fallback_url.as_deref()) {
        (ImagePolicy::Resilient, Some(url)) => {
            warn!(error = %err, fallback = %url, "Image unavailable; using fallback image");
            Ok(ImageAsset::Fallback(url.to_string()))
        }
        _ => Err(err),
    }
}

/// Produce the run's image: generated when possible, otherwise per policy.
#[instrument(level = "info", skip_all, fields(policy = ?config.policy))]
pub async fn produce_image<G: ImageGeneration>(
    model: &G,
    post: &GeneratedPost,
    config: &ImageConfig,
) -> PipelineResult<ImageAsset> {
    let prompt = build_image_prompt(post);
    debug!(%prompt, "Built image prompt");

    match generate_with_retry(model, &prompt, RetryPolicy::from(config)).await {
        GenerationOutcome::Success { image, attempts } => {
            debug!(attempts, "Using generated image");
            Ok(ImageAsset::Generated(image))
        }
        GenerationOutcome::Exhausted {
            attempts,
            last_error,
        } => fallback_or_fail(
            config,
            PipelineError::RateLimited {
                attempts,
                message: last_error,
            },
        ),
        GenerationOutcome::Failed { error, .. } => {
            fallback_or_fail(config, PipelineError::GenerationFailed(error))
        }
    }
}
