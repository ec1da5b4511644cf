//! Validated run configuration.
//!
//! [`Config::from_cli`] turns the raw [`Cli`] values into a [`Config`] that
//! every stage receives by reference. All checks happen here, before any
//! network call is made.

use crate::cli::{Cli, ImagePolicy};
use crate::error::{PipelineError, PipelineResult};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub aspect_ratio: String,
}

#[derive(Clone)]
pub struct GraphConfig {
    pub account_id: String,
    pub access_token: String,
    pub api_version: String,
    /// Statuses classified as a missing-permission rejection.
    pub permission_statuses: Vec<u16>,
}

#[derive(Clone)]
pub struct HostingConfig {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub sources: Vec<Url>,
    pub items_per_source: usize,
}

#[derive(Debug, Clone)]
pub struct CopyConfig {
    pub tone: String,
    pub include_snippets: bool,
    pub request_summary_points: bool,
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    pub policy: ImagePolicy,
    pub fallback_url: Option<String>,
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Everything a run needs, checked up front.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub graph: GraphConfig,
    pub hosting: HostingConfig,
    pub feeds: FeedConfig,
    pub copy: CopyConfig,
    pub image: ImageConfig,
    pub dry_run: bool,
}

// Credentials stay out of Debug output so `?config` is safe to log.
impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("aspect_ratio", &self.aspect_ratio)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphConfig")
            .field("account_id", &self.account_id)
            .field("api_version", &self.api_version)
            .field("permission_statuses", &self.permission_statuses)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for HostingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostingConfig").finish_non_exhaustive()
    }
}

fn required(value: Option<String>, name: &'static str) -> PipelineResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(PipelineError::ConfigurationMissing { name }),
    }
}

fn parse_feed_urls(raw: Vec<String>) -> PipelineResult<Vec<Url>> {
    let sources = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            Url::parse(s).map_err(|e| PipelineError::ConfigurationInvalid {
                name: "FEED_URLS",
                reason: format!("{s}: {e}"),
            })
        })
        .collect::<PipelineResult<Vec<_>>>()?;

    if sources.is_empty() {
        return Err(PipelineError::ConfigurationMissing { name: "FEED_URLS" });
    }
    Ok(sources)
}

impl Config {
    /// Validate CLI/environment values into a run configuration.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ConfigurationMissing`] for an absent or blank
    ///   credential, an empty feed list, or a resilient policy without a
    ///   fallback image
    /// - [`PipelineError::ConfigurationInvalid`] for an unparseable feed URL
    ///   or a zero item cap / attempt count
    pub fn from_cli(cli: Cli) -> PipelineResult<Self> {
        let gemini_api_key = required(cli.gemini_api_key, "GEMINI_API_KEY")?;
        let account_id = required(cli.insta_page_id, "INSTA_PAGE_ID")?;
        let access_token = required(cli.insta_access_token, "INSTA_ACCESS_TOKEN")?;
        let imgbb_api_key = required(cli.imgbb_api_key, "IMGBB_API_KEY")?;

        let sources = parse_feed_urls(cli.feed_urls)?;
        if cli.items_per_source == 0 {
            return Err(PipelineError::ConfigurationInvalid {
                name: "ITEMS_PER_SOURCE",
                reason: "must be at least 1".to_string(),
            });
        }
        if cli.image_max_attempts == 0 {
            return Err(PipelineError::ConfigurationInvalid {
                name: "IMAGE_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        let fallback_url = Some(cli.fallback_image_url.trim().to_string()).filter(|u| !u.is_empty());
        if cli.image_policy == ImagePolicy::Resilient && fallback_url.is_none() {
            return Err(PipelineError::ConfigurationMissing {
                name: "FALLBACK_IMAGE_URL",
            });
        }

        let config = Config {
            gemini: GeminiConfig {
                api_key: gemini_api_key,
                text_model: cli.text_model,
                image_model: cli.image_model,
                aspect_ratio: cli.aspect_ratio,
            },
            graph: GraphConfig {
                account_id,
                access_token,
                api_version: cli.graph_api_version,
                permission_statuses: cli.permission_status_codes,
            },
            hosting: HostingConfig {
                api_key: imgbb_api_key,
            },
            feeds: FeedConfig {
                sources,
                items_per_source: cli.items_per_source,
            },
            copy: CopyConfig {
                tone: cli.tone,
                include_snippets: cli.include_snippets,
                request_summary_points: cli.summary_points,
            },
            image: ImageConfig {
                policy: cli.image_policy,
                fallback_url,
                max_attempts: cli.image_max_attempts,
                backoff: Duration::from_secs(cli.image_backoff_secs),
            },
            dry_run: cli.dry_run,
        };
        config.trace_loaded();
        Ok(config)
    }

    pub fn trace_loaded(&self) {
        info!(
            sources = self.feeds.sources.len(),
            items_per_source = self.feeds.items_per_source,
            policy = ?self.image.policy,
            max_attempts = self.image.max_attempts,
            backoff_secs = self.image.backoff.as_secs(),
            dry_run = self.dry_run,
            "Loaded configuration"
        );
        debug!(config = ?self, "Configuration (full debug)");
    }
}
