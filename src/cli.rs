//! Command-line interface definitions for newsgram.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it, so a scheduler can drive the binary with nothing but a
//! `.env` file. Values are only collected here; [`crate::config::Config`]
//! decides whether they are usable.

use clap::{Parser, ValueEnum};

/// Stock image used when image generation is unavailable.
pub const DEFAULT_FALLBACK_IMAGE: &str = "https://images.unsplash.com/photo-1611162617213-7d7a39e9b1d7?q=80&w=1000&auto=format&fit=crop";

/// What to do when no image could be generated.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImagePolicy {
    /// Abort the run.
    Strict,
    /// Post with the fallback image instead.
    Resilient,
}

/// Command-line arguments for a single pipeline run.
///
/// # Examples
///
/// ```sh
/// # Credentials from the environment, everything else defaulted
/// newsgram
///
/// # Two feeds, five headlines each, abort if no image can be generated
/// newsgram --feed-url https://a.example/rss,https://b.example/atom \
///     --items-per-source 5 --image-policy strict
///
/// # Preview the caption without posting
/// newsgram --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Instagram business account id
    #[arg(long, env = "INSTA_PAGE_ID")]
    pub insta_page_id: Option<String>,

    /// Meta Graph API access token
    #[arg(long, env = "INSTA_ACCESS_TOKEN", hide_env_values = true)]
    pub insta_access_token: Option<String>,

    /// imgbb API key
    #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true)]
    pub imgbb_api_key: Option<String>,

    /// Tone the caption should be written in
    #[arg(long, env = "POST_TONE", default_value = "Hyped & Energetic")]
    pub tone: String,

    /// Image posted when generation is unavailable (resilient policy)
    #[arg(long, env = "FALLBACK_IMAGE_URL", default_value = DEFAULT_FALLBACK_IMAGE)]
    pub fallback_image_url: String,

    /// Feed URLs to pull headlines from, comma separated
    #[arg(
        long = "feed-url",
        env = "FEED_URLS",
        value_delimiter = ',',
        default_value = "https://techcrunch.com/category/artificial-intelligence/feed/"
    )]
    pub feed_urls: Vec<String>,

    /// Maximum number of items taken from each feed
    #[arg(long, env = "ITEMS_PER_SOURCE", default_value_t = 3)]
    pub items_per_source: usize,

    /// Image generation attempts before giving up
    #[arg(long, env = "IMAGE_MAX_ATTEMPTS", default_value_t = 3)]
    pub image_max_attempts: u32,

    /// Seconds to wait after a rate-limited image attempt
    #[arg(long, env = "IMAGE_BACKOFF_SECS", default_value_t = 20)]
    pub image_backoff_secs: u64,

    /// Behaviour when no image could be generated or hosted
    #[arg(long, env = "IMAGE_POLICY", value_enum, default_value_t = ImagePolicy::Resilient)]
    pub image_policy: ImagePolicy,

    /// Gemini model used for the caption
    #[arg(long, env = "GEMINI_TEXT_MODEL", default_value = "gemini-3-flash-preview")]
    pub text_model: String,

    /// Gemini model used for the image
    #[arg(long, env = "GEMINI_IMAGE_MODEL", default_value = "gemini-2.5-flash-image")]
    pub image_model: String,

    /// Aspect ratio hint for the generated image
    #[arg(long, env = "IMAGE_ASPECT_RATIO", default_value = "1:1")]
    pub aspect_ratio: String,

    /// Meta Graph API version
    #[arg(long, env = "GRAPH_API_VERSION", default_value = "v20.0")]
    pub graph_api_version: String,

    /// HTTP statuses treated as a missing-permission rejection, comma separated
    #[arg(long, env = "PERMISSION_STATUS_CODES", value_delimiter = ',', default_value = "403")]
    pub permission_status_codes: Vec<u16>,

    /// Send item summaries to the model along with the titles
    #[arg(long, env = "INCLUDE_SNIPPETS")]
    pub include_snippets: bool,

    /// Ask the model for a bullet summary of the stories
    #[arg(long, env = "SUMMARY_POINTS")]
    pub summary_points: bool,

    /// Stop after producing the image; upload and publish nothing
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,
}
