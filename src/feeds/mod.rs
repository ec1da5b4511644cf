//! Feed aggregation: the first pipeline stage.
//!
//! Each configured source is fetched once, in configuration order. A source
//! that fails (network error, bad status, unparseable XML) is logged and
//! contributes nothing; the stage only fails when every source came back
//! empty.
//!
//! # Submodules
//!
//! - [`rss`]: RSS 2.0 / Atom parsing into [`FeedItem`]s

pub mod rss;

use crate::error::{PipelineError, PipelineResult};
use crate::models::FeedItem;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{info, instrument, warn};
use url::Url;

/// Source of feed items for one URL.
pub trait FeedFetcher {
    /// Fetch and parse the feed at `url`.
    ///
    /// Failures are reported as [`PipelineError::SourceUnavailable`].
    async fn fetch(&self, url: &Url) -> PipelineResult<Vec<FeedItem>>;
}

/// [`FeedFetcher`] that downloads feeds over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl FeedFetcher for HttpFeedFetcher {
    #[instrument(level = "info", skip_all, fields(%url))]
    async fn fetch(&self, url: &Url) -> PipelineResult<Vec<FeedItem>> {
        let unavailable = |reason: String| PipelineError::SourceUnavailable {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {status}")));
        }
        let body = resp.text().await.map_err(|e| unavailable(e.to_string()))?;
        let items = rss::parse_feed(&body).map_err(|e| unavailable(e.to_string()))?;

        info!(count = items.len(), bytes = body.len(), "Parsed feed");
        Ok(items)
    }
}

/// Fetch every source in order and flatten the results.
///
/// Each source contributes at most `cap` items, keeping its own order.
///
/// # Errors
///
/// [`PipelineError::NoContentAvailable`] when no source yielded any item.
#[instrument(level = "info", skip_all, fields(sources = sources.len(), cap = cap))]
pub async fn aggregate<F: FeedFetcher>(
    fetcher: &F,
    sources: &[Url],
    cap: usize,
) -> PipelineResult<Vec<FeedItem>> {
    let per_source: Vec<Vec<FeedItem>> = stream::iter(sources)
        .then(|url| async move {
            match fetcher.fetch(url).await {
                Ok(items) => {
                    let available = items.len();
                    let taken: Vec<FeedItem> = items.into_iter().take(cap).collect();
                    info!(%url, available, taken = taken.len(), "Collected feed items");
                    taken
                }
                Err(e) => {
                    warn!(%url, error = %e, "Feed unavailable; skipping source");
                    Vec::new()
                }
            }
        })
        .collect()
        .await;

    let items: Vec<FeedItem> = per_source.into_iter().flatten().collect();
    if items.is_empty() {
        return Err(PipelineError::NoContentAvailable {
            sources: sources.len(),
        });
    }

    info!(count = items.len(), "Aggregated feed items");
    Ok(items)
}
