//! The five-stage run, in order.
//!
//! 1. **Feeds**: aggregate headlines ([`crate::feeds`])
//! 2. **Copy**: caption, hashtags and image subject ([`crate::copy`])
//! 3. **Image**: generate with retry, or fall back ([`crate::image`])
//! 4. **Hosting**: public URL for the image ([`crate::hosting`])
//! 5. **Publish**: container, then publish ([`crate::publish`])
//!
//! Each stage consumes the previous stage's output and nothing runs ahead.
//! The first fatal error ends the run. Under the resilient image policy the
//! upload in stage 4 shares the image fallback: if hosting fails, the
//! fallback image is posted instead.

use crate::api::{ImageGeneration, TextGeneration};
use crate::config::Config;
use crate::copy::generate_copy;
use crate::error::PipelineResult;
use crate::feeds::{aggregate, FeedFetcher};
use crate::hosting::{host_image, ImageHost};
use crate::image::{fallback_or_fail, produce_image};
use crate::models::{ImageAsset, RunReport};
use crate::publish::{publish_post, GraphApi};
use tracing::{info, instrument};

/// The remote collaborators of a run.
#[derive(Debug)]
pub struct Pipeline<F, G, H, P> {
    pub feeds: F,
    pub model: G,
    pub host: H,
    pub graph: P,
}

impl<F, G, H, P> Pipeline<F, G, H, P>
where
    F: FeedFetcher,
    G: TextGeneration + ImageGeneration,
    H: ImageHost,
    P: GraphApi,
{
    pub fn new(feeds: F, model: G, host: H, graph: P) -> Self {
        Self {
            feeds,
            model,
            host,
            graph,
        }
    }

    /// Execute one run against `config`.
    #[instrument(level = "info", skip_all, fields(dry_run = config.dry_run))]
    pub async fn run(&self, config: &Config) -> PipelineResult<RunReport> {
        info!("[1/5] Fetching feeds");
        let items = aggregate(
            &self.feeds,
            &config.feeds.sources,
            config.feeds.items_per_source,
        )
        .await?;

        info!("[2/5] Generating post copy");
        let post = generate_copy(&self.model, &items, &config.copy).await?;
        let caption = post.composed_caption();

        info!("[3/5] Preparing image");
        let asset = produce_image(&self.model, &post, &config.image).await?;

        if config.dry_run {
            info!(image_source = asset.source_label(), "Dry run: skipping upload and publish");
            let image_url = match &asset {
                ImageAsset::Fallback(url) => Some(url.clone()),
                ImageAsset::Generated(_) => None,
            };
            return Ok(RunReport {
                items_collected: items.len(),
                image_source: asset.source_label(),
                image_url,
                caption,
                published: None,
            });
        }

        info!(fallback = asset.is_fallback(), "[4/5] Hosting image");
        let mut image_source = asset.source_label();
        let hosted = match host_image(&self.host, &asset).await {
            Ok(url) => url,
            Err(e) => {
                let fallback = fallback_or_fail(&config.image, e)?;
                image_source = fallback.source_label();
                host_image(&self.host, &fallback).await?
            }
        };

        info!("[5/5] Publishing to Meta Graph");
        let published = publish_post(&self.graph, &hosted, &caption, &config.graph).await?;

        Ok(RunReport {
            items_collected: items.len(),
            image_source,
            image_url: Some(hosted.as_str().to_string()),
            caption,
            published: Some(published),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ImageAttempt;
    use crate::cli::ImagePolicy;
    use crate::config::tests::test_config;
    use crate::error::{PipelineError, PublishStep};
    use crate::publish::GraphReply;
    use crate::testing::{items, png, FakeFeeds, FakeGemini, FakeGraph, FakeHost};

    const COPY: &str = r#"{"caption": "AI week in review", "hashtags": ["AI", "Tech"], "imagePrompt": "robots at a newsstand"}"#;

    fn feeds_with_two_items_each(config: &Config) -> FakeFeeds {
        FakeFeeds::new()
            .with_items(&config.feeds.sources[0], items("a", 2))
            .with_items(&config.feeds.sources[1], items("b", 2))
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let config = test_config(ImagePolicy::Resilient);
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![ImageAttempt::Generated(png())]),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::accepting(),
        );

        let report = pipeline.run(&config).await.unwrap();

        assert_eq!(report.published.map(|p| p.id).as_deref(), Some("999"));
        assert_eq!(report.items_collected, 4);
        assert_eq!(report.image_source, "generated");
        assert_eq!(report.caption, "AI week in review\n\n#AI #Tech");
        assert_eq!(pipeline.model.text_calls(), 1);
        assert_eq!(pipeline.model.image_calls(), 1);
        assert_eq!(pipeline.host.uploads(), 1);
        assert_eq!(
            pipeline.graph.created(),
            vec![(
                "https://i.ibb.co/x/y.png".to_string(),
                "AI week in review\n\n#AI #Tech".to_string()
            )]
        );
        assert_eq!(pipeline.graph.published(), vec!["123".to_string()]);
    }

    #[tokio::test]
    async fn test_all_feeds_failing_aborts_before_generation() {
        let config = test_config(ImagePolicy::Resilient);
        let pipeline = Pipeline::new(
            FakeFeeds::new(),
            FakeGemini::new().with_copy(COPY),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::accepting(),
        );

        let err = pipeline.run(&config).await.unwrap_err();

        assert!(matches!(err, PipelineError::NoContentAvailable { sources: 2 }));
        assert_eq!(pipeline.feeds.calls(), 2);
        assert_eq!(pipeline.model.text_calls(), 0);
        assert_eq!(pipeline.model.image_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_hashtags_aborts_before_image_and_publish() {
        let config = test_config(ImagePolicy::Resilient);
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(r#"{"caption": "No tags"}"#)
                .with_image_attempts(vec![ImageAttempt::Generated(png())]),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::accepting(),
        );

        let err = pipeline.run(&config).await.unwrap_err();

        assert!(matches!(err, PipelineError::GenerationSchemaError(_)));
        assert_eq!(pipeline.model.image_calls(), 0);
        assert_eq!(pipeline.host.uploads(), 0);
        assert!(pipeline.graph.created().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_resilient_run_posts_fallback() {
        let config = test_config(ImagePolicy::Resilient);
        let limited = ImageAttempt::RateLimited("HTTP 429: Quota exceeded".to_string());
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![limited; 3]),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::accepting(),
        );

        let report = pipeline.run(&config).await.unwrap();

        assert_eq!(report.image_source, "fallback");
        assert_eq!(pipeline.model.image_calls(), 3);
        assert_eq!(pipeline.host.uploads(), 0);
        let created = pipeline.graph.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "https://example.com/fallback.jpg");
        assert_eq!(report.published.unwrap().id, "999");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_strict_run_aborts() {
        let config = test_config(ImagePolicy::Strict);
        let limited = ImageAttempt::RateLimited("HTTP 429: Quota exceeded".to_string());
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![limited; 3]),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::accepting(),
        );

        let err = pipeline.run(&config).await.unwrap_err();

        assert!(matches!(err, PipelineError::RateLimited { attempts: 3, .. }));
        assert!(pipeline.graph.created().is_empty());
    }

    #[tokio::test]
    async fn test_hosting_failure_falls_back_when_resilient() {
        let config = test_config(ImagePolicy::Resilient);
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![ImageAttempt::Generated(png())]),
            FakeHost::failing(),
            FakeGraph::accepting(),
        );

        let report = pipeline.run(&config).await.unwrap();

        assert_eq!(report.image_source, "fallback");
        assert_eq!(pipeline.host.uploads(), 1);
        assert_eq!(pipeline.graph.created()[0].0, "https://example.com/fallback.jpg");
    }

    #[tokio::test]
    async fn test_hosting_failure_aborts_when_strict() {
        let config = test_config(ImagePolicy::Strict);
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![ImageAttempt::Generated(png())]),
            FakeHost::failing(),
            FakeGraph::accepting(),
        );

        let err = pipeline.run(&config).await.unwrap_err();

        assert!(matches!(err, PipelineError::HostingFailed(_)));
        assert!(pipeline.graph.created().is_empty());
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces() {
        let config = test_config(ImagePolicy::Resilient);
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![ImageAttempt::Generated(png())]),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::new(
                GraphReply::from_raw(403, r#"{"error": {"message": "Insufficient permission"}}"#),
                GraphReply::from_raw(200, r#"{"id": "999"}"#),
            ),
        );

        let err = pipeline.run(&config).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::PermissionDenied { step: PublishStep::CreateContainer, status: 403, .. }
        ));
        assert_eq!(err.exit_code(), 1);
        assert!(pipeline.graph.published().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_uploads_and_publishes_nothing() {
        let mut config = test_config(ImagePolicy::Resilient);
        config.dry_run = true;
        let pipeline = Pipeline::new(
            feeds_with_two_items_each(&config),
            FakeGemini::new()
                .with_copy(COPY)
                .with_image_attempts(vec![ImageAttempt::Generated(png())]),
            FakeHost::returning("https://i.ibb.co/x/y.png"),
            FakeGraph::accepting(),
        );

        let report = pipeline.run(&config).await.unwrap();

        assert!(report.published.is_none());
        assert_eq!(report.image_source, "generated");
        assert_eq!(pipeline.host.uploads(), 0);
        assert!(pipeline.graph.created().is_empty());
    }
}
