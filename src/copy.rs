//! Copy generation: the second pipeline stage.
//!
//! The aggregated headlines go to the text model in a single
//! schema-constrained call. There is no retry and no fallback text: a reply
//! that does not satisfy the schema aborts the run.

use crate::api::TextGeneration;
use crate::config::CopyConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{FeedItem, GeneratedPost};
use crate::utils::{looks_truncated, normalize_hashtag, truncate_for_log};
use itertools::Itertools;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

/// Response schema in the Gemini `responseSchema` dialect.
pub fn response_schema(request_summary_points: bool) -> Value {
    let mut properties = json!({
        "caption": { "type": "STRING" },
        "hashtags": { "type": "ARRAY", "items": { "type": "STRING" } },
        "imagePrompt": { "type": "STRING" },
    });
    if request_summary_points {
        properties["summaryPoints"] = json!({ "type": "ARRAY", "items": { "type": "STRING" } });
    }
    json!({
        "type": "OBJECT",
        "properties": properties,
        "required": ["caption", "hashtags"],
    })
}

/// Build the generation prompt from the feed items.
///
/// Items are embedded as JSON exactly as the feeds delivered them: titles
/// only, or titles with summaries when snippets are enabled.
pub fn build_prompt(items: &[FeedItem], config: &CopyConfig) -> String {
    let stories = if config.include_snippets {
        json!(items)
    } else {
        json!(items.iter().map(|i| i.title.as_str()).collect::<Vec<_>>())
    };

    let mut prompt = format!(
        "Summarize these news stories for an Instagram post: {stories}. Tone: {}. \
         Write a caption, a list of hashtags without the leading #, and an imagePrompt: \
         one sentence describing an illustration that fits the stories.",
        config.tone
    );
    if config.request_summary_points {
        prompt.push_str(" Also give summaryPoints: one short bullet per story.");
    }
    prompt
}

/// Parse and normalize the model's JSON reply.
///
/// # Errors
///
/// [`PipelineError::GenerationSchemaError`] when the JSON is malformed,
/// truncated, missing `caption` or `hashtags`, or the caption is blank.
pub fn parse_generated_post(raw: &str) -> PipelineResult<GeneratedPost> {
    let mut post: GeneratedPost = serde_json::from_str(raw).map_err(|e| {
        warn!(
            error = %e,
            response_preview = %truncate_for_log(raw, 300),
            "Model returned non-conforming JSON"
        );
        if looks_truncated(&e) {
            PipelineError::GenerationSchemaError(format!("response appears truncated: {e}"))
        } else {
            PipelineError::GenerationSchemaError(e.to_string())
        }
    })?;

    if post.caption.trim().is_empty() {
        return Err(PipelineError::GenerationSchemaError(
            "caption is empty".to_string(),
        ));
    }

    post.hashtags = post
        .hashtags
        .iter()
        .map(|h| normalize_hashtag(h))
        .filter(|h| !h.is_empty())
        .unique()
        .collect();
    post.image_prompt = post
        .image_prompt
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    Ok(post)
}

/// Produce the post copy with exactly one generation call.
#[instrument(level = "info", skip_all, fields(items = items.len(), tone = %config.tone))]
pub async fn generate_copy<G: TextGeneration>(
    model: &G,
    items: &[FeedItem],
    config: &CopyConfig,
) -> PipelineResult<GeneratedPost> {
    let prompt = build_prompt(items, config);
    let schema = response_schema(config.request_summary_points);
    debug!(prompt = %truncate_for_log(&prompt, 500), "Built copy prompt");

    let raw = model.generate_json(&prompt, &schema).await?;
    let post = parse_generated_post(&raw)?;

    info!(
        caption_chars = post.caption.chars().count(),
        hashtags = post.hashtags.len(),
        has_image_prompt = post.image_prompt.is_some(),
        summary_points = post.summary_points.len(),
        "Generated post copy"
    );
    for point in &post.summary_points {
        debug!(%point, "Summary point");
    }
    Ok(post)
}
