//! Data models that flow between pipeline stages.
//!
//! Each stage owns the value it produces until it hands it to the next one:
//! - [`FeedItem`]: a headline pulled from a feed
//! - [`GeneratedPost`]: the structured copy returned by the text model
//! - [`ImageAsset`]: freshly generated image data, or the static fallback
//! - [`HostedImageUrl`]: the public URL the social platform will fetch
//! - [`PublishResult`]: the id of the live post
//!
//! [`GeneratedPost`] uses camelCase on the wire to match the response schema
//! sent to the model.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

/// A single entry from an RSS or Atom feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// The entry headline.
    pub title: String,
    /// Plain-text summary, when the feed carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl FeedItem {
    pub fn new(title: impl Into<String>, summary: Option<String>) -> Self {
        Self {
            title: title.into(),
            summary,
        }
    }
}

/// Copy produced by the text model.
///
/// `caption` and `hashtags` are required by the response schema, so a reply
/// missing either fails to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPost {
    /// The body of the post.
    pub caption: String,
    /// Hashtags without the leading `#`.
    pub hashtags: Vec<String>,
    /// Subject for the illustration, if the model proposed one.
    #[serde(default)]
    pub image_prompt: Option<String>,
    /// Bullet summary of the stories, only requested by some profiles.
    #[serde(default)]
    pub summary_points: Vec<String>,
}

impl GeneratedPost {
    /// Caption as published: the body, a blank line, then the hashtags.
    ///
    /// An empty hashtag list leaves an empty trailing section rather than a
    /// stray `#`.
    pub fn composed_caption(&self) -> String {
        let tags = self
            .hashtags
            .iter()
            .map(|h| format!("#{h}"))
            .collect::<Vec<_>>()
            .join(" ");
        format!("{}\n\n{}", self.caption, tags)
    }
}

/// Base64 image data exactly as returned by the image model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// The image chosen for this run. Exactly one variant is ever active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAsset {
    /// Freshly generated image that still has to be hosted.
    Generated(InlineImage),
    /// Pre-hosted stock image used when generation is unavailable.
    Fallback(String),
}

impl ImageAsset {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ImageAsset::Fallback(_))
    }

    /// Short label for logs and the run report.
    pub fn source_label(&self) -> &'static str {
        match self {
            ImageAsset::Generated(_) => "generated",
            ImageAsset::Fallback(_) => "fallback",
        }
    }
}

/// A publicly reachable image URL. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedImageUrl(String);

impl HostedImageUrl {
    pub fn new(url: impl Into<String>) -> PipelineResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(PipelineError::HostingFailed(
                "hosted image URL is empty".to_string(),
            ));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Draft media object on the social platform, awaiting publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaContainer {
    pub id: String,
}

/// The live post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub id: String,
}

/// Summary of a finished run, logged by `main`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub items_collected: usize,
    pub image_source: &'static str,
    pub image_url: Option<String>,
    pub caption: String,
    /// `None` when the run was a dry run.
    pub published: Option<PublishResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(hashtags: &[&str]) -> GeneratedPost {
        GeneratedPost {
            caption: "Big week in AI".to_string(),
            hashtags: hashtags.iter().map(|h| h.to_string()).collect(),
            image_prompt: None,
            summary_points: vec![],
        }
    }

    #[test]
    fn test_composed_caption_with_hashtags() {
        let p = post(&["AI", "Tech", "News"]);
        assert_eq!(p.composed_caption(), "Big week in AI\n\n#AI #Tech #News");
    }

    #[test]
    fn test_composed_caption_without_hashtags() {
        let p = post(&[]);
        assert_eq!(p.composed_caption(), "Big week in AI\n\n");
        assert!(!p.composed_caption().contains('#'));
    }

    #[test]
    fn test_generated_post_deserialization_optional_fields() {
        let json = r#"{"caption": "Hello", "hashtags": ["a", "b"]}"#;
        let p: GeneratedPost = serde_json::from_str(json).unwrap();
        assert_eq!(p.caption, "Hello");
        assert_eq!(p.hashtags, vec!["a", "b"]);
        assert_eq!(p.image_prompt, None);
        assert!(p.summary_points.is_empty());
    }

    #[test]
    fn test_generated_post_camel_case_fields() {
        let json = r#"{
            "caption": "Hello",
            "hashtags": [],
            "imagePrompt": "robot reading a newspaper",
            "summaryPoints": ["one", "two"]
        }"#;
        let p: GeneratedPost = serde_json::from_str(json).unwrap();
        assert_eq!(p.image_prompt.as_deref(), Some("robot reading a newspaper"));
        assert_eq!(p.summary_points.len(), 2);
    }

    #[test]
    fn test_generated_post_requires_hashtags() {
        let json = r#"{"caption": "Hello"}"#;
        let err = serde_json::from_str::<GeneratedPost>(json).unwrap_err();
        assert!(err.to_string().contains("hashtags"));
    }

    #[test]
    fn test_hosted_image_url_rejects_blank() {
        assert!(HostedImageUrl::new("").is_err());
        assert!(HostedImageUrl::new("   ").is_err());
        let url = HostedImageUrl::new("https://i.ibb.co/abc/image.png").unwrap();
        assert_eq!(url.as_str(), "https://i.ibb.co/abc/image.png");
    }

    #[test]
    fn test_image_asset_labels() {
        let fallback = ImageAsset::Fallback("https://example.com/stock.jpg".to_string());
        assert!(fallback.is_fallback());
        assert_eq!(fallback.source_label(), "fallback");

        let generated = ImageAsset::Generated(InlineImage {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        });
        assert!(!generated.is_fallback());
        assert_eq!(generated.source_label(), "generated");
    }
}
