//! In-memory stand-ins for the remote services, shared by the unit tests.

use crate::api::{ImageAttempt, ImageGeneration, TextGeneration};
use crate::error::{PipelineError, PipelineResult};
use crate::feeds::FeedFetcher;
use crate::hosting::ImageHost;
use crate::models::{FeedItem, HostedImageUrl, InlineImage};
use crate::publish::{GraphApi, GraphReply};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// `n` items titled `{prefix}1..={prefix}n`.
pub fn items(prefix: &str, n: usize) -> Vec<FeedItem> {
    (1..=n)
        .map(|i| FeedItem::new(format!("{prefix}{i}"), Some(format!("summary {prefix}{i}"))))
        .collect()
}

pub fn png() -> InlineImage {
    InlineImage {
        mime_type: "image/png".to_string(),
        data: "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==".to_string(),
    }
}

/// Feeds keyed by URL; unknown URLs and registered failures are unavailable.
#[derive(Default)]
pub struct FakeFeeds {
    feeds: HashMap<String, Option<Vec<FeedItem>>>,
    calls: AtomicUsize,
}

impl FakeFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(mut self, url: &Url, items: Vec<FeedItem>) -> Self {
        self.feeds.insert(url.to_string(), Some(items));
        self
    }

    pub fn with_failure(mut self, url: &Url) -> Self {
        self.feeds.insert(url.to_string(), None);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeedFetcher for FakeFeeds {
    async fn fetch(&self, url: &Url) -> PipelineResult<Vec<FeedItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.feeds.get(url.as_str()) {
            Some(Some(items)) => Ok(items.clone()),
            _ => Err(PipelineError::SourceUnavailable {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

enum CopyScript {
    Json(String),
    Fail(String),
}

/// Scripted text and image model.
///
/// Image attempts are served in order; once the script runs out every
/// further attempt fails.
#[derive(Default)]
pub struct FakeGemini {
    copy: Option<CopyScript>,
    image_attempts: Mutex<VecDeque<ImageAttempt>>,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl FakeGemini {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_copy(mut self, json: &str) -> Self {
        self.copy = Some(CopyScript::Json(json.to_string()));
        self
    }

    pub fn with_copy_failure(mut self, reason: &str) -> Self {
        self.copy = Some(CopyScript::Fail(reason.to_string()));
        self
    }

    pub fn with_image_attempts(self, attempts: Vec<ImageAttempt>) -> Self {
        *self.image_attempts.lock().unwrap() = attempts.into();
        self
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

impl TextGeneration for FakeGemini {
    async fn generate_json(&self, prompt: &str, _schema: &Value) -> PipelineResult<String> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        match &self.copy {
            Some(CopyScript::Json(json)) => Ok(json.clone()),
            Some(CopyScript::Fail(reason)) => Err(PipelineError::CopyGenerationFailed(reason.clone())),
            None => Err(PipelineError::CopyGenerationFailed("no scripted copy".to_string())),
        }
    }
}

impl ImageGeneration for FakeGemini {
    async fn generate_image(&self, _prompt: &str) -> ImageAttempt {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.image_attempts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ImageAttempt::Failed("no scripted attempt".to_string()))
    }
}

/// Image host that always returns the same URL, or always fails.
pub struct FakeHost {
    url: Option<String>,
    uploads: AtomicUsize,
}

impl FakeHost {
    pub fn returning(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            uploads: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            url: None,
            uploads: AtomicUsize::new(0),
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

impl ImageHost for FakeHost {
    async fn upload(&self, _image: &InlineImage) -> PipelineResult<HostedImageUrl> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        match &self.url {
            Some(url) => HostedImageUrl::new(url.clone()),
            None => Err(PipelineError::HostingFailed("HTTP 500: upstream error".to_string())),
        }
    }
}

/// Graph API with one canned reply per phase, recording every call.
pub struct FakeGraph {
    create_reply: GraphReply,
    publish_reply: GraphReply,
    created: Mutex<Vec<(String, String)>>,
    published: Mutex<Vec<String>>,
}

impl FakeGraph {
    pub fn new(create_reply: GraphReply, publish_reply: GraphReply) -> Self {
        Self {
            create_reply,
            publish_reply,
            created: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Container "123", post "999".
    pub fn accepting() -> Self {
        Self::new(
            GraphReply::from_raw(200, r#"{"id": "123"}"#),
            GraphReply::from_raw(200, r#"{"id": "999"}"#),
        )
    }

    pub fn created(&self) -> Vec<(String, String)> {
        self.created.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

impl GraphApi for FakeGraph {
    async fn create_container(&self, image_url: &str, caption: &str) -> PipelineResult<GraphReply> {
        self.created
            .lock()
            .unwrap()
            .push((image_url.to_string(), caption.to_string()));
        Ok(self.create_reply.clone())
    }

    async fn publish_container(&self, creation_id: &str) -> PipelineResult<GraphReply> {
        self.published.lock().unwrap().push(creation_id.to_string());
        Ok(self.publish_reply.clone())
    }
}
