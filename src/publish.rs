//! Post publishing: the final pipeline stage.
//!
//! Publishing to Instagram through the Meta Graph API is a two-phase
//! protocol:
//!
//! | Step | Endpoint | Body | Reply |
//! |------|----------|------|-------|
//! | create container | `POST /{account_id}/media` | `image_url`, `caption`, `access_token` | `{id}` or `{error}` |
//! | publish container | `POST /{account_id}/media_publish` | `creation_id`, `access_token` | `{id}` |
//!
//! Both calls create something on the platform, so neither is retried: a
//! second attempt after an ambiguous failure could publish the post twice.
//!
//! # Rejections
//!
//! A reply is rejected when its status is not 2xx or it carries an `error`
//! object. Rejections whose status is in the configured permission set
//! (403 by default) or whose message mentions "permission" are reported as
//! [`PipelineError::PermissionDenied`]; everything else is
//! [`PipelineError::PublishRejected`]. A 2xx reply without an `id` is also
//! rejected.

use crate::config::GraphConfig;
use crate::error::{PipelineError, PipelineResult, PublishStep};
use crate::models::{HostedImageUrl, MediaContainer, PublishResult};
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

const GRAPH_API_BASE: &str = "https://graph.facebook.com";

/// Decoded Graph API reply body.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphBody {
    pub id: Option<String>,
    pub error: Option<GraphErrorBody>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct GraphErrorBody {
    pub message: Option<String>,
    pub code: Option<i64>,
}

/// HTTP status plus decoded body of a Graph API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphReply {
    pub status: u16,
    pub body: GraphBody,
}

impl GraphReply {
    /// Decode a raw reply. A body that is not Graph JSON decodes as empty,
    /// which the classification then treats as "no id".
    pub fn from_raw(status: u16, body: &str) -> Self {
        let body = serde_json::from_str(body).unwrap_or_else(|e| {
            warn!(status, error = %e, body = %truncate_for_log(body, 200), "Graph reply is not JSON");
            GraphBody::default()
        });
        Self { status, body }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The two Graph API calls used to publish a post.
pub trait GraphApi {
    async fn create_container(&self, image_url: &str, caption: &str) -> PipelineResult<GraphReply>;
    async fn publish_container(&self, creation_id: &str) -> PipelineResult<GraphReply>;
}

/// Turn a rejected reply into the matching error; `None` when accepted.
pub fn classify_rejection(
    step: PublishStep,
    reply: &GraphReply,
    permission_statuses: &[u16],
) -> Option<PipelineError> {
    if reply.is_success() && reply.body.error.is_none() {
        return None;
    }

    let message = reply
        .body
        .error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| "Unknown Error".to_string());
    let permission = permission_statuses.contains(&reply.status)
        || message.to_lowercase().contains("permission");

    let status = reply.status;
    Some(if permission {
        PipelineError::PermissionDenied {
            step,
            status,
            message,
        }
    } else {
        PipelineError::PublishRejected {
            step,
            status,
            message,
        }
    })
}

fn accepted_id(step: PublishStep, reply: GraphReply, permission_statuses: &[u16]) -> PipelineResult<String> {
    if let Some(err) = classify_rejection(step, &reply, permission_statuses) {
        let code = reply.body.error.as_ref().and_then(|e| e.code);
        error!(%step, status = reply.status, ?code, error = %err, "Meta Graph rejected request");
        if err.is_permission_denied() {
            error!("Permission error detected: the token likely lacks 'instagram_content_publish'");
        }
        return Err(err);
    }
    match reply.body.id {
        Some(id) if !id.trim().is_empty() => Ok(id),
        _ => Err(PipelineError::PublishRejected {
            step,
            status: reply.status,
            message: "response has no id".to_string(),
        }),
    }
}

/// Create the media container for the post.
#[instrument(level = "info", skip_all)]
pub async fn create_container<A: GraphApi>(
    api: &A,
    image_url: &HostedImageUrl,
    caption: &str,
    permission_statuses: &[u16],
) -> PipelineResult<MediaContainer> {
    let reply = api.create_container(image_url.as_str(), caption).await?;
    let id = accepted_id(PublishStep::CreateContainer, reply, permission_statuses)?;
    info!(container_id = %id, "Created media container");
    Ok(MediaContainer { id })
}

/// Publish a previously created container.
#[instrument(level = "info", skip_all, fields(container_id = %container.id))]
pub async fn publish_container<A: GraphApi>(
    api: &A,
    container: MediaContainer,
    permission_statuses: &[u16],
) -> PipelineResult<PublishResult> {
    let reply = api.publish_container(&container.id).await?;
    let id = accepted_id(PublishStep::PublishContainer, reply, permission_statuses)?;
    info!(post_id = %id, "Published media container");
    Ok(PublishResult { id })
}

/// Run both publish phases for a hosted image and composed caption.
pub async fn publish_post<A: GraphApi>(
    api: &A,
    image_url: &HostedImageUrl,
    caption: &str,
    config: &GraphConfig,
) -> PipelineResult<PublishResult> {
    let container = create_container(api, image_url, caption, &config.permission_statuses).await?;
    publish_container(api, container, &config.permission_statuses).await
}

fn container_body(image_url: &str, caption: &str, access_token: &str) -> Value {
    json!({
        "image_url": image_url,
        "caption": caption,
        "access_token": access_token,
    })
}

fn publish_body(creation_id: &str, access_token: &str) -> Value {
    json!({
        "creation_id": creation_id,
        "access_token": access_token,
    })
}

/// [`GraphApi`] over HTTPS for a single Instagram account.
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    base_url: String,
    account_id: String,
    access_token: String,
}

impl fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(client: Client, config: &GraphConfig) -> Self {
        Self {
            client,
            base_url: format!("{}/{}", GRAPH_API_BASE, config.api_version),
            account_id: config.account_id.clone(),
            access_token: config.access_token.clone(),
        }
    }

    async fn post(&self, step: PublishStep, edge: &str, body: Value) -> PipelineResult<GraphReply> {
        let url = format!("{}/{}/{}", self.base_url, self.account_id, edge);
        let failed = |e: reqwest::Error| PipelineError::PublishFailed {
            step,
            message: e.to_string(),
        };

        let resp = self.client.post(&url).json(&body).send().await.map_err(failed)?;
        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(failed)?;
        debug!(%edge, status, bytes = text.len(), "Graph API replied");
        Ok(GraphReply::from_raw(status, &text))
    }
}

impl GraphApi for GraphClient {
    async fn create_container(&self, image_url: &str, caption: &str) -> PipelineResult<GraphReply> {
        let body = container_body(image_url, caption, &self.access_token);
        self.post(PublishStep::CreateContainer, "media", body).await
    }

    async fn publish_container(&self, creation_id: &str) -> PipelineResult<GraphReply> {
        let body = publish_body(creation_id, &self.access_token);
        self.post(PublishStep::PublishContainer, "media_publish", body).await
    }
}
