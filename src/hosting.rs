//! Image hosting: the fourth pipeline stage.
//!
//! A generated image only exists as base64 data, but the social platform
//! needs a URL it can fetch. The data is uploaded once to imgbb; a fallback
//! image is already hosted and skips the upload entirely.

use crate::config::HostingConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{HostedImageUrl, ImageAsset, InlineImage};
use crate::utils::truncate_for_log;
use reqwest::multipart::Form;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::{info, instrument};

const IMGBB_UPLOAD_URL: &str = "https://api.imgbb.com/1/upload";

/// Public image hosting.
pub trait ImageHost {
    /// Upload the image and return its public URL.
    ///
    /// Any failure, including a reply without a URL, is
    /// [`PipelineError::HostingFailed`].
    async fn upload(&self, image: &InlineImage) -> PipelineResult<HostedImageUrl>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    url: Option<String>,
}

/// Extract `data.url` from an imgbb upload reply.
pub fn parse_upload_response(status: u16, body: &str) -> PipelineResult<HostedImageUrl> {
    if !(200..300).contains(&status) {
        return Err(PipelineError::HostingFailed(format!(
            "HTTP {status}: {}",
            truncate_for_log(body, 200)
        )));
    }
    let resp: UploadResponse = serde_json::from_str(body)
        .map_err(|e| PipelineError::HostingFailed(format!("unreadable upload response: {e}")))?;
    let url = resp
        .data
        .and_then(|d| d.url)
        .ok_or_else(|| PipelineError::HostingFailed("upload response has no data.url".to_string()))?;
    HostedImageUrl::new(url)
}

/// Multipart text fields of an upload; the key travels in the query string.
fn upload_fields(image: &InlineImage) -> Vec<(&'static str, String)> {
    vec![("image", image.data.clone())]
}

/// Describe a transport failure without the request URL, which carries the
/// API key.
fn request_failure(context: &str, e: reqwest::Error) -> PipelineError {
    PipelineError::HostingFailed(format!("{context}: {}", e.without_url()))
}

#[derive(Clone)]
pub struct ImgbbClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl fmt::Debug for ImgbbClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImgbbClient").finish_non_exhaustive()
    }
}

impl ImgbbClient {
    pub fn new(client: Client, config: &HostingConfig) -> Self {
        Self {
            client,
            endpoint: IMGBB_UPLOAD_URL.to_string(),
            api_key: config.api_key.clone(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

impl ImageHost for ImgbbClient {
    #[instrument(level = "info", skip_all, fields(mime_type = %image.mime_type))]
    async fn upload(&self, image: &InlineImage) -> PipelineResult<HostedImageUrl> {
        let form = upload_fields(image)
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));
        let resp = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_failure("upload request failed", e))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| request_failure("upload response unreadable", e))?;

        let url = parse_upload_response(status, &body)?;
        info!(url = %url.as_str(), "Uploaded image");
        Ok(url)
    }
}

/// Resolve the asset to a public URL, uploading only generated images.
pub async fn host_image<H: ImageHost>(host: &H, asset: &ImageAsset) -> PipelineResult<HostedImageUrl> {
    match asset {
        ImageAsset::Generated(image) => host.upload(image).await,
        ImageAsset::Fallback(url) => {
            info!(%url, "Fallback image is already hosted; skipping upload");
            HostedImageUrl::new(url.clone())
        }
    }
}
