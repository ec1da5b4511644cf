//! Error taxonomy for a pipeline run.
//!
//! Every stage returns [`PipelineError`]. Some variants are only ever
//! produced and absorbed locally (a single unavailable feed, an image
//! failure under the resilient policy); everything that reaches `main`
//! aborts the run with a non-zero exit code.

use std::fmt;
use thiserror::Error;

/// Result alias used by every stage.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Which half of the two-phase publish protocol failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    CreateContainer,
    PublishContainer,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStep::CreateContainer => f.write_str("media container creation"),
            PublishStep::PublishContainer => f.write_str("media publish"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required setting was absent or blank.
    #[error("missing required setting {name}")]
    ConfigurationMissing { name: &'static str },

    /// A setting was present but unusable.
    #[error("invalid setting {name}: {reason}")]
    ConfigurationInvalid { name: &'static str, reason: String },

    /// One feed could not be fetched or parsed. Non-fatal on its own.
    #[error("feed {url} unavailable: {reason}")]
    SourceUnavailable { url: String, reason: String },

    /// Every configured feed came back empty or failed.
    #[error("no feed items could be collected from {sources} source(s)")]
    NoContentAvailable { sources: usize },

    /// The text-generation request itself failed (network, HTTP status).
    #[error("copy generation request failed: {0}")]
    CopyGenerationFailed(String),

    /// The text-generation response did not satisfy the output schema.
    #[error("generated copy does not match the expected schema: {0}")]
    GenerationSchemaError(String),

    /// Image generation was still rate limited when attempts ran out.
    #[error("image generation rate limited after {attempts} attempt(s): {message}")]
    RateLimited { attempts: u32, message: String },

    /// Image generation failed for a reason other than rate limiting.
    #[error("image generation failed: {0}")]
    GenerationFailed(String),

    #[error("image hosting failed: {0}")]
    HostingFailed(String),

    #[error("{step} rejected (HTTP {status}): {message}")]
    PublishRejected {
        step: PublishStep,
        status: u16,
        message: String,
    },

    /// The publish request never got an answer from the platform.
    #[error("{step} request failed: {message}")]
    PublishFailed { step: PublishStep, message: String },

    /// The platform refused the request because the token lacks publish scope.
    #[error("{step} denied, missing publish permission (HTTP {status}): {message}")]
    PermissionDenied {
        step: PublishStep,
        status: u16,
        message: String,
    },
}

impl PipelineError {
    /// Process exit status for an error that aborted the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::ConfigurationMissing { .. } | PipelineError::ConfigurationInvalid { .. } => 2,
            _ => 1,
        }
    }

    /// Actionable advice printed next to the diagnostic, if any.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PipelineError::PermissionDenied { .. } => Some(
                "The access token is likely missing the 'instagram_content_publish' permission. \
                 Check the token's permissions in the Meta Graph API Explorer.",
            ),
            PipelineError::ConfigurationMissing { .. } => {
                Some("Set the value on the command line, in the environment, or in a .env file.")
            }
            _ => None,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, PipelineError::PermissionDenied { .. })
    }
}
