// Ports between the pipeline and its external collaborators

use std::path::Path;

use async_trait::async_trait;

use super::errors::{DeliveryError, SinkError, UploadError};
use super::models::{MediaArtifact, PlatformLocation, Severity, UploadReceipt};

/// Where status text is rendered (a chat message that gets edited in place)
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update_status(
        &self,
        location: &StatusLocation,
        title: &str,
        body: &str,
        severity: Severity,
    ) -> Result<(), SinkError>;
}

/// Reference to the status message a run keeps editing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLocation {
    pub channel: PlatformLocation,
    pub message_id: String,
}

impl StatusLocation {
    pub fn new(channel: PlatformLocation, message_id: impl Into<String>) -> Self {
        Self {
            channel,
            message_id: message_id.into(),
        }
    }
}

/// Trait for upload backend implementations
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// Name of the backend (for logging and reports)
    fn name(&self) -> &'static str;

    /// Upload one local file
    async fn upload(&self, local_path: &Path, display_name: &str) -> Result<UploadReceipt, UploadError>;
}

/// The origin chat platform, used for direct delivery and fallback notices
#[async_trait]
pub trait DeliveryPlatform: Send + Sync {
    /// Publish the file itself; returns a link to the posted message
    async fn deliver_file(
        &self,
        destination: &PlatformLocation,
        artifact: &MediaArtifact,
        caption: &str,
    ) -> Result<String, DeliveryError>;

    /// Post a plain text notice; returns a link to the posted message
    async fn post_notice(&self, destination: &PlatformLocation, text: &str) -> Result<String, DeliveryError>;
}
