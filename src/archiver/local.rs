// Local stand-ins for the chat platform, used by the command-line binary

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::errors::{DeliveryError, SinkError};
use super::models::{MediaArtifact, PlatformLocation, Severity};
use super::traits::{DeliveryPlatform, StatusLocation, StatusSink};

/// Prints status updates to stdout
#[derive(Debug, Default)]
pub struct ConsoleStatusSink;

#[async_trait]
impl StatusSink for ConsoleStatusSink {
    async fn update_status(
        &self,
        _location: &StatusLocation,
        title: &str,
        body: &str,
        severity: Severity,
    ) -> Result<(), SinkError> {
        let tag = match severity {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Success => "done",
            Severity::Error => "error",
        };
        println!("[{}] {}\n{}\n", tag, title, body);
        Ok(())
    }
}

/// Delivers files by copying them into `<root>/<destination>/`
#[derive(Debug, Clone)]
pub struct LocalDirectoryPlatform {
    root: PathBuf,
}

impl LocalDirectoryPlatform {
    pub const NOTICE_FILE: &'static str = "notices.txt";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn folder(&self, destination: &PlatformLocation) -> Result<PathBuf, DeliveryError> {
        let dir = self.root.join(destination.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| DeliveryError::DestinationUnavailable(format!("{}: {}", dir.display(), e)))?;
        Ok(dir)
    }
}

#[async_trait]
impl DeliveryPlatform for LocalDirectoryPlatform {
    async fn deliver_file(
        &self,
        destination: &PlatformLocation,
        artifact: &MediaArtifact,
        caption: &str,
    ) -> Result<String, DeliveryError> {
        let target = self.folder(destination).await?.join(&artifact.display_name);
        tokio::fs::copy(&artifact.local_path, &target)
            .await
            .map_err(|e| DeliveryError::Rejected(format!("{}: {}", target.display(), e)))?;
        tracing::debug!("[Delivery] copied {} ({})", target.display(), caption);
        Ok(target.display().to_string())
    }

    async fn post_notice(&self, destination: &PlatformLocation, text: &str) -> Result<String, DeliveryError> {
        let path = self.folder(destination).await?.join(Self::NOTICE_FILE);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| DeliveryError::DestinationUnavailable(e.to_string()))?;
        file.write_all(format!("{}\n\n", text).as_bytes())
            .await
            .map_err(|e| DeliveryError::DestinationUnavailable(e.to_string()))?;
        Ok(path.display().to_string())
    }
}
