// Common data models for the archive pipeline

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ExtractionError;
use super::traits::UploadBackend;
use super::utils::{content_type_for, format_mb};

/// Opaque identifier of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short form used in temporary file names
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A place on the chat platform (channel, thread, DM)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformLocation(pub String);

impl PlatformLocation {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One request to archive a URL. Immutable once created.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub url: String,
    pub request_id: RequestId,
    pub target_destination: Option<PlatformLocation>,
}

impl RetrievalRequest {
    pub fn new(url: impl Into<String>, target_destination: Option<PlatformLocation>) -> Self {
        Self {
            url: url.into(),
            request_id: RequestId::new(),
            target_destination,
        }
    }
}

/// Position of an artifact in its run's artifact list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId(pub usize);

/// One retrieved media file, staged locally before distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaArtifact {
    pub id: ArtifactId,
    pub local_path: PathBuf,
    pub display_name: String,
    pub byte_size: u64,
    pub mime_hint: String,
}

impl MediaArtifact {
    /// Describe a file that has just been written to disk
    pub async fn from_file(id: ArtifactId, path: &Path) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self::describe(id, path, meta.len()))
    }

    pub fn describe(id: ArtifactId, path: &Path, byte_size: u64) -> Self {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "media".to_string());

        Self {
            id,
            local_path: path.to_path_buf(),
            display_name,
            byte_size,
            mime_hint: content_type_for(path).to_string(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_hint.starts_with("image/")
    }

    pub fn size_mb(&self) -> String {
        format_mb(self.byte_size)
    }
}

/// Which extraction path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMethod {
    /// Hosted extraction service
    Primary,
    /// Local extraction tool
    Fallback,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of one extraction attempt. Never merged across adapters.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub success: bool,
    pub artifacts: Vec<MediaArtifact>,
    pub error: Option<ExtractionError>,
    pub method: Option<ExtractionMethod>,
}

impl ExtractionOutcome {
    pub fn succeeded(method: ExtractionMethod, artifacts: Vec<MediaArtifact>) -> Self {
        Self {
            success: !artifacts.is_empty(),
            error: if artifacts.is_empty() {
                Some(ExtractionError::NoUsableUrl)
            } else {
                None
            },
            artifacts,
            method: Some(method),
        }
    }

    pub fn failed(method: Option<ExtractionMethod>, error: ExtractionError) -> Self {
        Self {
            success: false,
            artifacts: Vec::new(),
            error: Some(error),
            method,
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Largest artifact a backend accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeLimit {
    Bytes(u64),
    Unlimited,
}

impl SizeLimit {
    pub const fn megabytes(mb: u64) -> Self {
        Self::Bytes(mb * 1024 * 1024)
    }

    pub fn admits(&self, byte_size: u64) -> bool {
        match self {
            Self::Bytes(limit) => byte_size <= *limit,
            Self::Unlimited => true,
        }
    }
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(limit) => write!(f, "{}MB", limit / (1024 * 1024)),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Static registration of an upload backend
#[derive(Clone)]
pub struct UploadBackendDescriptor {
    pub name: String,
    pub size_limit: SizeLimit,
    /// Lower is attempted first
    pub priority: u32,
    /// Whether a link from this backend may replace direct delivery
    pub eligible_as_fallback_link: bool,
    /// Rank among preferred fallback backends (lower wins)
    pub fallback_preference: Option<u32>,
    pub backend: Arc<dyn UploadBackend>,
}

impl UploadBackendDescriptor {
    pub fn new(backend: Arc<dyn UploadBackend>, size_limit: SizeLimit, priority: u32) -> Self {
        Self {
            name: backend.name().to_string(),
            size_limit,
            priority,
            eligible_as_fallback_link: true,
            fallback_preference: None,
            backend,
        }
    }

    pub fn preferred_for_fallback(mut self, rank: u32) -> Self {
        self.fallback_preference = Some(rank);
        self
    }

    pub fn not_eligible_for_fallback(mut self) -> Self {
        self.eligible_as_fallback_link = false;
        self.fallback_preference = None;
        self
    }
}

impl fmt::Debug for UploadBackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBackendDescriptor")
            .field("name", &self.name)
            .field("size_limit", &self.size_limit)
            .field("priority", &self.priority)
            .field("eligible_as_fallback_link", &self.eligible_as_fallback_link)
            .field("fallback_preference", &self.fallback_preference)
            .finish()
    }
}

/// What a backend hands back after a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub url: String,
    pub display_url: Option<String>,
}

impl UploadReceipt {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            display_url: None,
        }
    }
}

/// Result of one (artifact, backend) pair. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub backend_name: String,
    pub artifact: ArtifactId,
    pub success: bool,
    pub url: Option<String>,
    pub display_url: Option<String>,
    pub error: Option<String>,
    pub skipped_reason: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(backend_name: &str, artifact: ArtifactId, receipt: UploadReceipt) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            artifact,
            success: true,
            url: Some(receipt.url),
            display_url: receipt.display_url,
            error: None,
            skipped_reason: None,
        }
    }

    pub fn failed(backend_name: &str, artifact: ArtifactId, error: impl ToString) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            artifact,
            success: false,
            url: None,
            display_url: None,
            error: Some(error.to_string()),
            skipped_reason: None,
        }
    }

    pub fn skipped(backend_name: &str, artifact: ArtifactId, reason: impl Into<String>) -> Self {
        Self {
            backend_name: backend_name.to_string(),
            artifact,
            success: false,
            url: None,
            display_url: None,
            error: None,
            skipped_reason: Some(reason.into()),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped_reason.is_some()
    }

    /// Link to show humans: display URL if the backend gave one
    pub fn shown_url(&self) -> Option<&str> {
        self.display_url.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMethod {
    Direct,
    FallbackLink,
    None,
}

/// Terminal delivery state of one artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub artifact: ArtifactId,
    pub method: DeliveryMethod,
    pub url: Option<String>,
    pub backend_used: Option<String>,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn direct(artifact: ArtifactId, url: String) -> Self {
        Self {
            artifact,
            method: DeliveryMethod::Direct,
            url: Some(url),
            backend_used: None,
            error: None,
        }
    }

    pub fn fallback_link(artifact: ArtifactId, url: String, backend: &str, direct_error: String) -> Self {
        Self {
            artifact,
            method: DeliveryMethod::FallbackLink,
            url: Some(url),
            backend_used: Some(backend.to_string()),
            error: Some(direct_error),
        }
    }

    pub fn none(artifact: ArtifactId, error: String) -> Self {
        Self {
            artifact,
            method: DeliveryMethod::None,
            url: None,
            backend_used: None,
            error: Some(error),
        }
    }

    pub fn delivered(&self) -> bool {
        self.method != DeliveryMethod::None
    }
}

/// Colour class of a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warn,
    Success,
    Error,
}

/// Human-readable status update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

impl ProgressEvent {
    pub fn new(title: impl Into<String>, body: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            severity,
        }
    }

    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body, Severity::Info)
    }

    pub fn warn(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(title, body, Severity::Warn)
    }
}
