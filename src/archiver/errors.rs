// Error types for the retrieval and distribution pipeline

use std::time::Duration;

use thiserror::Error;

/// Failure of one extraction attempt (hosted service or local tool).
///
/// This is the only error class allowed to end a run early, and only when
/// no artifact was recovered at all.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The hosted service answered with an explicit error status
    #[error("extraction service error: {code}{}", .text.as_deref().map(|t| format!(" ({})", t)).unwrap_or_default())]
    Service { code: String, text: Option<String> },

    /// Resolution succeeded but carried no URL we can fetch
    #[error("extraction service returned no usable URL")]
    NoUsableUrl,

    /// The hosted service answered with a status we do not understand
    #[error("unexpected extraction status: {0}")]
    UnexpectedStatus(String),

    /// Transport-level failure while talking to the network
    #[error("transport error: {0}")]
    Transport(String),

    /// Local file handling failed
    #[error("I/O error: {0}")]
    Io(String),

    /// The local extraction tool could not be started
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The local extraction tool exited unsuccessfully
    #[error("{tool} exited with {status}: {detail}")]
    ToolExit {
        tool: String,
        status: String,
        detail: String,
    },

    /// The tool exited cleanly but its output file could not be located
    #[error("{0}: could not find output file")]
    OutputNotFound(String),

    /// A collection resolved but every item failed to download
    #[error("no collection item could be downloaded")]
    EmptyCollection,

    /// No extraction path was planned for the URL
    #[error("no extraction method available for this URL")]
    NotAttempted,

    /// The call exceeded its time budget
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Transport(format!("request timed out: {}", e));
        }
        Self::Transport(e.to_string())
    }
}

impl From<std::io::Error> for ExtractionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Failure of a single upload backend. Always recovered into an
/// `UploadOutcome`, never propagated past the fan-out.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    #[error("{backend} request failed: {status} - {body}")]
    HttpStatus {
        backend: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid {backend} response: {detail}")]
    InvalidResponse {
        backend: &'static str,
        detail: String,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("upload tool failed: {0}")]
    Tool(String),

    #[error("upload timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Failure to publish on the origin platform.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("no delivery destination configured")]
    NoDestination,

    #[error("destination unavailable: {0}")]
    DestinationUnavailable(String),

    #[error("platform rejected the upload: {0}")]
    Rejected(String),

    #[error("delivery timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Failure of the status sink. Always swallowed after logging.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// The status message or its channel no longer exists
    #[error("status target no longer exists")]
    TargetGone,

    #[error("status update failed: {0}")]
    Other(String),
}

/// Configuration file could not be read or parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractionError {
    /// Build an exit error from the tail of the tool's output.
    pub fn tool_exit(tool: &str, status: impl ToString, output: &str) -> Self {
        let detail = output
            .lines()
            .rev()
            .find(|l| l.contains("ERROR"))
            .or_else(|| output.lines().rev().find(|l| !l.trim().is_empty()))
            .unwrap_or("no output")
            .trim()
            .to_string();

        Self::ToolExit {
            tool: tool.to_string(),
            status: status.to_string(),
            detail,
        }
    }
}
