// Read-only configuration snapshot injected into each run

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;
use super::models::PlatformLocation;
use super::progress::ThrottleProfile;

pub const DEFAULT_COBALT_ENDPOINT: &str = "http://c.everypizza.im";

pub const DEFAULT_SUPPORTED_SITES: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "facebook.com",
    "reddit.com",
    "soundcloud.com",
    "spotify.com",
    "pinterest.com",
    "tumblr.com",
];

pub const DEFAULT_COLLECTION_PATTERNS: &[&str] = &["instagram.com/p/", "instagram.com/reel/"];

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Hosted extraction service endpoint
    pub cobalt_endpoint: String,
    /// Domains the hosted service can resolve
    pub supported_sites: Vec<String>,
    /// URL fragments that mark a multi-item collection
    pub collection_patterns: Vec<String>,
    /// Shared directory for temporary artifacts
    pub temp_dir: PathBuf,
    /// Explicit yt-dlp binary (auto-detected when absent)
    pub ytdlp_path: Option<String>,
    /// cookies.txt handed to yt-dlp
    pub cookies_path: Option<String>,
    pub resolve_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub upload_timeout_secs: u64,
    pub delivery_timeout_secs: u64,
    pub hosted_throttle: ThrottleProfile,
    pub tool_throttle: ThrottleProfile,
    /// Origin channel -> archive channel for command triggers
    pub channel_mappings: HashMap<String, String>,
    /// Watched channel -> archive channel for automatic triggers
    pub watch_mappings: HashMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cobalt_endpoint: DEFAULT_COBALT_ENDPOINT.to_string(),
            supported_sites: DEFAULT_SUPPORTED_SITES.iter().map(|s| s.to_string()).collect(),
            collection_patterns: DEFAULT_COLLECTION_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            temp_dir: default_temp_dir(),
            ytdlp_path: None,
            cookies_path: None,
            resolve_timeout_secs: 30,
            transfer_timeout_secs: 1800,
            tool_timeout_secs: 1800,
            upload_timeout_secs: 900,
            delivery_timeout_secs: 300,
            hosted_throttle: ThrottleProfile::hosted(),
            tool_throttle: ThrottleProfile::tool(),
            channel_mappings: HashMap::new(),
            watch_mappings: HashMap::new(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("media-archiver").join("temp"))
        .unwrap_or_else(|| std::env::temp_dir().join("media-archiver"))
}

impl PipelineConfig {
    /// Read a JSON config file; a missing file yields the defaults
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!("[Config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_cobalt_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.cobalt_endpoint = endpoint.into();
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<String>) -> Self {
        self.cookies_path = path;
        self
    }

    pub fn with_channel_mapping(mut self, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        self.channel_mappings.insert(origin.into(), destination.into());
        self
    }

    pub fn with_watch_mapping(mut self, origin: impl Into<String>, destination: impl Into<String>) -> Self {
        self.watch_mappings.insert(origin.into(), destination.into());
        self
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    /// Destination for a run: explicit first, then the routing tables
    pub fn route(&self, origin: &PlatformLocation, explicit: Option<&PlatformLocation>) -> Option<PlatformLocation> {
        if let Some(dest) = explicit {
            return Some(dest.clone());
        }
        self.channel_mappings
            .get(origin.as_str())
            .or_else(|| self.watch_mappings.get(origin.as_str()))
            .map(|id| PlatformLocation::new(id.clone()))
    }
}
