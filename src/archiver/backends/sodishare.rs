use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::run_curl;
use crate::archiver::errors::UploadError;
use crate::archiver::models::UploadReceipt;
use crate::archiver::traits::UploadBackend;

const SODISHARE_API: &str = "https://sodishare.zsh.one/upload";

pub struct SodiShareBackend {
    curl: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SodiShareResponse {
    #[serde(default)]
    success: bool,
    url: Option<String>,
}

impl SodiShareBackend {
    pub fn new(curl: String, timeout: Duration) -> Self {
        Self { curl, timeout }
    }

    fn args(&self, local_path: &Path) -> Vec<String> {
        vec![
            "-sS".to_string(),
            "--max-time".to_string(),
            self.timeout.as_secs().to_string(),
            "-F".to_string(),
            format!("file=@{}", local_path.display()),
            SODISHARE_API.to_string(),
        ]
    }
}

pub fn parse_output(stdout: &str) -> Result<UploadReceipt, UploadError> {
    let raw = stdout.trim();
    if raw.is_empty() {
        return Err(UploadError::InvalidResponse {
            backend: "SodiShare",
            detail: "empty response".to_string(),
        });
    }

    let data: SodiShareResponse = serde_json::from_str(raw).map_err(|_| UploadError::InvalidResponse {
        backend: "SodiShare",
        detail: raw.chars().take(200).collect(),
    })?;

    match data.url {
        Some(url) if data.success && (url.starts_with("http://") || url.starts_with("https://")) => {
            Ok(UploadReceipt::new(url))
        }
        url => Err(UploadError::InvalidResponse {
            backend: "SodiShare",
            detail: format!("invalid or missing URL: {}", url.unwrap_or_else(|| "N/A".to_string())),
        }),
    }
}

#[async_trait]
impl UploadBackend for SodiShareBackend {
    fn name(&self) -> &'static str {
        "SodiShare"
    }

    async fn upload(&self, local_path: &Path, _display_name: &str) -> Result<UploadReceipt, UploadError> {
        let stdout = run_curl(&self.curl, self.args(local_path), self.timeout).await?;
        parse_output(&stdout)
    }
}
