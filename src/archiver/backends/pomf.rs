use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::run_curl;
use crate::archiver::errors::UploadError;
use crate::archiver::models::UploadReceipt;
use crate::archiver::traits::UploadBackend;

const POMF_API: &str = "https://pomf.fileb.in/upload.php";

/// Uploads through curl; the service rejects some multipart encoders
pub struct PomfBackend {
    curl: String,
    timeout: Duration,
}

impl PomfBackend {
    pub fn new(curl: String, timeout: Duration) -> Self {
        Self { curl, timeout }
    }

    fn args(&self, local_path: &Path) -> Vec<String> {
        vec![
            "-sS".to_string(),
            "-i".to_string(),
            "--max-time".to_string(),
            self.timeout.as_secs().to_string(),
            "-F".to_string(),
            format!("files[]=@{}", local_path.display()),
            POMF_API.to_string(),
        ]
    }
}

/// `curl -i` output: headers first, JSON from the first `{`
pub fn parse_output(stdout: &str) -> Result<UploadReceipt, UploadError> {
    let start = stdout.find('{').ok_or_else(|| UploadError::InvalidResponse {
        backend: "Pomf",
        detail: "no JSON in response".to_string(),
    })?;
    let data: Value = serde_json::from_str(stdout[start..].trim()).map_err(|e| UploadError::InvalidResponse {
        backend: "Pomf",
        detail: e.to_string(),
    })?;

    let url = data["files"][0]["url"].as_str().filter(|u| !u.is_empty());
    match (data["success"].as_bool(), url) {
        (Some(true), Some(url)) => Ok(UploadReceipt::new(url)),
        _ => {
            let detail = data["description"]
                .as_str()
                .or_else(|| data["error"]["message"].as_str())
                .unwrap_or("unknown error from Pomf API");
            Err(UploadError::InvalidResponse {
                backend: "Pomf",
                detail: detail.to_string(),
            })
        }
    }
}

#[async_trait]
impl UploadBackend for PomfBackend {
    fn name(&self) -> &'static str {
        "Pomf"
    }

    async fn upload(&self, local_path: &Path, _display_name: &str) -> Result<UploadReceipt, UploadError> {
        let stdout = run_curl(&self.curl, self.args(local_path), self.timeout).await?;
        parse_output(&stdout)
    }
}
