use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use serde_json::Value;

use super::{ensure_success, file_part};
use crate::archiver::errors::UploadError;
use crate::archiver::models::UploadReceipt;
use crate::archiver::traits::UploadBackend;
use crate::archiver::utils::content_type_for;

const FILEBIN_API: &str = "https://fileb.in/api/upload";

pub struct FilebinBackend {
    client: Client,
}

impl FilebinBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Pull the file URL out of whichever shape the service answered with.
/// Images are sometimes served under an `.mp4` name; the display URL says so.
pub fn parse_response(data: &Value, local_path: &Path) -> Result<UploadReceipt, UploadError> {
    let url = data["file"]["url"]
        .as_str()
        .or_else(|| data["url"].as_str())
        .or_else(|| data["files"][0]["url"].as_str())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| UploadError::InvalidResponse {
            backend: "Filebin",
            detail: "URL not found".to_string(),
        })?;

    let mut receipt = UploadReceipt::new(url);
    let is_image = content_type_for(local_path).starts_with("image/");
    if is_image && url.to_lowercase().ends_with(".mp4") {
        let ext = local_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        receipt.display_url = Some(format!("{} (actually a .{} file)", url, ext));
    }
    Ok(receipt)
}

#[async_trait]
impl UploadBackend for FilebinBackend {
    fn name(&self) -> &'static str {
        "Filebin"
    }

    async fn upload(&self, local_path: &Path, display_name: &str) -> Result<UploadReceipt, UploadError> {
        let form = Form::new().part("file", file_part(local_path, display_name).await?);

        let response = self.client.post(FILEBIN_API).multipart(form).send().await?;
        let response = ensure_success(self.name(), response).await?;
        let data: Value = response.json().await.map_err(|e| UploadError::InvalidResponse {
            backend: "Filebin",
            detail: e.to_string(),
        })?;
        parse_response(&data, local_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_locations() {
        let clip = Path::new("/tmp/clip.mp4");
        for data in [
            json!({"file": {"url": "https://fileb.in/a/clip.mp4"}}),
            json!({"url": "https://fileb.in/a/clip.mp4"}),
            json!({"files": [{"url": "https://fileb.in/a/clip.mp4"}]}),
        ] {
            let receipt = parse_response(&data, clip).unwrap();
            assert_eq!(receipt.url, "https://fileb.in/a/clip.mp4");
            assert_eq!(receipt.display_url, None);
        }
    }

    #[test]
    fn test_missing_url() {
        assert!(parse_response(&json!({"status": "ok"}), Path::new("/tmp/a.mp4")).is_err());
    }

    #[test]
    fn test_image_served_as_mp4_note() {
        let receipt = parse_response(
            &json!({"url": "https://fileb.in/a/photo.MP4"}),
            Path::new("/tmp/photo.jpg"),
        )
        .unwrap();
        assert_eq!(
            receipt.display_url.as_deref(),
            Some("https://fileb.in/a/photo.MP4 (actually a .jpg file)")
        );
    }
}
