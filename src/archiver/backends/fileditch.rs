use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;
use serde_json::Value;

use super::{ensure_success, file_part};
use crate::archiver::errors::UploadError;
use crate::archiver::models::UploadReceipt;
use crate::archiver::traits::UploadBackend;

const FILEDITCH_API: &str = "https://up1.fileditch.com/upload.php";

pub struct FileditchBackend {
    client: Client,
}

impl FileditchBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Pomf-style answer: `{"success": true, "files": [{"url": ...}]}`
pub fn parse_response(data: &Value) -> Result<UploadReceipt, UploadError> {
    let url = data["files"][0]["url"].as_str().filter(|u| !u.is_empty());
    match (data["success"].as_bool(), url) {
        (Some(true), Some(url)) => Ok(UploadReceipt::new(url)),
        _ => {
            let detail = data["files"][0]["error"]
                .as_str()
                .or_else(|| data["error"].as_str())
                .unwrap_or("upload failed or returned an invalid response format");
            Err(UploadError::InvalidResponse {
                backend: "Fileditch",
                detail: detail.to_string(),
            })
        }
    }
}

#[async_trait]
impl UploadBackend for FileditchBackend {
    fn name(&self) -> &'static str {
        "Fileditch"
    }

    async fn upload(&self, local_path: &Path, display_name: &str) -> Result<UploadReceipt, UploadError> {
        let form = Form::new().part("files[]", file_part(local_path, display_name).await?);

        let response = self.client.post(FILEDITCH_API).multipart(form).send().await?;
        let response = ensure_success(self.name(), response).await?;
        let data: Value = response.json().await.map_err(|e| UploadError::InvalidResponse {
            backend: "Fileditch",
            detail: e.to_string(),
        })?;
        parse_response(&data)
    }
}
