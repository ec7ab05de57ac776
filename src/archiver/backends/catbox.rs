use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::Form;
use reqwest::Client;

use super::{ensure_success, file_part};
use crate::archiver::errors::UploadError;
use crate::archiver::models::UploadReceipt;
use crate::archiver::traits::UploadBackend;

const CATBOX_API: &str = "https://catbox.moe/user/api.php";

pub struct CatboxBackend {
    client: Client,
}

impl CatboxBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Catbox answers with the bare file URL as plain text
pub fn parse_response(body: &str) -> Result<UploadReceipt, UploadError> {
    let url = body.trim();
    if url.starts_with("https://catbox.moe/") || url.starts_with("https://files.catbox.moe/") {
        Ok(UploadReceipt::new(url))
    } else {
        Err(UploadError::InvalidResponse {
            backend: "Catbox",
            detail: url.chars().take(200).collect(),
        })
    }
}

#[async_trait]
impl UploadBackend for CatboxBackend {
    fn name(&self) -> &'static str {
        "Catbox"
    }

    async fn upload(&self, local_path: &Path, display_name: &str) -> Result<UploadReceipt, UploadError> {
        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", file_part(local_path, display_name).await?);

        let response = self.client.post(CATBOX_API).multipart(form).send().await?;
        let response = ensure_success(self.name(), response).await?;
        parse_response(&response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_catbox_urls() {
        assert_eq!(
            parse_response("https://files.catbox.moe/abc123.mp4\n").unwrap().url,
            "https://files.catbox.moe/abc123.mp4"
        );
        assert!(parse_response("https://catbox.moe/c/xyz").is_ok());
    }

    #[test]
    fn test_rejects_other_text() {
        let err = parse_response("File too large").unwrap_err();
        assert!(err.to_string().contains("File too large"));
        assert!(parse_response("http://files.catbox.moe/abc.mp4").is_err());
    }
}
