// Upload backends
//
// Priority order (lower first): Catbox, Filebin, Pomf, Fileditch, SodiShare.
// Catbox and Filebin are the preferred stand-ins when direct delivery
// fails; Fileditch links are never used as a stand-in.

pub mod catbox;
pub mod fileditch;
pub mod filebin;
pub mod pomf;
pub mod sodishare;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::Part;
use reqwest::{Body, Client, Response};

pub use catbox::CatboxBackend;
pub use fileditch::FileditchBackend;
pub use filebin::FilebinBackend;
pub use pomf::PomfBackend;
pub use sodishare::SodiShareBackend;

use crate::archiver::config::PipelineConfig;
use crate::archiver::errors::UploadError;
use crate::archiver::models::{SizeLimit, UploadBackendDescriptor};
use crate::archiver::tools::{ToolManager, ToolType};
use crate::archiver::utils::{content_type_for, run_output_with_timeout};

/// The standard backend registry
pub fn default_backends(client: Client, config: &PipelineConfig) -> Vec<UploadBackendDescriptor> {
    let curl = ToolManager::new().binary(ToolType::Curl);
    let timeout = config.upload_timeout();

    vec![
        UploadBackendDescriptor::new(
            Arc::new(CatboxBackend::new(client.clone())),
            SizeLimit::megabytes(200),
            0,
        )
        .preferred_for_fallback(0),
        UploadBackendDescriptor::new(
            Arc::new(FilebinBackend::new(client.clone())),
            SizeLimit::megabytes(20_000),
            1,
        )
        .preferred_for_fallback(1),
        UploadBackendDescriptor::new(
            Arc::new(PomfBackend::new(curl.clone(), timeout)),
            SizeLimit::megabytes(200),
            2,
        ),
        UploadBackendDescriptor::new(
            Arc::new(FileditchBackend::new(client)),
            SizeLimit::megabytes(5_000),
            3,
        )
        .not_eligible_for_fallback(),
        UploadBackendDescriptor::new(
            Arc::new(SodiShareBackend::new(curl, timeout)),
            SizeLimit::Unlimited,
            4,
        ),
    ]
}

/// Streamed multipart part for a local file
pub(crate) async fn file_part(path: &Path, display_name: &str) -> Result<Part, UploadError> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    let part = Part::stream_with_length(Body::from(file), length)
        .file_name(display_name.to_string())
        .mime_str(content_type_for(path))?;
    Ok(part)
}

/// Turn a non-2xx response into an error carrying the body text
pub(crate) async fn ensure_success(backend: &'static str, response: Response) -> Result<Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(UploadError::HttpStatus {
        backend,
        status: status.as_u16(),
        body: body.trim().chars().take(300).collect(),
    })
}

/// Run curl and return its stdout
pub(crate) async fn run_curl(curl: &str, args: Vec<String>, limit: Duration) -> Result<String, UploadError> {
    let output = run_output_with_timeout(curl, args, limit)
        .await
        .map_err(UploadError::Tool)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(UploadError::Tool(format!(
            "curl exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        tracing::debug!("[Upload] curl stderr: {}", stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_shape() {
        let backends = default_backends(Client::new(), &PipelineConfig::default());
        let names: Vec<&str> = backends.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Catbox", "Filebin", "Pomf", "Fileditch", "SodiShare"]);

        let priorities: Vec<u32> = backends.iter().map(|b| b.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2, 3, 4]);

        assert_eq!(backends[0].fallback_preference, Some(0));
        assert_eq!(backends[1].fallback_preference, Some(1));
        assert!(!backends[3].eligible_as_fallback_link);
        assert!(backends[2].eligible_as_fallback_link);
        assert_eq!(backends[4].size_limit, SizeLimit::Unlimited);
        assert_eq!(backends[1].size_limit.to_string(), "20000MB");
    }

    #[tokio::test]
    async fn test_file_part_missing_file() {
        let result = file_part(Path::new("/definitely/not/here.mp4"), "here.mp4").await;
        assert!(matches!(result, Err(UploadError::Io(_))));
    }
}
