// Upload fan-out: every artifact goes to every backend that admits its size
//
// One backend failing (error, timeout or panic) never aborts the others.
// Outcomes come back flat, ordered by (artifact, backend priority).

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;

use super::errors::UploadError;
use super::models::{MediaArtifact, ProgressEvent, UploadBackendDescriptor, UploadOutcome};
use super::progress::ProgressReporter;

const STATUS_TITLE: &str = "📤 Uploading";

/// Row state in the per-artifact status matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendState {
    Pending,
    Uploading,
    Succeeded(String),
    Failed(String),
    Skipped(String),
}

impl BackendState {
    fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "⏳",
            Self::Uploading => "🔄",
            Self::Succeeded(_) => "✅",
            Self::Failed(_) => "❌",
            Self::Skipped(_) => "⏩",
        }
    }

    fn from_outcome(outcome: &UploadOutcome) -> Self {
        if let Some(reason) = &outcome.skipped_reason {
            Self::Skipped(reason.clone())
        } else if outcome.success {
            Self::Succeeded(outcome.shown_url().unwrap_or_default().to_string())
        } else {
            Self::Failed(outcome.error.clone().unwrap_or_default())
        }
    }
}

/// Status text listing every backend for one artifact
pub fn render_matrix(
    artifact: &MediaArtifact,
    label: &str,
    rows: &[(String, BackendState)],
) -> String {
    let mut body = format!(
        "{}{} ({} MB)\n",
        artifact.display_name,
        label,
        artifact.size_mb()
    );
    for (name, state) in rows {
        let detail = match state {
            BackendState::Pending => "waiting".to_string(),
            BackendState::Uploading => "uploading...".to_string(),
            BackendState::Succeeded(url) => url.clone(),
            BackendState::Failed(error) => format!("failed: {}", error),
            BackendState::Skipped(reason) => format!("skipped ({})", reason),
        };
        body.push_str(&format!("\n{} {}: {}", state.marker(), name, detail));
    }
    body
}

pub struct UploadFanout {
    upload_timeout: Duration,
}

impl UploadFanout {
    pub fn new(upload_timeout: Duration) -> Self {
        Self { upload_timeout }
    }

    /// Backends in attempt order; equal priorities keep registration order
    pub fn ordered(backends: &[UploadBackendDescriptor]) -> Vec<&UploadBackendDescriptor> {
        let mut ordered: Vec<&UploadBackendDescriptor> = backends.iter().collect();
        ordered.sort_by_key(|b| b.priority);
        ordered
    }

    pub async fn distribute(
        &self,
        artifacts: &[MediaArtifact],
        backends: &[UploadBackendDescriptor],
        reporter: &ProgressReporter,
    ) -> Vec<UploadOutcome> {
        let ordered = Self::ordered(backends);
        let mut outcomes = Vec::with_capacity(artifacts.len() * ordered.len());

        for artifact in artifacts {
            let label = if artifacts.len() > 1 {
                format!(" [{}/{}]", artifact.id.0 + 1, artifacts.len())
            } else {
                String::new()
            };
            let mut rows: Vec<(String, BackendState)> = ordered
                .iter()
                .map(|b| (b.name.clone(), BackendState::Pending))
                .collect();

            for (index, descriptor) in ordered.iter().enumerate() {
                let outcome = if !descriptor.size_limit.admits(artifact.byte_size) {
                    tracing::info!(
                        "[Fanout] {} skipped for {} ({} MB > {})",
                        descriptor.name,
                        artifact.display_name,
                        artifact.size_mb(),
                        descriptor.size_limit
                    );
                    UploadOutcome::skipped(
                        &descriptor.name,
                        artifact.id,
                        format!("limit: {}", descriptor.size_limit),
                    )
                } else {
                    rows[index].1 = BackendState::Uploading;
                    reporter.report(ProgressEvent::info(
                        STATUS_TITLE,
                        render_matrix(artifact, &label, &rows),
                    ));
                    self.attempt(descriptor, artifact).await
                };

                rows[index].1 = BackendState::from_outcome(&outcome);
                reporter.report(ProgressEvent::info(
                    STATUS_TITLE,
                    render_matrix(artifact, &label, &rows),
                ));
                outcomes.push(outcome);
            }
        }

        outcomes
    }

    async fn attempt(&self, descriptor: &UploadBackendDescriptor, artifact: &MediaArtifact) -> UploadOutcome {
        tracing::info!("[Fanout] uploading {} to {}", artifact.display_name, descriptor.name);

        let upload = descriptor
            .backend
            .upload(&artifact.local_path, &artifact.display_name);
        let guarded = AssertUnwindSafe(upload).catch_unwind();

        let result = match tokio::time::timeout(self.upload_timeout, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(UploadError::Transport("backend panicked".to_string())),
            Err(_) => Err(UploadError::Timeout(self.upload_timeout)),
        };

        match result {
            Ok(receipt) => {
                tracing::info!("[Fanout] {} -> {}", descriptor.name, receipt.url);
                UploadOutcome::succeeded(&descriptor.name, artifact.id, receipt)
            }
            Err(e) => {
                tracing::warn!("[Fanout] {} failed for {}: {}", descriptor.name, artifact.display_name, e);
                UploadOutcome::failed(&descriptor.name, artifact.id, e)
            }
        }
    }
}
