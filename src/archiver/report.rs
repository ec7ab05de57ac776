// Final run report and its rendering as the closing status update

use super::models::{
    DeliveryMethod, DeliveryOutcome, ExtractionMethod, MediaArtifact, ProgressEvent, RequestId, Severity,
    UploadOutcome,
};

const IMAGE_NOTE: &str = "Note: some services (e.g. Filebin) may show images with an .mp4 extension, \
but they are image files. Rename them after downloading if needed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    /// No artifact could be retrieved
    NothingDownloaded,
    /// Artifacts exist but no upload or delivery succeeded
    NothingStored,
    /// Some uploads or deliveries failed
    PartialSuccess,
    /// Every artifact delivered directly and no upload failed
    Complete,
}

#[derive(Debug, Clone)]
pub struct ArchiveReport {
    pub request_id: RequestId,
    pub url: String,
    pub source_link: Option<String>,
    pub method: Option<ExtractionMethod>,
    pub extraction_error: Option<String>,
    pub artifacts: Vec<MediaArtifact>,
    pub uploads: Vec<UploadOutcome>,
    pub deliveries: Vec<DeliveryOutcome>,
}

impl ArchiveReport {
    pub fn status(&self) -> ReportStatus {
        if self.artifacts.is_empty() {
            return ReportStatus::NothingDownloaded;
        }

        let any_stored =
            self.uploads.iter().any(|u| u.success) || self.deliveries.iter().any(DeliveryOutcome::delivered);
        if !any_stored {
            return ReportStatus::NothingStored;
        }

        let all_direct = self.artifacts.iter().all(|a| {
            self.deliveries
                .iter()
                .any(|d| d.artifact == a.id && d.method == DeliveryMethod::Direct)
        });
        let upload_failed = self.uploads.iter().any(|u| !u.success && !u.is_skipped());
        if all_direct && !upload_failed {
            ReportStatus::Complete
        } else {
            ReportStatus::PartialSuccess
        }
    }

    pub fn delivery_for(&self, artifact: &MediaArtifact) -> Option<&DeliveryOutcome> {
        self.deliveries.iter().find(|d| d.artifact == artifact.id)
    }

    pub fn render(&self) -> ProgressEvent {
        match self.status() {
            ReportStatus::NothingDownloaded => ProgressEvent::new(
                "❌ Error",
                format!(
                    "Could not download the media: {}",
                    self.extraction_error.as_deref().unwrap_or("unknown error")
                ),
                Severity::Error,
            ),
            ReportStatus::NothingStored => ProgressEvent::new(
                "❌ Archiving failed",
                format!(
                    "Could not store the media anywhere.\nOriginal media URL: {}\n{}",
                    self.url,
                    self.failure_section()
                ),
                Severity::Error,
            ),
            ReportStatus::PartialSuccess => {
                ProgressEvent::new("⚠️ Media partially archived", self.success_body(true), Severity::Warn)
            }
            ReportStatus::Complete => {
                ProgressEvent::new("✅ Media archived", self.success_body(false), Severity::Success)
            }
        }
    }

    fn success_body(&self, with_failures: bool) -> String {
        let mut body = format!("Original media URL: {}\n", self.url);
        if let Some(link) = &self.source_link {
            body.push_str(&format!("Source message: {}\n", link));
        }
        body.push_str("\nArchived copies:\n");
        if self.artifacts.iter().any(MediaArtifact::is_image) {
            body.push_str(&format!("\n{}\n", IMAGE_NOTE));
        }

        let multi = self.artifacts.len() > 1;
        for (index, artifact) in self.artifacts.iter().enumerate() {
            if multi {
                body.push_str(&format!(
                    "\nFile {}/{}: {}\n",
                    index + 1,
                    self.artifacts.len(),
                    artifact.display_name
                ));
            }
            let links: Vec<String> = self
                .uploads
                .iter()
                .filter(|u| u.artifact == artifact.id && u.success)
                .filter_map(|u| u.shown_url().map(|url| format!("{}: {}", u.backend_name, url)))
                .collect();
            if links.is_empty() {
                body.push_str("Could not upload this file to any external service.\n");
            } else {
                body.push_str(&links.join("\n"));
                body.push('\n');
            }
            if let Some(delivery) = self.delivery_for(artifact) {
                match (delivery.method, delivery.url.as_deref()) {
                    (DeliveryMethod::Direct, Some(url)) => body.push_str(&format!("Delivered: {}\n", url)),
                    (DeliveryMethod::FallbackLink, Some(url)) => body.push_str(&format!(
                        "Delivered as link ({}): {}\n",
                        delivery.backend_used.as_deref().unwrap_or("unknown"),
                        url
                    )),
                    _ => {}
                }
            }
        }

        if with_failures {
            let failures = self.failure_lines();
            if !failures.is_empty() {
                body.push_str("\nProblems:\n");
                body.push_str(&failures.join("\n"));
                body.push('\n');
            }
        }

        body.push_str("\nDone!");
        body
    }

    /// Every backend error and skip, grouped per artifact
    fn failure_section(&self) -> String {
        let mut section = String::from("\nErrors:");
        let multi = self.artifacts.len() > 1;
        for (index, artifact) in self.artifacts.iter().enumerate() {
            if multi {
                section.push_str(&format!("\nFile {}/{}: {}", index + 1, self.artifacts.len(), artifact.display_name));
            }
            for upload in self.uploads.iter().filter(|u| u.artifact == artifact.id) {
                let reason = upload
                    .skipped_reason
                    .as_ref()
                    .map(|r| format!("skipped ({})", r))
                    .or_else(|| upload.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                section.push_str(&format!("\n{}: {}", upload.backend_name, reason));
            }
            if let Some(error) = self.delivery_for(artifact).and_then(|d| d.error.as_deref()) {
                section.push_str(&format!("\nDelivery: {}", error));
            }
        }
        section
    }

    fn failure_lines(&self) -> Vec<String> {
        let multi = self.artifacts.len() > 1;
        let label = |artifact_id: usize| {
            if multi {
                format!(" [{}/{}]", artifact_id + 1, self.artifacts.len())
            } else {
                String::new()
            }
        };

        let mut lines: Vec<String> = self
            .uploads
            .iter()
            .filter(|u| !u.success && !u.is_skipped())
            .map(|u| {
                format!(
                    "{}{}: {}",
                    u.backend_name,
                    label(u.artifact.0),
                    u.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();
        lines.extend(
            self.deliveries
                .iter()
                .filter(|d| d.method != DeliveryMethod::Direct)
                .filter_map(|d| {
                    d.error
                        .as_ref()
                        .map(|e| format!("Direct delivery{}: {}", label(d.artifact.0), e))
                }),
        );
        lines
    }
}
