// Pipeline orchestrator: retrieve -> fan out -> deliver -> report -> clean up
//
// Runs are independent: each owns its request id, temp file names, progress
// reporter and throttle state. The pipeline itself is shared read-only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;

use super::backends::default_backends;
use super::config::PipelineConfig;
use super::delivery::{DeliveryCaption, DeliveryFinalizer};
use super::errors::ExtractionError;
use super::extractors::{
    CobaltExtractor, ExtractionContext, FallbackExtractor, PrimaryExtractor, RetrievalCoordinator, StrategySelector,
    YtDlpExtractor,
};
use super::fanout::UploadFanout;
use super::models::{MediaArtifact, RetrievalRequest, UploadBackendDescriptor};
use super::progress::ProgressReporter;
use super::report::ArchiveReport;
use super::trigger::TriggerContext;
use super::traits::DeliveryPlatform;
use super::utils::timestamp_millis;

/// Removes everything a run staged in the temp dir, whatever happened.
///
/// Covers the artifacts handed back by retrieval plus any file carrying the
/// run's `<stamp>-<request>` marker, so downloads still in flight when the
/// run is dropped are removed too.
struct ArtifactCleanup {
    dir: PathBuf,
    marker: String,
    paths: Vec<PathBuf>,
    armed: bool,
}

impl ArtifactCleanup {
    fn new(dir: &Path, marker: String) -> Self {
        Self {
            dir: dir.to_path_buf(),
            marker,
            paths: Vec::new(),
            armed: true,
        }
    }

    fn track(&mut self, artifacts: &[MediaArtifact]) {
        self.paths.extend(artifacts.iter().map(|a| a.local_path.clone()));
    }

    fn is_ours(&self, name: &str) -> bool {
        name.contains(&self.marker)
    }

    async fn run(mut self) {
        self.armed = false;
        let mut targets = std::mem::take(&mut self.paths);
        if let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if self.is_ours(&entry.file_name().to_string_lossy()) {
                    targets.push(entry.path());
                }
            }
        }
        for path in targets {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("[Pipeline] cleaned up {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("[Pipeline] could not remove {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for ArtifactCleanup {
    fn drop(&mut self) {
        // Still armed only when the run was cancelled or panicked
        if !self.armed {
            return;
        }
        let mut targets = std::mem::take(&mut self.paths);
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            targets.extend(
                entries
                    .flatten()
                    .filter(|e| self.is_ours(&e.file_name().to_string_lossy()))
                    .map(|e| e.path()),
            );
        }
        for path in targets {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("[Pipeline] could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

pub struct ArchivePipeline {
    config: Arc<PipelineConfig>,
    retrieval: RetrievalCoordinator,
    fanout: UploadFanout,
    backends: Vec<UploadBackendDescriptor>,
    finalizer: DeliveryFinalizer,
}

impl ArchivePipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        primary: Arc<dyn PrimaryExtractor>,
        fallback: Arc<dyn FallbackExtractor>,
        backends: Vec<UploadBackendDescriptor>,
        platform: Arc<dyn DeliveryPlatform>,
    ) -> Self {
        let retrieval = RetrievalCoordinator::new(StrategySelector::from_config(&config), primary, fallback);
        let fanout = UploadFanout::new(config.upload_timeout());
        let finalizer = DeliveryFinalizer::new(platform, &backends, config.delivery_timeout());

        Self {
            config,
            retrieval,
            fanout,
            backends,
            finalizer,
        }
    }

    /// Pipeline wired to the hosted service, yt-dlp and the five upload backends
    pub fn with_defaults(
        config: Arc<PipelineConfig>,
        platform: Arc<dyn DeliveryPlatform>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("media-archiver/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let primary = Arc::new(CobaltExtractor::new(client.clone(), &config));
        let fallback = Arc::new(YtDlpExtractor::new(&config));
        let backends = default_backends(client, &config);
        Ok(Self::new(config, primary, fallback, backends, platform))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a run for `url` on behalf of a trigger
    pub async fn submit(&self, url: &str, trigger: TriggerContext) -> ArchiveReport {
        let request = RetrievalRequest::new(url.trim(), trigger.destination.clone());
        self.run(request, &trigger).await
    }

    pub async fn run(&self, request: RetrievalRequest, trigger: &TriggerContext) -> ArchiveReport {
        tracing::info!(
            "[Pipeline] run {} started for {} ({:?} from {})",
            request.request_id,
            request.url,
            trigger.kind,
            trigger.origin
        );

        let (reporter, handle) = ProgressReporter::start(trigger.status_sink.clone(), trigger.status_location.clone());
        let report = self.execute(&request, trigger, &reporter).await;

        reporter.report(report.render());
        drop(reporter);
        handle.finish().await;

        tracing::info!("[Pipeline] run {} finished: {:?}", request.request_id, report.status());
        report
    }

    async fn execute(
        &self,
        request: &RetrievalRequest,
        trigger: &TriggerContext,
        reporter: &ProgressReporter,
    ) -> ArchiveReport {
        let mut report = ArchiveReport {
            request_id: request.request_id,
            url: request.url.clone(),
            source_link: trigger.source_link.clone(),
            method: None,
            extraction_error: None,
            artifacts: Vec::new(),
            uploads: Vec::new(),
            deliveries: Vec::new(),
        };

        reporter.warn("🔄 Downloading media", format!("URL: {}\n\nProcessing...", request.url));

        let temp_dir = self.config.temp_dir.as_path();
        if let Err(e) = tokio::fs::create_dir_all(temp_dir).await {
            tracing::error!("[Pipeline] cannot create temp dir {}: {}", temp_dir.display(), e);
            report.extraction_error = Some(ExtractionError::from(e).to_string());
            return report;
        }

        let ctx = ExtractionContext {
            request_id: request.request_id,
            stamp: timestamp_millis(),
            temp_dir,
            reporter,
        };
        let mut cleanup = ArtifactCleanup::new(temp_dir, ctx.run_marker());
        let outcome = self.retrieval.retrieve(&request.url, &ctx).await;
        cleanup.track(&outcome.artifacts);
        report.method = outcome.method;

        if !outcome.success {
            report.extraction_error = outcome.error_detail();
            cleanup.run().await;
            return report;
        }

        let artifacts = outcome.artifacts;
        tracing::info!(
            "[Pipeline] run {} retrieved {} artifact(s) via {:?}",
            request.request_id,
            artifacts.len(),
            outcome.method
        );

        let uploads = self.fanout.distribute(&artifacts, &self.backends, reporter).await;

        let destination = self.config.route(&trigger.origin, request.target_destination.as_ref());
        let source = trigger.source_link.clone().unwrap_or_else(|| request.url.clone());
        let mut deliveries = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let caption = DeliveryCaption {
                source: source.clone(),
                label: if artifacts.len() > 1 {
                    format!(" [{}/{}]", artifact.id.0 + 1, artifacts.len())
                } else {
                    String::new()
                },
            };
            deliveries.push(
                self.finalizer
                    .finalize(artifact, destination.as_ref(), &uploads, &caption)
                    .await,
            );
        }

        cleanup.run().await;

        report.artifacts = artifacts;
        report.uploads = uploads;
        report.deliveries = deliveries;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::models::ArtifactId;

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_only_this_run() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["cobalt-1-aaaa.mp4", "video-1-aaaa-x.mp4.part", "video-2-bbbb-y.mp4"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let elsewhere = tempfile::tempdir().unwrap();
        let tracked = elsewhere.path().join("picked.mp4");
        std::fs::write(&tracked, b"x").unwrap();

        let mut cleanup = ArtifactCleanup::new(dir.path(), "1-aaaa".to_string());
        cleanup.track(&[MediaArtifact::describe(ArtifactId(0), &tracked, 1)]);
        cleanup.run().await;

        assert_eq!(names(dir.path()), vec!["video-2-bbbb-y.mp4".to_string()]);
        assert!(!tracked.exists());
    }

    #[test]
    fn test_dropped_cleanup_removes_in_flight_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cobalt-5-cccc.mp4"), b"partial").unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), b"keep").unwrap();

        drop(ArtifactCleanup::new(dir.path(), "5-cccc".to_string()));

        assert_eq!(names(dir.path()), vec!["unrelated.txt".to_string()]);
    }
}
