// Retrieval coordinator - runs the extraction plan with fallback
//
// Strategy:
// 1. Collections: hosted service only, a failure is terminal
// 2. Supported sites: hosted service first, local tool on failure
// 3. Everything else: local tool only
//
// Artifacts of two attempts are never mixed; the run result is exactly one
// attempt's outcome.

use std::sync::Arc;

use super::strategy::{ExtractionPlan, PrimaryMode, StrategySelector};
use super::traits::{ExtractionContext, FallbackExtractor, PrimaryExtractor};
use crate::archiver::errors::ExtractionError;
use crate::archiver::models::{ExtractionMethod, ExtractionOutcome, MediaArtifact};

pub struct RetrievalCoordinator {
    selector: StrategySelector,
    primary: Arc<dyn PrimaryExtractor>,
    fallback: Arc<dyn FallbackExtractor>,
}

impl RetrievalCoordinator {
    pub fn new(
        selector: StrategySelector,
        primary: Arc<dyn PrimaryExtractor>,
        fallback: Arc<dyn FallbackExtractor>,
    ) -> Self {
        Self {
            selector,
            primary,
            fallback,
        }
    }

    pub fn plan(&self, url: &str) -> ExtractionPlan {
        self.selector.classify(url)
    }

    /// Produce the artifacts of one successful attempt, or the error of the
    /// last attempt made
    pub async fn retrieve(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
        let plan = self.plan(url);
        tracing::info!("[Retrieval] {} -> {:?}", url, plan.attempts());
        let mut last: Option<ExtractionOutcome> = None;

        if let Some(mode) = plan.primary {
            tracing::info!("[Retrieval] trying {} ({:?})", self.primary.name(), mode);
            let outcome = match mode {
                PrimaryMode::Single => self.primary.resolve_single(url, ctx).await,
                PrimaryMode::Collection => self.primary.resolve_collection(url, ctx).await,
            };
            if outcome.success {
                tracing::info!(
                    "[Retrieval] {} succeeded with {} artifact(s)",
                    self.primary.name(),
                    outcome.artifacts.len()
                );
                return outcome;
            }
            tracing::warn!(
                "[Retrieval] {} failed: {}",
                self.primary.name(),
                outcome.error_detail().unwrap_or_default()
            );
            discard(&outcome.artifacts).await;

            if plan.is_collection() {
                return finalize_failure(outcome, ExtractionMethod::Primary);
            }
            last = Some(outcome);
        }

        if plan.fallback {
            if last.is_some() {
                ctx.reporter.warn(
                    "🔄 Downloading media",
                    "The extraction service failed, trying yt-dlp...",
                );
            }
            tracing::info!("[Retrieval] trying {}", self.fallback.name());
            let outcome = self.fallback.resolve(url, ctx).await;
            if outcome.success {
                tracing::info!("[Retrieval] {} succeeded", self.fallback.name());
                return outcome;
            }
            tracing::warn!(
                "[Retrieval] {} failed: {}",
                self.fallback.name(),
                outcome.error_detail().unwrap_or_default()
            );
            discard(&outcome.artifacts).await;
            return finalize_failure(outcome, ExtractionMethod::Fallback);
        }

        match last {
            Some(outcome) => finalize_failure(outcome, ExtractionMethod::Primary),
            None => ExtractionOutcome::failed(None, ExtractionError::NotAttempted),
        }
    }
}

/// A failed outcome carrying no artifacts and a guaranteed error
fn finalize_failure(outcome: ExtractionOutcome, method: ExtractionMethod) -> ExtractionOutcome {
    let error = outcome.error.unwrap_or(ExtractionError::NoUsableUrl);
    ExtractionOutcome::failed(Some(outcome.method.unwrap_or(method)), error)
}

/// Remove files a failed attempt may have left behind
async fn discard(artifacts: &[MediaArtifact]) {
    for artifact in artifacts {
        if let Err(e) = tokio::fs::remove_file(&artifact.local_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "[Retrieval] could not remove {}: {}",
                    artifact.local_path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::config::PipelineConfig;
    use crate::archiver::models::{ArtifactId, RequestId};
    use crate::archiver::progress::ProgressReporter;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakePrimary {
        single: AtomicUsize,
        collection: AtomicUsize,
        succeed: bool,
    }

    impl FakePrimary {
        fn new(succeed: bool) -> Self {
            Self {
                single: AtomicUsize::new(0),
                collection: AtomicUsize::new(0),
                succeed,
            }
        }

        fn outcome(&self, count: usize) -> ExtractionOutcome {
            if self.succeed {
                let artifacts = (0..count)
                    .map(|i| MediaArtifact::describe(ArtifactId(i), Path::new(&format!("/tmp/p{}.mp4", i)), 10))
                    .collect();
                ExtractionOutcome::succeeded(ExtractionMethod::Primary, artifacts)
            } else {
                ExtractionOutcome::failed(
                    Some(ExtractionMethod::Primary),
                    ExtractionError::Service {
                        code: "error.api.fetch.fail".to_string(),
                        text: None,
                    },
                )
            }
        }
    }

    #[async_trait]
    impl PrimaryExtractor for FakePrimary {
        fn name(&self) -> &'static str {
            "fake-primary"
        }

        async fn resolve_single(&self, _url: &str, _ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
            self.single.fetch_add(1, Ordering::SeqCst);
            self.outcome(1)
        }

        async fn resolve_collection(&self, _url: &str, _ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
            self.collection.fetch_add(1, Ordering::SeqCst);
            self.outcome(3)
        }
    }

    struct FakeFallback {
        calls: AtomicUsize,
        succeed: bool,
    }

    #[async_trait]
    impl FallbackExtractor for FakeFallback {
        fn name(&self) -> &'static str {
            "fake-fallback"
        }

        async fn resolve(&self, _url: &str, _ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                ExtractionOutcome::succeeded(
                    ExtractionMethod::Fallback,
                    vec![MediaArtifact::describe(ArtifactId(0), Path::new("/tmp/f.mp4"), 10)],
                )
            } else {
                ExtractionOutcome::failed(
                    Some(ExtractionMethod::Fallback),
                    ExtractionError::tool_exit("yt-dlp", "exit status: 1", "ERROR: Unsupported URL"),
                )
            }
        }
    }

    struct Setup {
        coordinator: RetrievalCoordinator,
        primary: Arc<FakePrimary>,
        fallback: Arc<FakeFallback>,
    }

    fn setup(primary_ok: bool, fallback_ok: bool) -> Setup {
        let primary = Arc::new(FakePrimary::new(primary_ok));
        let fallback = Arc::new(FakeFallback {
            calls: AtomicUsize::new(0),
            succeed: fallback_ok,
        });
        let coordinator = RetrievalCoordinator::new(
            StrategySelector::from_config(&PipelineConfig::default()),
            primary.clone(),
            fallback.clone(),
        );
        Setup {
            coordinator,
            primary,
            fallback,
        }
    }

    async fn run(setup: &Setup, url: &str) -> ExtractionOutcome {
        let dir = tempfile::tempdir().unwrap();
        let reporter = ProgressReporter::disabled();
        let ctx = ExtractionContext {
            request_id: RequestId::new(),
            stamp: 1,
            temp_dir: dir.path(),
            reporter: &reporter,
        };
        setup.coordinator.retrieve(url, &ctx).await
    }

    #[tokio::test]
    async fn test_supported_site_primary_success() {
        let s = setup(true, true);
        let outcome = run(&s, "https://www.youtube.com/watch?v=1").await;
        assert!(outcome.success);
        assert_eq!(outcome.method, Some(ExtractionMethod::Primary));
        assert_eq!(s.fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_supported_site_falls_back() {
        let s = setup(false, true);
        let outcome = run(&s, "https://www.tiktok.com/@a/video/1").await;
        assert!(outcome.success);
        assert_eq!(outcome.method, Some(ExtractionMethod::Fallback));
        assert_eq!(outcome.artifacts.len(), 1);
        assert_eq!(s.primary.single.load(Ordering::SeqCst), 1);
        assert_eq!(s.fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collection_never_uses_fallback() {
        let s = setup(false, true);
        let outcome = run(&s, "https://www.instagram.com/p/Cabc/").await;
        assert!(!outcome.success);
        assert_eq!(outcome.method, Some(ExtractionMethod::Primary));
        assert!(matches!(outcome.error, Some(ExtractionError::Service { .. })));
        assert_eq!(s.primary.collection.load(Ordering::SeqCst), 1);
        assert_eq!(s.fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_collection_success() {
        let s = setup(true, true);
        let outcome = run(&s, "https://www.instagram.com/reel/Cabc/").await;
        assert!(outcome.success);
        assert_eq!(outcome.artifacts.len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_site_uses_tool_only() {
        let s = setup(true, true);
        let outcome = run(&s, "https://vimeo.com/1").await;
        assert!(outcome.success);
        assert_eq!(outcome.method, Some(ExtractionMethod::Fallback));
        assert_eq!(s.primary.single.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_total_failure_reports_last_error() {
        let s = setup(false, false);
        let outcome = run(&s, "https://x.com/a/status/1").await;
        assert!(!outcome.success);
        assert!(outcome.artifacts.is_empty());
        assert_eq!(outcome.method, Some(ExtractionMethod::Fallback));
        assert!(matches!(outcome.error, Some(ExtractionError::ToolExit { .. })));
    }
}
