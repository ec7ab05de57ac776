// Extractor traits and the per-run context handed to them

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::archiver::models::{ExtractionOutcome, RequestId};
use crate::archiver::progress::ProgressReporter;

/// What an extractor needs to know about the run it works for
pub struct ExtractionContext<'a> {
    pub request_id: RequestId,
    /// Millisecond stamp shared by every temp file of the run
    pub stamp: i128,
    pub temp_dir: &'a Path,
    pub reporter: &'a ProgressReporter,
}

impl<'a> ExtractionContext<'a> {
    /// `<stamp>-<request>`, present in the name of every temp file of the run
    pub fn run_marker(&self) -> String {
        format!("{}-{}", self.stamp, self.request_id.short())
    }

    /// Common prefix of every temp file this run writes with `kind`
    pub fn file_prefix(&self, kind: &str) -> String {
        format!("{}-{}", kind, self.run_marker())
    }

    pub fn temp_path(&self, file_name: &str) -> PathBuf {
        self.temp_dir.join(file_name)
    }
}

/// Hosted extraction service
#[async_trait]
pub trait PrimaryExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Resolve a URL expected to yield one media stream
    async fn resolve_single(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome;

    /// Resolve a URL expected to yield a multi-item collection
    async fn resolve_collection(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome;
}

/// Local extraction tool used as a last resort
#[async_trait]
pub trait FallbackExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    async fn resolve(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome;
}
