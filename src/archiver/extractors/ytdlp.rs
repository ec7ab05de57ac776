// yt-dlp subprocess extractor (fallback path)

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::traits::{ExtractionContext, FallbackExtractor};
use crate::archiver::config::PipelineConfig;
use crate::archiver::errors::ExtractionError;
use crate::archiver::models::{ArtifactId, ExtractionMethod, ExtractionOutcome, MediaArtifact};
use crate::archiver::progress::{ProgressReporter, ThrottleProfile, TransferProgress};
use crate::archiver::tools::{ToolManager, ToolType};
use crate::archiver::utils::has_media_extension;

/// `download:` selects the progress type; yt-dlp prints only what follows it
const PROGRESS_TEMPLATE: &str = concat!(
    "download:progress:{",
    r#""downloaded_bytes":%(progress.downloaded_bytes)s,"#,
    r#""total_bytes":%(progress.total_bytes)s,"#,
    r#""eta":%(progress.eta)s}"#
);

const STATUS_TITLE: &str = "🔄 Downloading with yt-dlp";

lazy_static! {
    static ref PROGRESS_LINE: Regex = Regex::new(r"^\s*(?:download:)?progress:(\{.*\})").unwrap();
    static ref NA_FIELD: Regex = Regex::new(r":\s*NA\s*([,}])").unwrap();
    static ref DESTINATION_LINE: Regex =
        Regex::new(r"\[(?:download|Merger|ExtractAudio)\] Destination: (.+)$").unwrap();
    static ref MERGE_LINE: Regex = Regex::new(r#"Merging formats into "(.+)""#).unwrap();
}

/// One parsed progress-template line
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ToolProgress {
    pub downloaded_bytes: f64,
    pub total_bytes: Option<f64>,
    pub eta: Option<f64>,
}

/// Parse a `progress:{...}` line. Fields yt-dlp cannot know are printed as
/// `NA` and read as missing; a line without a byte count is ignored.
pub fn parse_progress_line(line: &str) -> Option<ToolProgress> {
    let captures = PROGRESS_LINE.captures(line)?;
    let json = NA_FIELD.replace_all(captures.get(1)?.as_str(), ":null$1");
    serde_json::from_str(&json).ok()
}

/// Output path announced by a destination or merge line
pub fn parse_reported_path(line: &str) -> Option<PathBuf> {
    let raw = DESTINATION_LINE
        .captures(line)
        .or_else(|| MERGE_LINE.captures(line))?
        .get(1)?
        .as_str()
        .trim();
    if raw.is_empty() {
        None
    } else {
        Some(PathBuf::from(raw))
    }
}

/// Newest media file in `dir` whose name starts with `prefix`
pub async fn scan_for_recent_match(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(prefix) || !has_media_extension(&name) {
            continue;
        }
        let modified = match entry.metadata().await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => std::time::SystemTime::UNIX_EPOCH,
        };
        if best.as_ref().map_or(true, |(t, _)| modified >= *t) {
            best = Some((modified, entry.path()));
        }
    }

    best.map(|(_, path)| path)
}

/// Remove leftovers (partial downloads, unmerged formats) of a failed run
async fn remove_matching(dir: &Path, prefix: &str, keep: Option<&Path>) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !entry.file_name().to_string_lossy().starts_with(prefix) || Some(path.as_path()) == keep {
            continue;
        }
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::debug!("[yt-dlp] could not remove {}: {}", path.display(), e);
        }
    }
}

/// Interprets the tool's stdout as it streams
struct ToolSession<'a> {
    reporter: &'a ProgressReporter,
    progress: TransferProgress<'a>,
    reported_path: Option<PathBuf>,
    started: bool,
}

impl<'a> ToolSession<'a> {
    fn new(reporter: &'a ProgressReporter, throttle: ThrottleProfile) -> Self {
        Self {
            reporter,
            progress: TransferProgress::new(reporter, STATUS_TITLE, throttle),
            reported_path: None,
            started: false,
        }
    }

    fn observe(&mut self, line: &str) {
        if let Some(progress) = parse_progress_line(line) {
            self.progress.update(
                progress.downloaded_bytes.max(0.0) as u64,
                progress.total_bytes.map(|t| t.max(0.0) as u64),
                progress.eta.map(|e| e.max(0.0) as u64),
            );
            return;
        }

        if let Some(path) = parse_reported_path(line) {
            tracing::info!("[yt-dlp] output: {}", path.display());
            self.reported_path = Some(path);
            if line.contains("[Merger]") {
                self.reporter.info(STATUS_TITLE, "Merging formats...");
            } else if !self.started {
                self.started = true;
                self.reporter.info(STATUS_TITLE, "Starting download...");
            }
            return;
        }

        if line.contains("Extracting URL") {
            self.reporter.info(STATUS_TITLE, "Extracting URL...");
        } else if line.contains("Downloading webpage") {
            self.reporter.info(STATUS_TITLE, "Downloading webpage...");
        } else if line.contains("[Merger]") {
            self.reporter.info(STATUS_TITLE, "Merging formats...");
        }
    }

    fn finish(&mut self) {
        self.progress.finish();
    }
}

pub struct YtDlpExtractor {
    binary: String,
    cookies_path: Option<String>,
    timeout: Duration,
    throttle: ThrottleProfile,
}

impl YtDlpExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        let binary = config
            .ytdlp_path
            .clone()
            .unwrap_or_else(|| ToolManager::new().binary(ToolType::YtDlp));
        Self {
            binary,
            cookies_path: config.cookies_path.clone(),
            timeout: config.tool_timeout(),
            throttle: config.tool_throttle,
        }
    }

    pub fn build_args(&self, url: &str, output_template: &str) -> Vec<String> {
        let mut args = vec![
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            PROGRESS_TEMPLATE.to_string(),
            "-o".to_string(),
            output_template.to_string(),
        ];
        if let Some(cookies) = &self.cookies_path {
            args.push("--cookies".to_string());
            args.push(cookies.clone());
        }
        args.push(url.to_string());
        args
    }

    async fn run(&self, url: &str, ctx: &ExtractionContext<'_>) -> Result<PathBuf, ExtractionError> {
        let prefix = ctx.file_prefix("video");
        let template = ctx.temp_path(&format!("{}-%(id)s.%(ext)s", prefix));
        let args = self.build_args(url, &template.to_string_lossy());

        tracing::info!("[yt-dlp] starting: {} {}", self.binary, url);
        ctx.reporter.info(STATUS_TITLE, "Starting yt-dlp...");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExtractionError::ToolNotFound(format!("{}: {}", self.binary, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExtractionError::Io("failed to capture yt-dlp stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExtractionError::Io("failed to capture yt-dlp stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected.join("\n")
        });

        let mut session = ToolSession::new(ctx.reporter, self.throttle);
        let run = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                session.observe(&line);
            }
            child.wait().await
        };

        let waited = tokio::time::timeout(self.timeout, run).await;
        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stderr_task.abort();
                remove_matching(ctx.temp_dir, &prefix, None).await;
                return Err(ExtractionError::Io(format!("failed to wait for yt-dlp: {}", e)));
            }
            Err(_) => {
                let _ = child.kill().await;
                stderr_task.abort();
                remove_matching(ctx.temp_dir, &prefix, None).await;
                return Err(ExtractionError::Timeout(self.timeout));
            }
        };
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            remove_matching(ctx.temp_dir, &prefix, None).await;
            return Err(ExtractionError::tool_exit("yt-dlp", status, &stderr_output));
        }
        session.finish();

        let output = match session.reported_path.take() {
            Some(path) if tokio::fs::try_exists(&path).await.unwrap_or(false) => Some(path),
            _ => scan_for_recent_match(ctx.temp_dir, &prefix).await,
        };
        let output = output.ok_or_else(|| ExtractionError::OutputNotFound("yt-dlp".to_string()))?;

        // Format fragments left behind after a merge
        remove_matching(ctx.temp_dir, &prefix, Some(&output)).await;
        Ok(output)
    }
}

#[async_trait]
impl FallbackExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
        let result = match self.run(url, ctx).await {
            Ok(path) => MediaArtifact::from_file(ArtifactId(0), &path)
                .await
                .map_err(ExtractionError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(artifact) => {
                tracing::info!("[yt-dlp] downloaded {} ({} MB)", artifact.display_name, artifact.size_mb());
                ExtractionOutcome::succeeded(ExtractionMethod::Fallback, vec![artifact])
            }
            Err(e) => {
                tracing::warn!("[yt-dlp] {} failed: {}", url, e);
                ExtractionOutcome::failed(Some(ExtractionMethod::Fallback), e)
            }
        }
    }
}
