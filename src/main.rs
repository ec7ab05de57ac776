use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use media_archiver::archiver::local::{ConsoleStatusSink, LocalDirectoryPlatform};
use media_archiver::archiver::tools::ToolManager;
use media_archiver::archiver::{PlatformLocation, StatusLocation};
use media_archiver::{extract_first_url, ArchivePipeline, PipelineConfig, ReportStatus, TriggerContext, TriggerKind};

/// Download a media URL and archive it across the upload backends
#[derive(Debug, Parser)]
#[command(name = "media-archiver", version)]
struct Cli {
    /// Media URL (or any text containing one)
    input: String,

    /// JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Copy the media into this directory (direct delivery). Without it,
    /// direct delivery is skipped unless the config routes the `cli` origin,
    /// in which case files go under the downloads folder.
    #[arg(long)]
    deliver_to: Option<PathBuf>,

    /// yt-dlp binary to use instead of the configured or discovered one
    #[arg(long = "yt-dlp")]
    ytdlp: Option<String>,

    /// Cookies file passed to yt-dlp
    #[arg(long)]
    cookies: Option<String>,
}

const LOCAL_DESTINATION: &str = "archive";

/// Delivery root when no `--deliver-to` is given; never inside the temp dir
fn default_delivery_root() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("media-archiver")
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let Some(url) = extract_first_url(&cli.input) else {
        tracing::error!("no http(s) URL found in {:?}", cli.input);
        return ExitCode::from(2);
    };

    let config = match PipelineConfig::load_or_default(&cli.config) {
        Ok(mut config) => {
            if cli.ytdlp.is_some() {
                config = config.with_ytdlp_path(cli.ytdlp.clone());
            }
            if cli.cookies.is_some() {
                config = config.with_cookies_path(cli.cookies.clone());
            }
            Arc::new(config)
        }
        Err(e) => {
            tracing::error!("[Config] {}", e);
            return ExitCode::from(2);
        }
    };

    for tool in ToolManager::new().get_all_tools() {
        match (&tool.path, &tool.version) {
            (Some(path), version) => tracing::debug!(
                "[Tools] {} at {} ({})",
                tool.name,
                path,
                version.as_deref().unwrap_or("unknown version")
            ),
            (None, _) => tracing::warn!("[Tools] {} not found, some paths will fail", tool.name),
        }
    }

    let root = cli.deliver_to.clone().unwrap_or_else(default_delivery_root);
    let platform = Arc::new(LocalDirectoryPlatform::new(root));
    let pipeline = match ArchivePipeline::with_defaults(config, platform) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("[Pipeline] failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!("[Config] staging downloads in {}", pipeline.config().temp_dir.display());

    let origin = PlatformLocation::new("cli");
    let mut trigger = TriggerContext::new(
        TriggerKind::Command,
        origin.clone(),
        Arc::new(ConsoleStatusSink),
        StatusLocation::new(origin, "console"),
    );
    if cli.deliver_to.is_some() {
        trigger = trigger.with_destination(PlatformLocation::new(LOCAL_DESTINATION));
    }

    let report = pipeline.submit(&url, trigger).await;
    match report.status() {
        ReportStatus::Complete | ReportStatus::PartialSuccess => ExitCode::SUCCESS,
        ReportStatus::NothingStored | ReportStatus::NothingDownloaded => ExitCode::FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_delivery_root_is_outside_temp_dir() {
        let temp_dir = PipelineConfig::default().temp_dir;
        let root = default_delivery_root();
        assert!(!root.starts_with(&temp_dir));
        assert!(root.ends_with("media-archiver"));
    }

    #[test]
    fn test_tool_overrides_parse() {
        let cli = Cli::try_parse_from([
            "media-archiver",
            "look https://youtu.be/abc",
            "--yt-dlp",
            "/opt/yt-dlp",
            "--cookies",
            "/etc/cookies.txt",
        ])
        .unwrap();
        assert_eq!(cli.ytdlp.as_deref(), Some("/opt/yt-dlp"));
        assert_eq!(cli.cookies.as_deref(), Some("/etc/cookies.txt"));
        assert!(cli.deliver_to.is_none());
        assert_eq!(cli.config, PathBuf::from("config.json"));
    }
}
