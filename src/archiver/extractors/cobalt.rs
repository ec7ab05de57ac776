// Cobalt hosted extraction service

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use super::traits::{ExtractionContext, PrimaryExtractor};
use crate::archiver::config::PipelineConfig;
use crate::archiver::errors::ExtractionError;
use crate::archiver::models::{ArtifactId, ExtractionMethod, ExtractionOutcome, MediaArtifact};
use crate::archiver::progress::{ThrottleProfile, TransferProgress};
use crate::archiver::utils::sanitize_file_name;

/// Request body understood by the service
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CobaltRequest<'a> {
    url: &'a str,
    video_quality: &'static str,
    audio_format: &'static str,
    filename_style: &'static str,
    download_mode: &'static str,
    youtube_video_codec: &'static str,
    always_proxy: bool,
    disable_metadata: bool,
    tiktok_full_audio: bool,
    #[serde(rename = "tiktokH265")]
    tiktok_h265: bool,
    twitter_gif: bool,
    #[serde(rename = "youtubeHLS")]
    youtube_hls: bool,
}

impl<'a> CobaltRequest<'a> {
    fn new(url: &'a str, always_proxy: bool) -> Self {
        Self {
            url,
            video_quality: "max",
            audio_format: "best",
            filename_style: "basic",
            download_mode: "auto",
            youtube_video_codec: "h264",
            always_proxy,
            disable_metadata: false,
            tiktok_full_audio: true,
            tiktok_h265: false,
            twitter_gif: true,
            youtube_hls: false,
        }
    }
}

/// One directly fetchable media stream
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct StreamDescriptor {
    pub url: Option<String>,
    pub filename: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// One entry of a multi-item collection
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PickerItem {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub url: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceError {
    code: Option<String>,
    text: Option<String>,
    context: Option<Value>,
}

/// What the service resolved a URL into
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Single(StreamDescriptor),
    Collection(Vec<PickerItem>),
}

pub struct CobaltExtractor {
    client: Client,
    endpoint: String,
    resolve_timeout: Duration,
    transfer_timeout: Duration,
    throttle: ThrottleProfile,
}

impl CobaltExtractor {
    pub fn new(client: Client, config: &PipelineConfig) -> Self {
        Self {
            client,
            endpoint: config.cobalt_endpoint.clone(),
            resolve_timeout: config.resolve_timeout(),
            transfer_timeout: config.transfer_timeout(),
            throttle: config.hosted_throttle,
        }
    }

    async fn request(&self, url: &str, always_proxy: bool) -> Result<Resolution, ExtractionError> {
        let target = normalize_facebook_url(url);
        if target != url {
            tracing::debug!("[Cobalt] normalized {} -> {}", url, target);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .json(&CobaltRequest::new(&target, always_proxy))
            .timeout(self.resolve_timeout)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        // Error statuses still carry a JSON body worth reading
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            if status.is_success() {
                ExtractionError::Transport(format!("invalid JSON from extraction service: {}", e))
            } else {
                ExtractionError::Transport(format!("HTTP {}: {}", status.as_u16(), truncate(&text, 200)))
            }
        })?;

        interpret_response(&body)
    }

    /// Stream one media URL to disk, removing the partial file on failure
    async fn fetch_to_file(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        path: &Path,
        progress: Option<&mut TransferProgress<'_>>,
    ) -> Result<u64, ExtractionError> {
        let result = self.stream_to_file(url, headers, path, progress).await;
        if result.is_err() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("[Cobalt] could not remove partial file {}: {}", path.display(), e);
                }
            }
        }
        result
    }

    async fn stream_to_file(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        path: &Path,
        mut progress: Option<&mut TransferProgress<'_>>,
    ) -> Result<u64, ExtractionError> {
        let response = self
            .client
            .get(url)
            .headers(forwarded_headers(headers))
            .timeout(self.transfer_timeout)
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();
        let mut file = tokio::fs::File::create(path).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(progress) = progress.as_deref_mut() {
                progress.update(downloaded, total, None);
            }
        }
        file.flush().await?;

        if downloaded == 0 {
            return Err(ExtractionError::Transport("empty media response".to_string()));
        }
        if let Some(progress) = progress {
            progress.finish();
        }
        Ok(downloaded)
    }

    async fn download_single(
        &self,
        descriptor: &StreamDescriptor,
        ctx: &ExtractionContext<'_>,
    ) -> Result<Vec<MediaArtifact>, ExtractionError> {
        let url = descriptor
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(ExtractionError::NoUsableUrl)?;

        let extension = descriptor
            .filename
            .as_deref()
            .and_then(extension_of)
            .unwrap_or_else(|| "mp4".to_string());
        let path = ctx.temp_path(&format!("{}.{}", ctx.file_prefix("cobalt"), extension));

        ctx.reporter.warn("🔄 Downloading media", "Starting download...");
        let mut progress = TransferProgress::new(ctx.reporter, "🔄 Downloading media", self.throttle);
        let bytes = self
            .fetch_to_file(url, &descriptor.headers, &path, Some(&mut progress))
            .await?;

        tracing::info!("[Cobalt] downloaded {} bytes to {}", bytes, path.display());
        Ok(vec![MediaArtifact::describe(ArtifactId(0), &path, bytes)])
    }

    /// Download picker items one by one; failed items are skipped
    async fn download_collection(
        &self,
        items: &[PickerItem],
        ctx: &ExtractionContext<'_>,
    ) -> Result<Vec<MediaArtifact>, ExtractionError> {
        let total = items.len();
        ctx.reporter.warn(
            "🔄 Collection",
            format!("Found {} items in the collection. Starting download...", total),
        );

        let prefix = ctx.file_prefix("collection");
        let mut artifacts: Vec<MediaArtifact> = Vec::new();
        let no_headers = HashMap::new();

        for (index, item) in items.iter().enumerate() {
            let kind = item.kind.as_deref().unwrap_or("media");
            ctx.reporter.warn(
                "🔄 Collection",
                format!("Downloading item {}/{}... ({})", index + 1, total, kind),
            );

            let Some(url) = item.url.as_deref().filter(|u| !u.is_empty()) else {
                tracing::warn!("[Cobalt] collection item {} has no URL, skipping", index + 1);
                continue;
            };

            let path = ctx.temp_path(&picker_file_name(&prefix, index, item));
            match self.fetch_to_file(url, &no_headers, &path, None).await {
                Ok(bytes) => {
                    tracing::info!("[Cobalt] item {} ({}) saved to {}", index + 1, kind, path.display());
                    artifacts.push(MediaArtifact::describe(ArtifactId(artifacts.len()), &path, bytes));
                }
                Err(e) => {
                    tracing::warn!("[Cobalt] item {} of {} failed: {}", index + 1, total, e);
                }
            }
        }

        if artifacts.is_empty() {
            return Err(ExtractionError::EmptyCollection);
        }
        Ok(artifacts)
    }

    async fn resolve(&self, url: &str, always_proxy: bool, ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
        ctx.reporter
            .warn("🔄 Downloading media", "Preparing download with the extraction service...");

        let result = match self.request(url, always_proxy).await {
            Ok(Resolution::Single(descriptor)) => self.download_single(&descriptor, ctx).await,
            Ok(Resolution::Collection(items)) => self.download_collection(&items, ctx).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(artifacts) => ExtractionOutcome::succeeded(ExtractionMethod::Primary, artifacts),
            Err(e) => {
                tracing::warn!("[Cobalt] {} failed: {}", url, e);
                ExtractionOutcome::failed(Some(ExtractionMethod::Primary), e)
            }
        }
    }
}

#[async_trait]
impl PrimaryExtractor for CobaltExtractor {
    fn name(&self) -> &'static str {
        "Cobalt"
    }

    async fn resolve_single(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
        self.resolve(url, true, ctx).await
    }

    async fn resolve_collection(&self, url: &str, ctx: &ExtractionContext<'_>) -> ExtractionOutcome {
        self.resolve(url, false, ctx).await
    }
}

/// Map the service's JSON answer onto a resolution or a typed error
pub fn interpret_response(body: &Value) -> Result<Resolution, ExtractionError> {
    let status = body.get("status").and_then(Value::as_str).unwrap_or_default();

    match status {
        "tunnel" | "redirect" | "stream" => {
            let descriptor: StreamDescriptor = serde_json::from_value(body.clone())
                .map_err(|e| ExtractionError::Transport(format!("malformed stream descriptor: {}", e)))?;
            if descriptor.url.as_deref().map_or(true, str::is_empty) {
                return Err(ExtractionError::NoUsableUrl);
            }
            Ok(Resolution::Single(descriptor))
        }
        "picker" => {
            let items: Vec<PickerItem> = body
                .get("picker")
                .cloned()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| ExtractionError::Transport(format!("malformed picker list: {}", e)))?
                .unwrap_or_default();
            if items.is_empty() {
                return Err(ExtractionError::NoUsableUrl);
            }
            Ok(Resolution::Collection(items))
        }
        "error" => Err(service_error(body)),
        other => Err(ExtractionError::UnexpectedStatus(if other.is_empty() {
            "missing".to_string()
        } else {
            other.to_string()
        })),
    }
}

fn service_error(body: &Value) -> ExtractionError {
    let error: ServiceError = body
        .get("error")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let mut text = error
        .text
        .or_else(|| body.get("text").and_then(Value::as_str).map(str::to_string));
    if let Some(context) = error.context.filter(|c| !c.is_null()) {
        let context = context.to_string();
        text = Some(match text {
            Some(t) => format!("{}; context: {}", t, context),
            None => format!("context: {}", context),
        });
    }

    ExtractionError::Service {
        code: error.code.unwrap_or_else(|| "unknown".to_string()),
        text,
    }
}

/// Strip tracking noise from Facebook links the service chokes on
pub fn normalize_facebook_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str().map(str::to_lowercase) else {
        return url.to_string();
    };
    if host == "fb.watch" || host.ends_with(".fb.watch") {
        return url.to_string();
    }
    if host != "facebook.com" && !host.ends_with(".facebook.com") {
        return url.to_string();
    }

    let path = parsed.path();
    let base = format!("{}://{}{}", parsed.scheme(), host, path);
    if path.starts_with("/watch") || path.starts_with("/video.php") {
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
            return format!("{}?v={}", base, v);
        }
    }
    base
}

/// Local file name for one picker item
fn picker_file_name(prefix: &str, index: usize, item: &PickerItem) -> String {
    match item.filename.as_deref().filter(|f| !f.trim().is_empty()) {
        Some(name) => format!("{}-{}-{}", prefix, index + 1, sanitize_file_name(name)),
        None => {
            let extension = match item.kind.as_deref() {
                Some("photo") => "jpg",
                Some("gif") => "gif",
                _ => "mp4",
            };
            format!("{}-{}.{}", prefix, index + 1, extension)
        }
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|e| sanitize_file_name(&e.to_string_lossy()).to_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 5)
}

fn forwarded_headers(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::debug!("[Cobalt] dropping invalid forwarded header {}", name),
        }
    }
    map
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_fields() {
        let body = serde_json::to_value(CobaltRequest::new("https://x.com/a/status/1", true)).unwrap();
        assert_eq!(body["videoQuality"], "max");
        assert_eq!(body["youtubeVideoCodec"], "h264");
        assert_eq!(body["alwaysProxy"], true);
        assert_eq!(body["tiktokH265"], false);
        assert_eq!(body["youtubeHLS"], false);
        assert_eq!(body["twitterGif"], true);
        assert_eq!(body["filenameStyle"], "basic");
    }

    #[test]
    fn test_tunnel_response() {
        let body = json!({
            "status": "tunnel",
            "url": "https://cobalt.example/tunnel?id=1",
            "filename": "clip.webm"
        });
        match interpret_response(&body).unwrap() {
            Resolution::Single(d) => {
                assert_eq!(d.url.as_deref(), Some("https://cobalt.example/tunnel?id=1"));
                assert_eq!(d.filename.as_deref(), Some("clip.webm"));
                assert!(d.headers.is_empty());
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    #[test]
    fn test_redirect_with_headers() {
        let body = json!({
            "status": "redirect",
            "url": "https://cdn.example/v.mp4",
            "headers": {"referer": "https://site.example/"}
        });
        let Resolution::Single(d) = interpret_response(&body).unwrap() else {
            panic!("expected single");
        };
        assert_eq!(d.headers.get("referer").map(String::as_str), Some("https://site.example/"));
        assert_eq!(forwarded_headers(&d.headers).len(), 1);
    }

    #[test]
    fn test_stream_without_url() {
        let body = json!({"status": "stream"});
        assert!(matches!(interpret_response(&body), Err(ExtractionError::NoUsableUrl)));
    }

    #[test]
    fn test_picker_response() {
        let body = json!({
            "status": "picker",
            "picker": [
                {"type": "photo", "url": "https://cdn.example/1"},
                {"type": "video", "url": "https://cdn.example/2"},
                {"type": "gif", "url": "https://cdn.example/3", "filename": "anim.gif"}
            ]
        });
        let Resolution::Collection(items) = interpret_response(&body).unwrap() else {
            panic!("expected collection");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[2].filename.as_deref(), Some("anim.gif"));
    }

    #[test]
    fn test_empty_picker() {
        let body = json!({"status": "picker", "picker": []});
        assert!(matches!(interpret_response(&body), Err(ExtractionError::NoUsableUrl)));
    }

    #[test]
    fn test_error_response() {
        let body = json!({
            "status": "error",
            "error": {"code": "error.api.content.video.unavailable", "context": {"service": "youtube"}}
        });
        match interpret_response(&body) {
            Err(ExtractionError::Service { code, text }) => {
                assert_eq!(code, "error.api.content.video.unavailable");
                assert!(text.unwrap().contains("youtube"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_legacy_error_text() {
        let body = json!({"status": "error", "text": "i couldn't process your request"});
        match interpret_response(&body) {
            Err(ExtractionError::Service { code, text }) => {
                assert_eq!(code, "unknown");
                assert_eq!(text.as_deref(), Some("i couldn't process your request"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_status() {
        let body = json!({"status": "local-processing"});
        assert!(matches!(
            interpret_response(&body),
            Err(ExtractionError::UnexpectedStatus(s)) if s == "local-processing"
        ));
        assert!(matches!(
            interpret_response(&json!({})),
            Err(ExtractionError::UnexpectedStatus(s)) if s == "missing"
        ));
    }

    #[test]
    fn test_facebook_normalization() {
        assert_eq!(
            normalize_facebook_url("https://www.facebook.com/watch/?v=123&ref=share&mibextid=x"),
            "https://www.facebook.com/watch/?v=123"
        );
        assert_eq!(
            normalize_facebook_url("https://m.facebook.com/video.php?v=42&fbclid=abc"),
            "https://m.facebook.com/video.php?v=42"
        );
        assert_eq!(
            normalize_facebook_url("https://www.facebook.com/someone/videos/987/?s=1"),
            "https://www.facebook.com/someone/videos/987/"
        );
        assert_eq!(normalize_facebook_url("https://fb.watch/abc/?x=1"), "https://fb.watch/abc/?x=1");
        assert_eq!(
            normalize_facebook_url("https://youtube.com/watch?v=1&t=2"),
            "https://youtube.com/watch?v=1&t=2"
        );
        assert_eq!(normalize_facebook_url("not a url"), "not a url");
    }

    #[test]
    fn test_picker_file_names() {
        let photo = PickerItem {
            kind: Some("photo".to_string()),
            ..Default::default()
        };
        let gif = PickerItem {
            kind: Some("gif".to_string()),
            ..Default::default()
        };
        let named = PickerItem {
            kind: Some("video".to_string()),
            filename: Some("../clip.mov".to_string()),
            ..Default::default()
        };
        assert_eq!(picker_file_name("p", 0, &photo), "p-1.jpg");
        assert_eq!(picker_file_name("p", 1, &gif), "p-2.gif");
        assert_eq!(picker_file_name("p", 2, &PickerItem::default()), "p-3.mp4");
        assert_eq!(picker_file_name("p", 3, &named), "p-4-_clip.mov");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("clip.WEBM").as_deref(), Some("webm"));
        assert_eq!(extension_of("noext"), None);
    }
}
