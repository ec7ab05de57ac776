// Delivery finalizer: direct upload to the origin platform, or a link notice
//
// Never raises; every path ends in a DeliveryOutcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::errors::DeliveryError;
use super::models::{DeliveryOutcome, MediaArtifact, PlatformLocation, UploadBackendDescriptor, UploadOutcome};
use super::traits::DeliveryPlatform;

/// Fallback rules of one registered backend
#[derive(Debug, Clone, Copy)]
struct LinkPolicy {
    priority: u32,
    eligible: bool,
    preference: Option<u32>,
}

/// Context shown alongside a delivered artifact
#[derive(Debug, Clone, Default)]
pub struct DeliveryCaption {
    /// Where the request came from (message link or the media URL)
    pub source: String,
    /// ` [2/3]` for multi-artifact runs, empty otherwise
    pub label: String,
}

impl DeliveryCaption {
    pub fn text(&self) -> String {
        format!("Original message: {}{}", self.source, self.label)
    }
}

pub struct DeliveryFinalizer {
    platform: Arc<dyn DeliveryPlatform>,
    policies: HashMap<String, LinkPolicy>,
    timeout: Duration,
}

impl DeliveryFinalizer {
    pub fn new(platform: Arc<dyn DeliveryPlatform>, backends: &[UploadBackendDescriptor], timeout: Duration) -> Self {
        let policies = backends
            .iter()
            .map(|b| {
                (
                    b.name.clone(),
                    LinkPolicy {
                        priority: b.priority,
                        eligible: b.eligible_as_fallback_link,
                        preference: b.fallback_preference,
                    },
                )
            })
            .collect();

        Self {
            platform,
            policies,
            timeout,
        }
    }

    /// Best stand-in link for `artifact`: a preferred backend by rank,
    /// otherwise the highest-priority eligible success
    pub fn select_fallback_link<'a>(
        &self,
        artifact: &MediaArtifact,
        outcomes: &'a [UploadOutcome],
    ) -> Option<(&'a UploadOutcome, &'a str)> {
        outcomes
            .iter()
            .filter(|o| o.artifact == artifact.id && o.success)
            .filter_map(|o| {
                let url = o.url.as_deref().filter(|u| !u.is_empty())?;
                let policy = self.policies.get(&o.backend_name).filter(|p| p.eligible)?;
                Some((o, url, policy))
            })
            .min_by_key(|(_, _, p)| (p.preference.is_none(), p.preference.unwrap_or(0), p.priority))
            .map(|(o, url, _)| (o, url))
    }

    pub async fn finalize(
        &self,
        artifact: &MediaArtifact,
        destination: Option<&PlatformLocation>,
        outcomes: &[UploadOutcome],
        caption: &DeliveryCaption,
    ) -> DeliveryOutcome {
        let Some(destination) = destination else {
            tracing::warn!("[Delivery] no destination for {}", artifact.display_name);
            return DeliveryOutcome::none(artifact.id, DeliveryError::NoDestination.to_string());
        };

        let direct = tokio::time::timeout(
            self.timeout,
            self.platform.deliver_file(destination, artifact, &caption.text()),
        )
        .await
        .unwrap_or(Err(DeliveryError::Timeout(self.timeout)));

        let direct_error = match direct {
            Ok(url) => {
                tracing::info!("[Delivery] {} delivered directly: {}", artifact.display_name, url);
                return DeliveryOutcome::direct(artifact.id, url);
            }
            Err(e) => e,
        };
        tracing::warn!(
            "[Delivery] direct delivery of {} failed: {}",
            artifact.display_name,
            direct_error
        );

        let Some((chosen, url)) = self.select_fallback_link(artifact, outcomes) else {
            return DeliveryOutcome::none(
                artifact.id,
                format!("{}; no eligible upload to link instead", direct_error),
            );
        };

        let notice = format!(
            "{}\nDirect upload failed ({}). Alternative link ({}): {}",
            caption.text(),
            direct_error,
            chosen.backend_name,
            url
        );
        let posted = tokio::time::timeout(self.timeout, self.platform.post_notice(destination, &notice))
            .await
            .unwrap_or(Err(DeliveryError::Timeout(self.timeout)));

        match posted {
            Ok(_) => {
                tracing::info!(
                    "[Delivery] {} delivered as {} link: {}",
                    artifact.display_name,
                    chosen.backend_name,
                    url
                );
                DeliveryOutcome::fallback_link(
                    artifact.id,
                    url.to_string(),
                    &chosen.backend_name,
                    direct_error.to_string(),
                )
            }
            Err(e) => {
                tracing::error!("[Delivery] fallback notice for {} failed: {}", artifact.display_name, e);
                DeliveryOutcome::none(
                    artifact.id,
                    format!("{}; fallback notice failed: {}", direct_error, e),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::errors::UploadError;
    use crate::archiver::models::{ArtifactId, DeliveryMethod, SizeLimit, UploadReceipt};
    use crate::archiver::traits::UploadBackend;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    struct NamedBackend(&'static str);

    #[async_trait]
    impl UploadBackend for NamedBackend {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn upload(&self, _p: &Path, _n: &str) -> Result<UploadReceipt, UploadError> {
            Ok(UploadReceipt::new("unused"))
        }
    }

    fn registry() -> Vec<UploadBackendDescriptor> {
        vec![
            UploadBackendDescriptor::new(Arc::new(NamedBackend("Catbox")), SizeLimit::megabytes(200), 0)
                .preferred_for_fallback(0),
            UploadBackendDescriptor::new(Arc::new(NamedBackend("Filebin")), SizeLimit::megabytes(20_000), 1)
                .preferred_for_fallback(1),
            UploadBackendDescriptor::new(Arc::new(NamedBackend("Pomf")), SizeLimit::megabytes(200), 2),
            UploadBackendDescriptor::new(Arc::new(NamedBackend("Fileditch")), SizeLimit::megabytes(5_000), 3)
                .not_eligible_for_fallback(),
            UploadBackendDescriptor::new(Arc::new(NamedBackend("SodiShare")), SizeLimit::Unlimited, 4),
        ]
    }

    struct FakePlatform {
        deliver_ok: bool,
        notice_ok: bool,
        notices: Mutex<Vec<String>>,
    }

    impl FakePlatform {
        fn new(deliver_ok: bool, notice_ok: bool) -> Arc<Self> {
            Arc::new(Self {
                deliver_ok,
                notice_ok,
                notices: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DeliveryPlatform for FakePlatform {
        async fn deliver_file(
            &self,
            _destination: &PlatformLocation,
            artifact: &MediaArtifact,
            _caption: &str,
        ) -> Result<String, DeliveryError> {
            if self.deliver_ok {
                Ok(format!("https://chat.example/m/{}", artifact.id.0))
            } else {
                Err(DeliveryError::Rejected("file too large".to_string()))
            }
        }

        async fn post_notice(&self, _destination: &PlatformLocation, text: &str) -> Result<String, DeliveryError> {
            self.notices.lock().unwrap().push(text.to_string());
            if self.notice_ok {
                Ok("https://chat.example/m/notice".to_string())
            } else {
                Err(DeliveryError::DestinationUnavailable("channel deleted".to_string()))
            }
        }
    }

    fn artifact() -> MediaArtifact {
        MediaArtifact::describe(ArtifactId(0), Path::new("/tmp/clip.mp4"), 300 * 1024 * 1024)
    }

    fn ok(name: &str) -> UploadOutcome {
        UploadOutcome::succeeded(name, ArtifactId(0), UploadReceipt::new(format!("https://{}/x", name)))
    }

    fn finalizer(platform: Arc<FakePlatform>) -> DeliveryFinalizer {
        DeliveryFinalizer::new(platform, &registry(), Duration::from_secs(5))
    }

    fn caption() -> DeliveryCaption {
        DeliveryCaption {
            source: "https://chat.example/m/origin".to_string(),
            label: String::new(),
        }
    }

    #[tokio::test]
    async fn test_direct_delivery() {
        let platform = FakePlatform::new(true, true);
        let dest = PlatformLocation::new("archive");
        let outcome = finalizer(platform.clone())
            .finalize(&artifact(), Some(&dest), &[ok("Catbox")], &caption())
            .await;
        assert_eq!(outcome.method, DeliveryMethod::Direct);
        assert!(platform.notices.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prefers_filebin_when_catbox_skipped() {
        let platform = FakePlatform::new(false, true);
        let dest = PlatformLocation::new("archive");
        let outcomes = vec![
            UploadOutcome::skipped("Catbox", ArtifactId(0), "limit: 200MB"),
            ok("Filebin"),
            UploadOutcome::skipped("Pomf", ArtifactId(0), "limit: 200MB"),
            ok("Fileditch"),
            ok("SodiShare"),
        ];
        let outcome = finalizer(platform.clone())
            .finalize(&artifact(), Some(&dest), &outcomes, &caption())
            .await;

        assert_eq!(outcome.method, DeliveryMethod::FallbackLink);
        assert_eq!(outcome.backend_used.as_deref(), Some("Filebin"));
        assert_eq!(outcome.url.as_deref(), Some("https://Filebin/x"));
        let notices = platform.notices.lock().unwrap();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].contains("https://Filebin/x"));
        assert!(notices[0].contains("file too large"));
    }

    #[tokio::test]
    async fn test_ineligible_backend_never_used() {
        let platform = FakePlatform::new(false, true);
        let dest = PlatformLocation::new("archive");
        let outcome = finalizer(platform)
            .finalize(&artifact(), Some(&dest), &[ok("Fileditch")], &caption())
            .await;
        assert_eq!(outcome.method, DeliveryMethod::None);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_non_preferred_falls_to_priority() {
        let platform = FakePlatform::new(false, true);
        let dest = PlatformLocation::new("archive");
        let outcome = finalizer(platform)
            .finalize(&artifact(), Some(&dest), &[ok("SodiShare"), ok("Pomf")], &caption())
            .await;
        assert_eq!(outcome.backend_used.as_deref(), Some("Pomf"));
    }

    #[tokio::test]
    async fn test_notice_failure_yields_none() {
        let platform = FakePlatform::new(false, false);
        let dest = PlatformLocation::new("archive");
        let outcome = finalizer(platform)
            .finalize(&artifact(), Some(&dest), &[ok("Catbox")], &caption())
            .await;
        assert_eq!(outcome.method, DeliveryMethod::None);
        assert!(outcome.error.as_deref().unwrap().contains("channel deleted"));
    }

    #[tokio::test]
    async fn test_no_destination() {
        let platform = FakePlatform::new(true, true);
        let outcome = finalizer(platform)
            .finalize(&artifact(), None, &[ok("Catbox")], &caption())
            .await;
        assert_eq!(outcome.method, DeliveryMethod::None);
        assert_eq!(outcome.error.as_deref(), Some("no delivery destination configured"));
    }

    #[tokio::test]
    async fn test_idempotent() {
        let platform = FakePlatform::new(false, true);
        let dest = PlatformLocation::new("archive");
        let f = finalizer(platform);
        let outcomes = vec![ok("Pomf"), ok("Catbox")];
        let first = f.finalize(&artifact(), Some(&dest), &outcomes, &caption()).await;
        let second = f.finalize(&artifact(), Some(&dest), &outcomes, &caption()).await;
        assert_eq!(first, second);
        assert_eq!(first.backend_used.as_deref(), Some("Catbox"));
    }

    #[test]
    fn test_outcomes_of_other_artifacts_ignored() {
        let f = finalizer(FakePlatform::new(false, true));
        let other = UploadOutcome::succeeded("Catbox", ArtifactId(1), UploadReceipt::new("https://c/1"));
        assert!(f.select_fallback_link(&artifact(), &[other]).is_none());
    }
}
