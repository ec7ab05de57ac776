// Extraction strategy selection - pure URL classification, no I/O
//
// Collections go to the hosted service only: the local tool does not
// understand multi-item posts and would return partial results.

use reqwest::Url;

use crate::archiver::config::PipelineConfig;
use crate::archiver::models::ExtractionMethod;

/// How the hosted service should be asked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryMode {
    Single,
    Collection,
}

/// Ordered plan of at most two attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub primary: Option<PrimaryMode>,
    pub fallback: bool,
}

impl ExtractionPlan {
    pub fn is_collection(&self) -> bool {
        self.primary == Some(PrimaryMode::Collection)
    }

    pub fn attempts(&self) -> Vec<ExtractionMethod> {
        let mut attempts = Vec::with_capacity(2);
        if self.primary.is_some() {
            attempts.push(ExtractionMethod::Primary);
        }
        if self.fallback {
            attempts.push(ExtractionMethod::Fallback);
        }
        attempts
    }
}

/// Classifies URLs against the hosted service's site list
#[derive(Debug, Clone)]
pub struct StrategySelector {
    supported_sites: Vec<String>,
    collection_patterns: Vec<String>,
}

impl StrategySelector {
    pub fn new(supported_sites: Vec<String>, collection_patterns: Vec<String>) -> Self {
        Self {
            supported_sites: supported_sites.into_iter().map(|s| s.to_lowercase()).collect(),
            collection_patterns: collection_patterns
                .into_iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.supported_sites.clone(), config.collection_patterns.clone())
    }

    pub fn classify(&self, url: &str) -> ExtractionPlan {
        let Some((host, path)) = host_and_path(url) else {
            // Let the tool report what is wrong with it
            return ExtractionPlan {
                primary: None,
                fallback: true,
            };
        };

        if self
            .collection_patterns
            .iter()
            .any(|pattern| matches_collection(&host, &path, pattern))
        {
            return ExtractionPlan {
                primary: Some(PrimaryMode::Collection),
                fallback: false,
            };
        }

        if self.is_supported_host(&host) {
            return ExtractionPlan {
                primary: Some(PrimaryMode::Single),
                fallback: true,
            };
        }

        ExtractionPlan {
            primary: None,
            fallback: true,
        }
    }

    fn is_supported_host(&self, host: &str) -> bool {
        self.supported_sites.iter().any(|site| on_site(host, site))
    }
}

/// `host` is `site` or one of its subdomains
fn on_site(host: &str, site: &str) -> bool {
    let site = site.strip_prefix("www.").unwrap_or(site);
    host == site || host.ends_with(&format!(".{}", site))
}

/// `pattern` is `<site>/<path prefix>`; any subdomain of the site matches
fn matches_collection(host: &str, path: &str, pattern: &str) -> bool {
    let (site, prefix) = pattern.split_once('/').unwrap_or((pattern, ""));
    on_site(host, site) && path.trim_start_matches('/').starts_with(prefix)
}

/// Lowercased host without `www.` plus the path
fn host_and_path(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    Some((host, parsed.path().to_string()))
}
