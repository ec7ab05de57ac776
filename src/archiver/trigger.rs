// Trigger context: who asked for a run and where its status goes

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::models::PlatformLocation;
use super::traits::{StatusLocation, StatusSink};

lazy_static! {
    static ref CUSTOM_EMOJI: Regex = Regex::new(r"<a?:\w+:\d+>").unwrap();
    static ref URL: Regex = Regex::new(r#"https?://[^\s<>"]+"#).unwrap();
}

/// How the run was started. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Command,
    WatchedEvent,
    DirectMessage,
}

/// Everything a trigger layer hands to the pipeline
#[derive(Clone)]
pub struct TriggerContext {
    pub kind: TriggerKind,
    /// Location the request came from; drives the routing tables
    pub origin: PlatformLocation,
    /// Explicit destination chosen by the trigger
    pub destination: Option<PlatformLocation>,
    pub status_sink: Arc<dyn StatusSink>,
    pub status_location: StatusLocation,
    /// Link to the message that caused the run
    pub source_link: Option<String>,
}

impl TriggerContext {
    pub fn new(
        kind: TriggerKind,
        origin: PlatformLocation,
        status_sink: Arc<dyn StatusSink>,
        status_location: StatusLocation,
    ) -> Self {
        Self {
            kind,
            origin,
            destination: None,
            status_sink,
            status_location,
            source_link: None,
        }
    }

    pub fn with_destination(mut self, destination: PlatformLocation) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_source_link(mut self, link: impl Into<String>) -> Self {
        self.source_link = Some(link.into());
        self
    }
}

/// First http(s) URL in a chat message, ignoring custom emoji markup
pub fn extract_first_url(text: &str) -> Option<String> {
    let cleaned = CUSTOM_EMOJI.replace_all(text, "");
    URL.find(&cleaned).map(|m| m.as_str().to_string())
}
