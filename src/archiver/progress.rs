// Progress reporting: throttling and best-effort delivery to the status sink
//
// Every run owns its reporter and every transfer owns its throttle, so no
// state is shared between concurrent runs.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::errors::SinkError;
use super::models::{ProgressEvent, Severity};
use super::traits::{StatusLocation, StatusSink};
use super::utils::{format_mb, progress_bar};

/// Upper bound for one status edit
const STATUS_UPDATE_TIMEOUT: Duration = Duration::from_secs(15);

const BAR_LENGTH: usize = 20;

/// Thresholds governing how often progress reaches the observer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThrottleProfile {
    /// Emit when this much time passed since the last emission
    pub interval_ms: u64,
    /// Hard floor between two emissions
    pub min_interval_ms: u64,
    /// Emit when the percentage moved by more than this
    pub percent_step: f64,
    /// Percentage treated as complete
    pub complete_at: f64,
}

impl ThrottleProfile {
    /// Byte-streamed downloads from the hosted service
    pub const fn hosted() -> Self {
        Self {
            interval_ms: 500,
            min_interval_ms: 100,
            percent_step: 5.0,
            complete_at: 99.5,
        }
    }

    /// Coarser progress lines from the extraction tool
    pub const fn tool() -> Self {
        Self {
            interval_ms: 1000,
            min_interval_ms: 250,
            percent_step: 2.0,
            complete_at: 99.5,
        }
    }
}

/// Per-operation throttle state
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    profile: ThrottleProfile,
    last_emit: Option<Instant>,
    last_percent: f64,
}

impl ProgressThrottle {
    pub fn new(profile: ThrottleProfile) -> Self {
        Self {
            profile,
            last_emit: None,
            last_percent: 0.0,
        }
    }

    /// Decide whether an update at `percent` goes out now; records it if so
    pub fn should_emit(&mut self, now: Instant, percent: f64) -> bool {
        let percent = percent.clamp(0.0, 100.0);
        let elapsed = self.last_emit.map(|t| now.saturating_duration_since(t));

        if let Some(elapsed) = elapsed {
            if elapsed < Duration::from_millis(self.profile.min_interval_ms) {
                return false;
            }
        }

        let due = elapsed.map_or(true, |e| e > Duration::from_millis(self.profile.interval_ms));
        let moved = (percent - self.last_percent).abs() > self.profile.percent_step;
        let complete = percent >= self.profile.complete_at;

        if due || moved || complete {
            self.last_emit = Some(now);
            self.last_percent = percent;
            true
        } else {
            false
        }
    }

    /// The closing 100% event; bypasses the throttle once
    pub fn finish(&mut self, now: Instant) -> bool {
        if self.last_percent < 100.0 {
            self.last_emit = Some(now);
            self.last_percent = 100.0;
            true
        } else {
            false
        }
    }

    pub fn last_percent(&self) -> f64 {
        self.last_percent
    }
}

/// Fire-and-forget handle for status updates of one run
#[derive(Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

/// Owns the delivery task behind a reporter
pub struct ReporterHandle {
    task: JoinHandle<()>,
}

impl ReporterHandle {
    /// Wait until every queued update has been handed to the sink.
    /// Completes once all reporter clones are dropped.
    pub async fn finish(self) {
        if let Err(e) = self.task.await {
            tracing::warn!("[Progress] delivery task ended abnormally: {}", e);
        }
    }
}

impl ProgressReporter {
    /// Spawn the delivery task for one status location
    pub fn start(sink: Arc<dyn StatusSink>, location: StatusLocation) -> (Self, ReporterHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

        let task = tokio::spawn(async move {
            while let Some(mut event) = rx.recv().await {
                // A slow sink only ever renders the newest state
                while let Ok(newer) = rx.try_recv() {
                    event = newer;
                }
                deliver(sink.as_ref(), &location, &event).await;
            }
        });

        (Self { tx: Some(tx) }, ReporterHandle { task })
    }

    /// Reporter that drops everything
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn report(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::debug!("[Progress] delivery task gone, update dropped");
            }
        }
    }

    pub fn info(&self, title: &str, body: impl Into<String>) {
        self.report(ProgressEvent::info(title, body));
    }

    pub fn warn(&self, title: &str, body: impl Into<String>) {
        self.report(ProgressEvent::warn(title, body));
    }
}

async fn deliver(sink: &dyn StatusSink, location: &StatusLocation, event: &ProgressEvent) {
    let update = sink.update_status(location, &event.title, &event.body, event.severity);
    match tokio::time::timeout(STATUS_UPDATE_TIMEOUT, update).await {
        Ok(Ok(())) => {}
        Ok(Err(SinkError::TargetGone)) => {
            tracing::debug!(
                "[Progress] status message {} is gone, update skipped",
                location.message_id
            );
        }
        Ok(Err(e)) => {
            tracing::warn!("[Progress] failed to update status {}: {}", location.message_id, e);
        }
        Err(_) => {
            tracing::warn!(
                "[Progress] status update {} timed out after {}s",
                location.message_id,
                STATUS_UPDATE_TIMEOUT.as_secs()
            );
        }
    }
}

/// Throttled progress for one byte transfer
pub struct TransferProgress<'a> {
    reporter: &'a ProgressReporter,
    throttle: ProgressThrottle,
    title: String,
    total: Option<u64>,
    downloaded: u64,
}

impl<'a> TransferProgress<'a> {
    pub fn new(reporter: &'a ProgressReporter, title: impl Into<String>, profile: ThrottleProfile) -> Self {
        Self {
            reporter,
            throttle: ProgressThrottle::new(profile),
            title: title.into(),
            total: None,
            downloaded: 0,
        }
    }

    /// Record the transfer position; emits only when the throttle allows
    pub fn update(&mut self, downloaded: u64, total: Option<u64>, eta_secs: Option<u64>) {
        self.downloaded = downloaded;
        if let Some(total) = total.filter(|t| *t > 0) {
            self.total = Some(total);
        }
        let Some(total) = self.total else {
            return;
        };

        let percent = downloaded as f64 / total as f64 * 100.0;
        if !self.throttle.should_emit(Instant::now(), percent) {
            return;
        }

        let eta = eta_secs.map(|s| format!(" ETA: {}s", s)).unwrap_or_default();
        self.reporter.report(ProgressEvent::info(
            self.title.clone(),
            format!(
                "Downloading: {} {:.2}%\n({}MB / {}MB){}",
                progress_bar(percent, BAR_LENGTH),
                percent.min(100.0),
                format_mb(downloaded),
                format_mb(total),
                eta
            ),
        ));
    }

    /// Close the stream, guaranteeing the observer sees 100%
    pub fn finish(&mut self) {
        let total = self.total.unwrap_or(self.downloaded);
        if total == 0 {
            return;
        }
        if self.throttle.finish(Instant::now()) {
            let mb = format_mb(total);
            self.reporter.report(ProgressEvent::new(
                self.title.clone(),
                format!(
                    "Download complete!\n\n{} 100.00%\n{}MB / {}MB",
                    progress_bar(100.0, BAR_LENGTH),
                    mb,
                    mb
                ),
                Severity::Success,
            ));
        }
    }

    pub fn last_percent(&self) -> f64 {
        self.throttle.last_percent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_first_update_emits() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::hosted());
        assert!(throttle.should_emit(Instant::now(), 0.1));
    }

    #[test]
    fn test_small_change_within_interval_is_held() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::hosted());
        let t0 = Instant::now();
        assert!(throttle.should_emit(t0, 10.0));
        assert!(!throttle.should_emit(t0 + ms(200), 12.0));
        // interval elapsed
        assert!(throttle.should_emit(t0 + ms(600), 13.0));
    }

    #[test]
    fn test_large_jump_emits_after_floor() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::hosted());
        let t0 = Instant::now();
        assert!(throttle.should_emit(t0, 10.0));
        // big jump but inside the hard floor
        assert!(!throttle.should_emit(t0 + ms(50), 40.0));
        assert!(throttle.should_emit(t0 + ms(150), 40.0));
    }

    #[test]
    fn test_tool_profile_step() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::tool());
        let t0 = Instant::now();
        assert!(throttle.should_emit(t0, 10.0));
        assert!(!throttle.should_emit(t0 + ms(300), 11.5));
        assert!(throttle.should_emit(t0 + ms(600), 12.5));
    }

    #[test]
    fn test_near_complete_emits() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::tool());
        let t0 = Instant::now();
        assert!(throttle.should_emit(t0, 98.5));
        assert!(throttle.should_emit(t0 + ms(260), 99.6));
    }

    #[test]
    fn test_never_faster_than_floor() {
        let profile = ThrottleProfile::hosted();
        let mut throttle = ProgressThrottle::new(profile);
        let t0 = Instant::now();
        let mut emitted = Vec::new();
        for step in 0..200u64 {
            let now = t0 + ms(step * 7);
            if throttle.should_emit(now, step as f64 * 0.5) {
                emitted.push(now);
            }
        }
        assert!(emitted.len() > 1);
        for pair in emitted.windows(2) {
            assert!(pair[1] - pair[0] >= ms(profile.min_interval_ms));
        }
    }

    #[test]
    fn test_finish_once() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::hosted());
        let t0 = Instant::now();
        assert!(throttle.should_emit(t0, 42.0));
        // bypasses the floor
        assert!(throttle.finish(t0 + ms(1)));
        assert!(!throttle.finish(t0 + ms(2)));
    }

    #[test]
    fn test_finish_after_full_emission_is_noop() {
        let mut throttle = ProgressThrottle::new(ThrottleProfile::hosted());
        assert!(throttle.should_emit(Instant::now(), 100.0));
        assert!(!throttle.finish(Instant::now()));
    }

    struct RecordingSink {
        events: Mutex<Vec<(String, Severity)>>,
        fail_with: Option<SinkError>,
    }

    #[async_trait]
    impl StatusSink for RecordingSink {
        async fn update_status(
            &self,
            _location: &StatusLocation,
            title: &str,
            _body: &str,
            severity: Severity,
        ) -> Result<(), SinkError> {
            self.events.lock().unwrap().push((title.to_string(), severity));
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn location() -> StatusLocation {
        StatusLocation::new(crate::archiver::models::PlatformLocation::new("c"), "m")
    }

    #[tokio::test]
    async fn test_reporter_delivers_last_state() {
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
            fail_with: None,
        });
        let (reporter, handle) = ProgressReporter::start(sink.clone(), location());
        reporter.info("first", "a");
        reporter.report(ProgressEvent::new("last", "b", Severity::Success));
        drop(reporter);
        handle.finish().await;

        let events = sink.events.lock().unwrap();
        assert!(!events.is_empty());
        assert_eq!(events.last().unwrap(), &("last".to_string(), Severity::Success));
    }

    #[tokio::test]
    async fn test_reporter_swallows_sink_errors() {
        for err in [SinkError::TargetGone, SinkError::Other("boom".to_string())] {
            let sink = Arc::new(RecordingSink {
                events: Mutex::new(Vec::new()),
                fail_with: Some(err),
            });
            let (reporter, handle) = ProgressReporter::start(sink.clone(), location());
            reporter.warn("t", "b");
            drop(reporter);
            handle.finish().await;
            assert_eq!(sink.events.lock().unwrap().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_transfer_progress_final_event() {
        let sink = Arc::new(RecordingSink {
            events: Mutex::new(Vec::new()),
            fail_with: None,
        });
        let (reporter, handle) = ProgressReporter::start(sink.clone(), location());
        {
            let mut transfer = TransferProgress::new(&reporter, "dl", ThrottleProfile::hosted());
            transfer.update(10, Some(1000), None);
            transfer.update(20, Some(1000), None);
            transfer.finish();
            assert_eq!(transfer.last_percent(), 100.0);
        }
        drop(reporter);
        handle.finish().await;

        let events = sink.events.lock().unwrap();
        assert_eq!(events.last().unwrap().1, Severity::Success);
    }

    #[test]
    fn test_disabled_reporter_is_silent() {
        let reporter = ProgressReporter::disabled();
        reporter.info("x", "y");
    }
}
