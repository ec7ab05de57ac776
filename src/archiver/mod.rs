// Archiver module - media retrieval and upload distribution pipeline

pub mod backends;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod extractors;
pub mod fanout;
pub mod local;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod report;
pub mod tools;
pub mod traits;
pub mod trigger;
pub mod utils;

pub use config::PipelineConfig;
pub use delivery::{DeliveryCaption, DeliveryFinalizer};
pub use errors::{ConfigError, DeliveryError, ExtractionError, SinkError, UploadError};
pub use fanout::UploadFanout;
pub use models::{
    ArtifactId, DeliveryMethod, DeliveryOutcome, ExtractionMethod, ExtractionOutcome, MediaArtifact, PlatformLocation,
    ProgressEvent, RequestId, RetrievalRequest, Severity, SizeLimit, UploadBackendDescriptor, UploadOutcome,
    UploadReceipt,
};
pub use orchestrator::ArchivePipeline;
pub use progress::{ProgressReporter, ThrottleProfile};
pub use report::{ArchiveReport, ReportStatus};
pub use traits::{DeliveryPlatform, StatusLocation, StatusSink, UploadBackend};
pub use trigger::{extract_first_url, TriggerContext, TriggerKind};
