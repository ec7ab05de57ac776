pub mod archiver;

pub use archiver::{
    extract_first_url, ArchivePipeline, ArchiveReport, PipelineConfig, ReportStatus, TriggerContext, TriggerKind,
};
