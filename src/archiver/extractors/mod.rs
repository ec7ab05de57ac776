// Extraction layer - turns a URL into local media files
//
// Two adapters:
// - Cobalt: hosted service, handles single streams and multi-item collections
// - yt-dlp: local tool, single streams only, used when the service is not
//   applicable or failed
//
// The coordinator picks the adapters per URL and owns the fallback rule.

mod cobalt;
mod orchestrator;
mod strategy;
mod traits;
mod ytdlp;

pub use cobalt::{interpret_response, normalize_facebook_url, CobaltExtractor, PickerItem, Resolution, StreamDescriptor};
pub use orchestrator::RetrievalCoordinator;
pub use strategy::{ExtractionPlan, PrimaryMode, StrategySelector};
pub use traits::{ExtractionContext, FallbackExtractor, PrimaryExtractor};
pub use ytdlp::{parse_progress_line, parse_reported_path, scan_for_recent_match, ToolProgress, YtDlpExtractor};
