// Expose modules for integration testing
pub mod api;
pub mod assembly;
pub mod cbz;
pub mod config;
pub mod downloader;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod pdf;
pub mod pool;
pub mod progress;
pub mod retry;
pub mod selection;
pub mod transport;

// Re-export important types for easier use in tests
pub use api::{ComixClient, extract_manga_code};
pub use config::{DownloadConfig, OutputFormat};
pub use downloader::ChapterDownloader;
pub use error::DownloadError;
pub use models::{ChapterRecord, MangaRecord};
pub use orchestrator::{BatchReport, DownloadOrchestrator};
pub use progress::{ChapterOutcome, ProgressEvent, progress_channel};
pub use retry::RetryPolicy;
pub use selection::{parse_selection, select_releases};
pub use transport::{HttpTransport, Transport};
