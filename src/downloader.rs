use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::api::ComixClient;
use crate::assembly::{Assemble, ContainerInfo, assembler_for};
use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::models::{ChapterRecord, MangaRecord};
use crate::pool::bounded;
use crate::progress::{ChapterOutcome, ProgressEvent, ProgressSender, emit};
use crate::retry::{RetryPolicy, with_retry};
use crate::transport::Transport;

/// Materializes selected chapters of one manga on disk. Shared by every
/// chapter task of a batch.
#[derive(Clone)]
pub struct ChapterDownloader {
    client: ComixClient,
    manga: Arc<MangaRecord>,
    config: Arc<DownloadConfig>,
    assembler: Option<Arc<dyn Assemble>>,
    retry: RetryPolicy,
    events: Option<ProgressSender>,
    cancel: CancellationToken,
    shared_numbers: Arc<HashSet<String>>,
}

impl ChapterDownloader {
    pub fn new(client: ComixClient, manga: Arc<MangaRecord>, config: Arc<DownloadConfig>) -> Self {
        let assembler = assembler_for(config.output_format);
        let retry = config.retry_policy();
        Self {
            client,
            manga,
            config,
            assembler,
            retry,
            events: None,
            cancel: CancellationToken::new(),
            shared_numbers: Arc::default(),
        }
    }

    pub fn with_events(mut self, events: ProgressSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Once `cancel` fires no further pages are requested and an unfinished
    /// chapter fails as cancelled, leaving its pages on disk.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Chapter numbers that several releases in the batch share; those
    /// releases get per-release directory and container names.
    pub fn with_shared_numbers(mut self, numbers: HashSet<String>) -> Self {
        self.shared_numbers = Arc::new(numbers);
        self
    }

    pub fn manga_dir(&self) -> PathBuf {
        self.config.download_path.join(self.manga.safe_title())
    }

    pub fn chapter_dir(&self, chapter: &ChapterRecord) -> PathBuf {
        self.manga_dir().join(self.base_name(chapter))
    }

    fn base_name(&self, chapter: &ChapterRecord) -> String {
        if self.shared_numbers.contains(&chapter.number) {
            chapter.release_dir_name()
        } else {
            chapter.dir_name()
        }
    }

    /// Downloads one chapter. Every failure is folded into the outcome.
    pub async fn download_chapter(&self, chapter: &ChapterRecord) -> ChapterOutcome {
        let name = chapter.display_name();
        match self.try_download(chapter).await {
            Ok(message) => {
                info!("{}", message);
                ChapterOutcome::succeeded(chapter.chapter_id, name, message)
            }
            Err(e) => {
                warn!("Failed to download {}: {}", name, e);
                ChapterOutcome::failed(chapter.chapter_id, name.clone(), format!("{}: {}", name, e))
            }
        }
    }

    async fn try_download(&self, chapter: &ChapterRecord) -> Result<String, DownloadError> {
        let name = chapter.display_name();

        let urls = self.client.chapter_images(chapter.chapter_id).await?;
        if urls.is_empty() {
            return Err(DownloadError::PagesUnavailable { chapter_id: chapter.chapter_id });
        }

        let chapter_dir = self.chapter_dir(chapter);
        ensure_dir_exists(&chapter_dir)?;

        let pages = self.download_pages(chapter.chapter_id, &urls, &chapter_dir).await?;
        if pages.len() < urls.len() {
            info!("{}: stopped after {} of {} pages", name, pages.len(), urls.len());
            return Err(DownloadError::Cancelled);
        }

        let Some(assembler) = &self.assembler else {
            return Ok(format!("{} ({} pages)", name, pages.len()));
        };

        let output = self
            .manga_dir()
            .join(format!("{}.{}", self.base_name(chapter), assembler.extension()));
        let info = ContainerInfo {
            series: self.manga.title.clone(),
            number: chapter.number.clone(),
            title: chapter.title.clone(),
            volume: chapter.volume.clone(),
            scanlator: chapter.group_name.clone(),
        };

        let task_assembler = Arc::clone(assembler);
        let task_output = output.clone();
        tokio::task::spawn_blocking(move || task_assembler.assemble(&pages, &info, &task_output))
            .await
            .map_err(|e| DownloadError::Assembly(format!("assembly task failed: {}", e)))??;

        // Raw pages stay on disk unless the container was written
        if !self.config.keep_images {
            if let Err(e) = tokio::fs::remove_dir_all(&chapter_dir).await {
                warn!("Could not remove page images in {}: {}", chapter_dir.display(), e);
            }
        }

        let file_name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{} -> {}", name, file_name))
    }

    /// Downloads every page under the page worker limit. Any page that
    /// exhausts its retries fails the whole chapter. Returns paths in page order;
    /// after cancellation only the pages already dispatched are returned.
    async fn download_pages(&self, chapter_id: u64, urls: &[String], dir: &Path) -> Result<Vec<PathBuf>, DownloadError> {
        let total = urls.len();
        debug!("Downloading {} pages for chapter {} into {}", total, chapter_id, dir.display());

        let transport = self.client.transport();
        let cancel = self.cancel.clone();
        let pending = urls
            .iter()
            .cloned()
            .enumerate()
            .take_while(move |_| !cancel.is_cancelled());
        let mut downloads = bounded(pending, self.config.max_image_workers, |(i, url): (usize, String)| {
            let transport = Arc::clone(&transport);
            let path = dir.join(page_file_name(i, &url));
            let retry = self.retry;
            async move {
                let label = format!("page {} download", i + 1);
                with_retry(&retry, &label, || download_image(&*transport, &url, &path)).await?;
                Ok::<_, DownloadError>((i, path))
            }
        });

        let mut pages = Vec::with_capacity(total);
        while let Some(result) = downloads.next().await {
            pages.push(result?);
            emit(
                self.events.as_ref(),
                ProgressEvent::PageProgress {
                    chapter_id,
                    downloaded: pages.len(),
                    total,
                },
            );
        }

        pages.sort_by_key(|(i, _)| *i);
        Ok(pages.into_iter().map(|(_, path)| path).collect())
    }
}

/// Downloads a single image from a URL to a specified path
pub async fn download_image(transport: &dyn Transport, url: &str, path: &Path) -> Result<(), DownloadError> {
    let bytes = transport.fetch_bytes(url).await?;
    if bytes.is_empty() {
        return Err(DownloadError::transport(url, None, "empty image body"));
    }

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
}

/// Zero-padded, 1-based page file name keeping the image extension of the URL.
pub fn page_file_name(index: usize, url: &str) -> String {
    format!("{:03}.{}", index + 1, image_extension(url))
}

fn image_extension(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    match ext.as_deref() {
        Some("png") => "png",
        Some("webp") => "webp",
        Some("gif") => "gif",
        Some("jpeg") => "jpeg",
        _ => "jpg",
    }
}

/// Ensures a directory exists, creating it if necessary
pub fn ensure_dir_exists(path: &Path) -> Result<(), DownloadError> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Sanitizes a string to be safe as a filename across different operating systems
pub fn sanitize_filename(input: &str) -> String {
    // Forbidden on Windows; also kept out of names on other systems so a
    // download directory can be copied between them
    const INVALID_CHARS: &str = r#"\/:*?"<>|"#;

    let mut result: String = input
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if INVALID_CHARS.contains(c) || c.is_control() { '_' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    if env::consts::OS == "windows" {
        let reserved_names = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
            "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        if reserved_names.iter().any(|&name| result.eq_ignore_ascii_case(name)) {
            result = format!("_{}", result);
        }
        // Windows drops trailing dots
        while result.ends_with('.') {
            result.pop();
        }
    }

    // Ensure filename doesn't start with a dot (hidden file on Unix)
    if result.starts_with('.') {
        result = format!("_{}", result);
    }

    // Some filesystems cap names at 255 bytes
    if result.len() > 255 {
        let mut cut = 255;
        while !result.is_char_boundary(cut) {
            cut -= 1;
        }
        result.truncate(cut);
    }

    result
}
