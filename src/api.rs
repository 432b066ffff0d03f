use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::Value;

use crate::error::DownloadError;
use crate::models::{ChapterRecord, MangaRecord};
use crate::retry::{RetryPolicy, with_retry};
use crate::transport::Transport;

pub const DEFAULT_BASE_URL: &str = "https://comix.to/api/v2";

/// Number of listing pages requested concurrently per batch.
pub const PAGE_BATCH_SIZE: u32 = 10;

/// Chapters per listing page.
pub const PAGE_LIMIT: u32 = 100;

/// Extracts the manga code from a title URL,
/// e.g. `https://comix.to/title/93q1r-the-summoner` -> `93q1r`.
pub fn extract_manga_code(url: &str) -> Result<String, DownloadError> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let code = last.split('-').next().unwrap_or_default().trim();

    if code.is_empty() || code.contains(':') {
        return Err(DownloadError::ParsingError(format!("Could not extract manga code from URL: {}", url)));
    }
    debug!("Extracted manga code {} from URL {}", code, url);
    Ok(code.to_string())
}

/// Client for the comix.to JSON API. Cheap to clone.
#[derive(Clone)]
pub struct ComixClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    base_url: String,
}

impl ComixClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self::with_base_url(transport, retry, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(transport: Arc<dyn Transport>, retry: RetryPolicy, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            retry,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Same client with a different retry policy.
    pub fn with_retry(&self, retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn manga_url(&self, manga_code: &str) -> String {
        format!("{}/manga/{}/", self.base_url, manga_code)
    }

    pub fn chapter_page_url(&self, manga_code: &str, page: u32) -> String {
        format!(
            "{}/manga/{}/chapters?limit={}&page={}&order[number]=asc",
            self.base_url, manga_code, PAGE_LIMIT, page
        )
    }

    pub fn chapter_url(&self, chapter_id: u64) -> String {
        format!("{}/chapters/{}/", self.base_url, chapter_id)
    }

    pub async fn manga_info(&self, manga_code: &str) -> Result<MangaRecord, DownloadError> {
        let url = self.manga_url(manga_code);
        debug!("Fetching manga info from {}", url);

        let body = with_retry(&self.retry, "manga info fetch", || self.transport.fetch_json(&url)).await?;
        MangaRecord::from_json(result_envelope(&body)?)
    }

    /// Fetches the whole chapter catalog, ordered as the service lists it.
    ///
    /// Listing pages are requested `PAGE_BATCH_SIZE` at a time; the next batch
    /// is only issued when every page of the current one had items. A page
    /// that fails to load counts as empty.
    pub async fn fetch_catalog(&self, manga_code: &str) -> Result<Vec<ChapterRecord>, DownloadError> {
        let mut pages: BTreeMap<u32, Vec<ChapterRecord>> = BTreeMap::new();
        let mut batch_start = 1;

        loop {
            let batch = (batch_start..batch_start + PAGE_BATCH_SIZE).map(|page| self.fetch_chapter_page(manga_code, page));
            let results = join_all(batch).await;

            let mut found_empty = false;
            for (page, items) in results {
                if items.is_empty() {
                    found_empty = true;
                } else {
                    pages.insert(page, items);
                }
            }

            if found_empty {
                break;
            }
            batch_start += PAGE_BATCH_SIZE;
        }

        let page_count = pages.len();
        let chapters: Vec<ChapterRecord> = pages.into_values().flatten().collect();
        info!("Found {} chapters across {} listing pages", chapters.len(), page_count);
        Ok(chapters)
    }

    /// One listing page. Never fails: any fault is logged and reported as an empty page.
    async fn fetch_chapter_page(&self, manga_code: &str, page: u32) -> (u32, Vec<ChapterRecord>) {
        let url = self.chapter_page_url(manga_code, page);
        let parsed = match self.transport.fetch_json(&url).await {
            Ok(body) => parse_chapter_page(&body),
            Err(e) => Err(e),
        };

        match parsed {
            Ok(items) => (page, items),
            Err(e) => {
                warn!("Failed to fetch chapter page {}: {}", page, e);
                (page, Vec::new())
            }
        }
    }

    /// Ordered page image URLs of one chapter.
    pub async fn chapter_images(&self, chapter_id: u64) -> Result<Vec<String>, DownloadError> {
        let url = self.chapter_url(chapter_id);
        debug!("Fetching images for chapter {}", chapter_id);

        let body = with_retry(&self.retry, "image list fetch", || self.transport.fetch_json(&url)).await?;
        let urls: Vec<String> = body["result"]["images"]
            .as_array()
            .map(|images| {
                images
                    .iter()
                    .filter_map(|img| img["url"].as_str())
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| url.trim().to_string())
                    .collect()
            })
            .unwrap_or_default();

        debug!("Found {} images for chapter {}", urls.len(), chapter_id);
        Ok(urls)
    }

    /// Resolves a title URL into its metadata and full chapter catalog.
    pub async fn fetch_catalog_for_url(&self, manga_url: &str) -> Result<(MangaRecord, Vec<ChapterRecord>), DownloadError> {
        let code = extract_manga_code(manga_url)?;
        let manga = self.manga_info(&code).await?;
        let chapters = self.fetch_catalog(&code).await?;
        Ok((manga, chapters))
    }
}

fn result_envelope(body: &Value) -> Result<&Value, DownloadError> {
    match body.get("result") {
        Some(result) if !result.is_null() => Ok(result),
        _ => Err(DownloadError::ParsingError(String::from("response has no result envelope"))),
    }
}

fn parse_chapter_page(body: &Value) -> Result<Vec<ChapterRecord>, DownloadError> {
    let result = result_envelope(body)?;
    match result.get("items").and_then(Value::as_array) {
        Some(items) => Ok(items
            .iter()
            .filter_map(|item| match ChapterRecord::from_json(item) {
                Ok(chapter) => Some(chapter),
                Err(e) => {
                    warn!("Skipping chapter listing item: {}", e);
                    None
                }
            })
            .collect()),
        None => Ok(Vec::new()),
    }
}
