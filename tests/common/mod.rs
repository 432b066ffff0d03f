#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use comix_dl::{ChapterRecord, ComixClient, DownloadError, RetryPolicy, Transport};

pub const BASE_URL: &str = "http://fake.test/api";

/// In-memory service. Unknown URLs answer 404; `delays` hold responses back to
/// reorder completions.
#[derive(Default)]
pub struct FakeTransport {
    json: HashMap<String, Value>,
    bytes: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json(mut self, url: impl Into<String>, body: Value) -> Self {
        self.json.insert(url.into(), body);
        self
    }

    pub fn bytes(mut self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.bytes.insert(url.into(), body);
        self
    }

    pub fn delay(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(url.into(), delay);
        self
    }

    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn panicking(mut self, url: impl Into<String>) -> Self {
        self.panicking.insert(url.into());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == url).count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, url: &str) -> Result<(), DownloadError> {
        self.requests.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panicking.contains(url) {
            panic!("simulated crash while fetching {}", url);
        }
        if self.failing.contains(url) {
            return Err(DownloadError::transport(url, Some(500), "Internal Server Error"));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_json(&self, url: &str) -> Result<Value, DownloadError> {
        self.enter(url).await?;
        self.json
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::transport(url, Some(404), "Not Found"))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.enter(url).await?;
        self.bytes
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::transport(url, Some(404), "Not Found"))
    }
}

pub fn client(transport: std::sync::Arc<FakeTransport>) -> ComixClient {
    ComixClient::with_base_url(transport, RetryPolicy::new(2, Duration::ZERO), BASE_URL)
}

pub fn page_url(code: &str, page: u32) -> String {
    format!("{}/manga/{}/chapters?limit=100&page={}&order[number]=asc", BASE_URL, code, page)
}

pub fn chapter_url(chapter_id: u64) -> String {
    format!("{}/chapters/{}/", BASE_URL, chapter_id)
}

pub fn image_url(chapter_id: u64, page: usize) -> String {
    format!("http://cdn.fake.test/{}/{:03}.png", chapter_id, page)
}

/// A listing page holding chapters `first..first + count`, ids equal to numbers.
pub fn listing(first: u64, count: u64) -> Value {
    let items: Vec<Value> = (first..first + count)
        .map(|n| {
            json!({
                "chapter_id": n,
                "number": n.to_string(),
                "name": format!("Part {}", n),
                "scanlation_group": {"name": "GroupA"},
                "pages_count": 2
            })
        })
        .collect();
    json!({"result": {"items": items}})
}

pub fn empty_listing() -> Value {
    json!({"result": {"items": []}})
}

pub fn image_list(urls: &[String]) -> Value {
    let images: Vec<Value> = urls.iter().map(|u| json!({"url": u})).collect();
    json!({"result": {"images": images}})
}

pub fn png_bytes() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 12, image::Rgb([30, 60, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub fn chapter(id: u64, number: &str, group: Option<&str>) -> ChapterRecord {
    ChapterRecord {
        chapter_id: id,
        number: number.to_string(),
        title: None,
        volume: None,
        votes: None,
        group_name: group.map(str::to_string),
        pages_count: 0,
    }
}

/// Registers a chapter with `pages` valid PNG pages.
pub fn with_chapter(transport: FakeTransport, chapter_id: u64, pages: usize) -> FakeTransport {
    let urls: Vec<String> = (1..=pages).map(|p| image_url(chapter_id, p)).collect();
    let mut transport = transport.json(chapter_url(chapter_id), image_list(&urls));
    for url in urls {
        transport = transport.bytes(url, png_bytes());
    }
    transport
}
