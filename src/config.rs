use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::DownloadError;
use crate::retry::RetryPolicy;

pub const CHAPTER_WORKERS_RANGE: (usize, usize) = (1, 10);
pub const IMAGE_WORKERS_RANGE: (usize, usize) = (1, 20);
/// Upper bound on the base retry delay, in seconds.
pub const MAX_RETRY_DELAY_SECS: f64 = 300.0;

/// Container a chapter is assembled into once its pages are on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Images,
    Pdf,
    Cbz,
}

impl OutputFormat {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Images => None,
            OutputFormat::Pdf => Some("pdf"),
            OutputFormat::Cbz => Some("cbz"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Images => "images",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Cbz => "cbz",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "images" | "image" | "raw" => Ok(OutputFormat::Images),
            "pdf" => Ok(OutputFormat::Pdf),
            "cbz" => Ok(OutputFormat::Cbz),
            other => Err(DownloadError::Configuration(format!("Unknown output format: {}", other))),
        }
    }
}

/// Settings for one download batch. Immutable while the batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub output_format: OutputFormat,
    /// Keep the page images after they were assembled into a PDF or CBZ
    pub keep_images: bool,
    pub enable_logs: bool,
    pub max_chapter_workers: usize,
    pub max_image_workers: usize,
    pub download_path: PathBuf,
    pub retry_count: u32,
    /// Base delay between retries, in seconds
    pub retry_delay: f64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Images,
            keep_images: false,
            enable_logs: false,
            max_chapter_workers: 3,
            max_image_workers: 5,
            download_path: PathBuf::from("downloads"),
            retry_count: 3,
            retry_delay: 2.0,
        }
    }
}

impl DownloadConfig {
    /// Pulls every bounded setting back into its allowed range.
    pub fn clamped(mut self) -> Self {
        self.max_chapter_workers = self
            .max_chapter_workers
            .clamp(CHAPTER_WORKERS_RANGE.0, CHAPTER_WORKERS_RANGE.1);
        self.max_image_workers = self
            .max_image_workers
            .clamp(IMAGE_WORKERS_RANGE.0, IMAGE_WORKERS_RANGE.1);
        self.retry_count = self.retry_count.max(1);
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            self.retry_delay = 0.0;
        }
        self.retry_delay = self.retry_delay.min(MAX_RETRY_DELAY_SECS);
        self
    }

    pub fn validate(&self) -> Result<(), DownloadError> {
        let (lo, hi) = CHAPTER_WORKERS_RANGE;
        if !(lo..=hi).contains(&self.max_chapter_workers) {
            return Err(DownloadError::Configuration(format!(
                "max_chapter_workers must be between {} and {}, got {}",
                lo, hi, self.max_chapter_workers
            )));
        }
        let (lo, hi) = IMAGE_WORKERS_RANGE;
        if !(lo..=hi).contains(&self.max_image_workers) {
            return Err(DownloadError::Configuration(format!(
                "max_image_workers must be between {} and {}, got {}",
                lo, hi, self.max_image_workers
            )));
        }
        if self.retry_count == 0 {
            return Err(DownloadError::Configuration(String::from("retry_count must be at least 1")));
        }
        if !self.retry_delay.is_finite() || !(0.0..=MAX_RETRY_DELAY_SECS).contains(&self.retry_delay) {
            return Err(DownloadError::Configuration(format!(
                "retry_delay must be between 0 and {} seconds, got {}",
                MAX_RETRY_DELAY_SECS, self.retry_delay
            )));
        }
        if self.download_path.as_os_str().is_empty() {
            return Err(DownloadError::Configuration(String::from("download_path must not be empty")));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let delay = Duration::try_from_secs_f64(self.retry_delay.min(MAX_RETRY_DELAY_SECS)).unwrap_or(Duration::ZERO);
        RetryPolicy::new(self.retry_count, delay)
    }

    /// Loads settings from a JSON file. A missing or unreadable file yields the defaults.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Self::default();
        }

        let parsed = File::open(path)
            .map_err(DownloadError::from)
            .and_then(|file| serde_json::from_reader::<_, Self>(file).map_err(DownloadError::from));

        match parsed {
            Ok(config) => {
                debug!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                warn!("Failed to load config from {:?}: {}. Using defaults.", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), DownloadError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        debug!("Saved config to {:?}", path);
        Ok(())
    }
}

/// Where the config file lives when no explicit path is given.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("comix-dl").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}
