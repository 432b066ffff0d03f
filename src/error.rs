use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum DownloadError {
    /// Network fault, timeout or non-2xx response. `status` is absent when no
    /// response was received at all.
    Transport {
        status: Option<u16>,
        url: String,
        message: String,
    },
    PagesUnavailable { chapter_id: u64 },
    Assembly(String),
    Configuration(String),
    Selection(String),
    /// The batch was cancelled before this work could finish.
    Cancelled,
    IoError(std::io::Error),
    ParsingError(String),
}

impl DownloadError {
    pub fn transport(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        DownloadError::Transport {
            status,
            url: url.into(),
            message: message.into(),
        }
    }

    /// Whether re-issuing the failed operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadError::Transport { .. } | DownloadError::IoError(_))
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Transport { status: Some(status), url, .. } => {
                write!(f, "HTTP error {} for URL {}", status, url)
            }
            DownloadError::Transport { status: None, url, message } => {
                write!(f, "Failed to make HTTP request to {}: {}", url, message)
            }
            DownloadError::Cancelled => write!(f, "cancelled"),
            DownloadError::PagesUnavailable { chapter_id } => {
                write!(f, "No pages available for chapter {}", chapter_id)
            }
            DownloadError::Assembly(msg) => write!(f, "Assembly failed: {}", msg),
            DownloadError::Configuration(msg) => write!(f, "Invalid configuration: {}", msg),
            DownloadError::Selection(msg) => write!(f, "Invalid selection: {}", msg),
            DownloadError::IoError(e) => write!(f, "IO operation failed: {}", e),
            DownloadError::ParsingError(msg) => write!(f, "Failed to parse response: {}", msg),
        }
    }
}

impl Error for DownloadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DownloadError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        let status = err.status().map(|s| s.as_u16());
        DownloadError::transport(url, status, err.to_string())
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::IoError(err)
    }
}

impl From<serde_json::Error> for DownloadError {
    fn from(err: serde_json::Error) -> Self {
        DownloadError::ParsingError(err.to_string())
    }
}

impl From<zip::result::ZipError> for DownloadError {
    fn from(err: zip::result::ZipError) -> Self {
        DownloadError::Assembly(format!("CBZ archive error: {}", err))
    }
}

impl From<genpdf::error::Error> for DownloadError {
    fn from(err: genpdf::error::Error) -> Self {
        DownloadError::Assembly(format!("PDF generation error: {}", err))
    }
}

impl From<image::ImageError> for DownloadError {
    fn from(err: image::ImageError) -> Self {
        DownloadError::Assembly(format!("Image processing error: {}", err))
    }
}
