use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cbz::CbzAssembler;
use crate::config::OutputFormat;
use crate::error::DownloadError;
use crate::pdf::PdfAssembler;

/// What a container needs to know about the chapter it packs.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub series: String,
    pub number: String,
    pub title: Option<String>,
    pub volume: Option<String>,
    pub scanlator: Option<String>,
}

/// Packs ordered page images into a single file.
pub trait Assemble: Send + Sync {
    fn extension(&self) -> &'static str;

    fn assemble(&self, pages: &[PathBuf], info: &ContainerInfo, output: &Path) -> Result<(), DownloadError>;
}

/// Strategy for the configured format; `None` for raw images.
pub fn assembler_for(format: OutputFormat) -> Option<Arc<dyn Assemble>> {
    match format {
        OutputFormat::Images => None,
        OutputFormat::Pdf => Some(Arc::new(PdfAssembler)),
        OutputFormat::Cbz => Some(Arc::new(CbzAssembler)),
    }
}

/// Path of the in-progress file for `output`; renamed into place on success.
pub(crate) fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}
