use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
use zip::CompressionMethod;
use zip::write::FileOptions;

use crate::assembly::{Assemble, ContainerInfo, partial_path};
use crate::error::DownloadError;

/// Comic book archive: the page images in page order plus a `ComicInfo.xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CbzAssembler;

impl Assemble for CbzAssembler {
    fn extension(&self) -> &'static str {
        "cbz"
    }

    fn assemble(&self, pages: &[PathBuf], info: &ContainerInfo, output: &Path) -> Result<(), DownloadError> {
        if pages.is_empty() {
            return Err(DownloadError::Assembly(String::from("Cannot create CBZ: no pages provided")));
        }

        // Catch undecodable pages before anything is written
        for page in pages {
            image::image_dimensions(page)
                .map_err(|e| DownloadError::Assembly(format!("Unreadable page {}: {}", page.display(), e)))?;
        }

        let partial = partial_path(output);
        let result = write_archive(pages, info, &partial).and_then(|_| fs::rename(&partial, output).map_err(DownloadError::from));
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        } else {
            info!("CBZ created with {} pages: {}", pages.len(), output.display());
        }
        result
    }
}

fn write_archive(pages: &[PathBuf], info: &ContainerInfo, path: &Path) -> Result<(), DownloadError> {
    let file = File::create(path)?;
    let mut zip = zip::ZipWriter::new(BufWriter::new(file));
    // Page images are already compressed
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("ComicInfo.xml", deflated)?;
    zip.write_all(comic_info_xml(info, pages.len()).as_bytes())?;

    for (i, page) in pages.iter().enumerate() {
        let ext = page.extension().and_then(|e| e.to_str()).unwrap_or("jpg");
        let entry = format!("{:03}.{}", i + 1, ext.to_lowercase());
        debug!("Adding {} as {}", page.display(), entry);

        zip.start_file(entry, stored)?;
        let mut source = File::open(page)?;
        io::copy(&mut source, &mut zip)?;
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(())
}

fn comic_info_xml(info: &ContainerInfo, page_count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<ComicInfo>\n");
    push_tag(&mut xml, "Series", Some(info.series.as_str()));
    push_tag(&mut xml, "Number", Some(info.number.as_str()));
    push_tag(&mut xml, "Title", info.title.as_deref());
    push_tag(&mut xml, "Volume", info.volume.as_deref());
    push_tag(&mut xml, "Translator", info.scanlator.as_deref());
    xml.push_str(&format!("  <PageCount>{}</PageCount>\n", page_count));
    xml.push_str("  <Manga>Yes</Manga>\n</ComicInfo>\n");
    xml
}

fn push_tag(xml: &mut String, tag: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        xml.push_str(&format!("  <{tag}>{}</{tag}>\n", escape_xml(value.trim())));
    }
}

fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
