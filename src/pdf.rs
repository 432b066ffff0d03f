use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};

use crate::assembly::{Assemble, ContainerInfo, partial_path};
use crate::error::DownloadError;

type FontFamily = genpdf::fonts::FontFamily<genpdf::fonts::FontData>;

/// A4 width in mm
const PAGE_WIDTH_MM: f64 = 210.0;
const HORIZONTAL_MARGIN_MM: f64 = 12.0;
/// Resolution assumed when converting pixels to mm
const ASSUMED_DPI: f64 = 300.0;

/// One page image per A4 page, scaled to the page width.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAssembler;

impl Assemble for PdfAssembler {
    fn extension(&self) -> &'static str {
        "pdf"
    }

    fn assemble(&self, pages: &[PathBuf], info: &ContainerInfo, output: &Path) -> Result<(), DownloadError> {
        create_pdf_from_images(pages, info, output)
    }
}

/// Generates a PDF from page images. Nothing is left at `output` on failure.
pub fn create_pdf_from_images(image_paths: &[PathBuf], info: &ContainerInfo, output_path: &Path) -> Result<(), DownloadError> {
    if image_paths.is_empty() {
        return Err(DownloadError::Assembly(String::from("Cannot create PDF: no images provided")));
    }

    debug!("Creating PDF from {} images", image_paths.len());
    trace!("Output path: {:?}", output_path);

    // Decode every page first so a broken image fails before any font lookup or rendering
    let scratch_dir = scratch_dir_for(output_path);
    let result = image_paths
        .iter()
        .map(|path| prepare_page(path, &scratch_dir))
        .collect::<Result<Vec<_>, _>>()
        .and_then(|prepared| render(&prepared, info, output_path));
    if scratch_dir.exists() {
        let _ = fs::remove_dir_all(&scratch_dir);
    }
    result
}

struct PreparedPage {
    path: PathBuf,
    width_px: u32,
}

/// Loads a page. Anything but an opaque JPEG is re-encoded as an RGB JPEG in
/// `scratch_dir`, since the PDF writer cannot embed transparency and only
/// reliably decodes JPEG.
fn prepare_page(path: &Path, scratch_dir: &Path) -> Result<PreparedPage, DownloadError> {
    let img = image::open(path)
        .map_err(|e| DownloadError::Assembly(format!("Failed to load image {}: {}", path.display(), e)))?;
    let width_px = img.width();

    let is_plain_jpeg = matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref(),
        Some("jpg") | Some("jpeg")
    );
    if !img.color().has_alpha() && is_plain_jpeg {
        return Ok(PreparedPage { path: path.to_path_buf(), width_px });
    }

    fs::create_dir_all(scratch_dir)?;
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("page");
    let converted = scratch_dir.join(format!("{}.jpg", stem));
    image::DynamicImage::ImageRgb8(img.to_rgb8()).save(&converted)?;
    trace!("Converted {} to {}", path.display(), converted.display());

    Ok(PreparedPage { path: converted, width_px })
}

fn render(pages: &[PreparedPage], info: &ContainerInfo, output_path: &Path) -> Result<(), DownloadError> {
    let font_family = find_system_font()
        .map_err(|e| DownloadError::Assembly(format!("Failed to load font: {}", e)))?;

    let mut doc = genpdf::Document::new(font_family);
    doc.set_title(document_title(info));
    doc.set_paper_size(genpdf::PaperSize::A4);

    let available_width = PAGE_WIDTH_MM - HORIZONTAL_MARGIN_MM;
    for (i, page) in pages.iter().enumerate() {
        let img_width_mm = page.width_px.max(1) as f64 * 25.4 / ASSUMED_DPI;
        let scale_factor = available_width / img_width_mm;
        trace!("Page {}/{}: width {}px, scale {:.2}", i + 1, pages.len(), page.width_px, scale_factor);

        let img = genpdf::elements::Image::from_path(&page.path)
            .map_err(|e| DownloadError::Assembly(format!("Failed to embed image: {}", e)))?
            .with_alignment(genpdf::Alignment::Center)
            .with_scale(genpdf::Scale::new(scale_factor, scale_factor));
        doc.push(img);

        if i + 1 < pages.len() {
            doc.push(genpdf::elements::PageBreak::new());
        }
    }

    let partial = partial_path(output_path);
    debug!("Rendering PDF to file: {:?}", partial);
    let rendered = doc
        .render_to_file(&partial)
        .map_err(DownloadError::from)
        .and_then(|_| fs::rename(&partial, output_path).map_err(DownloadError::from));
    if rendered.is_err() {
        let _ = fs::remove_file(&partial);
    } else {
        info!("PDF created with {} pages: {}", pages.len(), output_path.display());
    }
    rendered
}

fn document_title(info: &ContainerInfo) -> String {
    match (&info.title, info.series.is_empty()) {
        (Some(title), false) => format!("{} - Chapter {}: {}", info.series, info.number, title),
        (None, false) => format!("{} - Chapter {}", info.series, info.number),
        _ => String::from("Manga Chapter"),
    }
}

fn scratch_dir_for(output_path: &Path) -> PathBuf {
    let mut name = output_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".pages");
    output_path.with_file_name(name)
}

/// First usable font from the platform font directories.
fn find_system_font() -> Result<FontFamily, String> {
    debug!("Looking for suitable font");

    for (dir, file) in get_platform_font_paths() {
        let font_path = Path::new(&dir).join(file);
        if !font_path.exists() {
            continue;
        }
        trace!("Trying font: {}", font_path.display());

        match fs::read(&font_path).map_err(|e| e.to_string()).and_then(|bytes| {
            genpdf::fonts::FontData::new(bytes, None).map_err(|e| e.to_string())
        }) {
            Ok(font_data) => {
                info!("Using font {}", font_path.display());
                return Ok(FontFamily {
                    regular: font_data.clone(),
                    bold: font_data.clone(),
                    italic: font_data.clone(),
                    bold_italic: font_data,
                });
            }
            Err(e) => trace!("Failed to load font {}: {}", font_path.display(), e),
        }
    }

    warn!("Could not load any suitable font");
    Err(String::from("Could not load any suitable font"))
}

/// Platform font locations to try, most reliable first. TTF only; collections
/// are not supported by the PDF writer's font parser.
fn get_platform_font_paths() -> Vec<(String, &'static str)> {
    let mut paths = Vec::new();

    match env::consts::OS {
        "macos" => {
            paths.push((String::from("/System/Library/Fonts"), "Geneva.ttf"));
            paths.push((String::from("/System/Library/Fonts"), "Monaco.ttf"));
            paths.push((String::from("/Library/Fonts"), "Arial.ttf"));
        }
        "windows" => {
            for font in ["arial.ttf", "verdana.ttf", "tahoma.ttf", "times.ttf", "calibri.ttf", "segoeui.ttf"] {
                paths.push((String::from("C:\\Windows\\Fonts"), font));
            }
        }
        "linux" => {
            paths.push((String::from("/usr/share/fonts/truetype/dejavu"), "DejaVuSans.ttf"));
            paths.push((String::from("/usr/share/fonts/truetype/liberation"), "LiberationSans-Regular.ttf"));
            paths.push((String::from("/usr/share/fonts/liberation"), "LiberationSans-Regular.ttf"));
            paths.push((String::from("/usr/share/fonts/TTF"), "DejaVuSans.ttf"));
            paths.push((String::from("/usr/share/fonts/dejavu"), "DejaVuSans.ttf"));
            paths.push((String::from("/usr/share/fonts/truetype/ubuntu"), "Ubuntu-R.ttf"));
            paths.push((String::from("/usr/share/fonts/noto"), "NotoSans-Regular.ttf"));
            paths.push((String::from("/usr/share/fonts/truetype/noto"), "NotoSans-Regular.ttf"));
        }
        _ => paths.push((String::from("/usr/local/share/fonts"), "Arial.ttf")),
    }

    if let Some(home) = dirs::home_dir() {
        let user_fonts = match env::consts::OS {
            "macos" => Some(home.join("Library/Fonts")),
            "windows" => Some(home.join("AppData\\Local\\Microsoft\\Windows\\Fonts")),
            "linux" => Some(home.join(".local/share/fonts")),
            _ => None,
        };
        if let Some(dir) = user_fonts {
            let dir = dir.to_string_lossy().into_owned();
            paths.push((dir.clone(), "DejaVuSans.ttf"));
            paths.push((dir.clone(), "LiberationSans-Regular.ttf"));
            paths.push((dir, "Arial.ttf"));
        }
    }

    if let Some(data) = dirs::data_dir() {
        paths.push((data.join("comix-dl").join("fonts").to_string_lossy().into_owned(), "font.ttf"));
    }

    paths
}
