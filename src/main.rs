use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::LevelFilter;

use comix_dl::config::default_config_path;
use comix_dl::progress::ProgressReceiver;
use comix_dl::selection::scanlators;
use comix_dl::{
    ComixClient, DownloadConfig, DownloadError, DownloadOrchestrator, HttpTransport, OutputFormat, ProgressEvent,
    parse_selection, progress_channel, select_releases,
};

const SPINNER_TICKS: &[&str] = &["⠋ ", "⠙ ", "⠹ ", "⠸ ", "⠼ ", "⠴ ", "⠦ ", "⠧ ", "⠇ ", "⠏ "];

/// Download manga chapters from https://comix.to
#[derive(Debug, Parser)]
#[command(version, about, long_about = "Download manga chapters from https://comix.to as images, PDF or CBZ")]
pub struct Args {
    /// The title URL of the manga, e.g. https://comix.to/title/93q1r-the-summoner
    pub url: String,

    /// Chapters to download: "all", numbers, ranges or a mix (e.g. "1,3,5-10.5")
    #[arg(short, long, default_value = "all")]
    pub chapters: String,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// The output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Preferred scanlation group when a chapter has several releases ("any" for first available)
    #[arg(short, long)]
    pub scanlator: Option<String>,

    /// Maximum number of chapters downloaded at once (1-10)
    #[arg(long)]
    pub chapter_workers: Option<usize>,

    /// Maximum number of images downloaded at once per chapter (1-20)
    #[arg(long)]
    pub image_workers: Option<usize>,

    /// Keep page images after PDF/CBZ conversion
    #[arg(long)]
    pub keep_images: bool,

    /// Attempts per request before giving up
    #[arg(long)]
    pub retries: Option<u32>,

    /// Base delay between retries in seconds
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print debug logs
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    fn resolve_config(&self) -> DownloadConfig {
        let path = self.config.clone().unwrap_or_else(default_config_path);
        let mut config = DownloadConfig::load(&path);

        if let Some(format) = self.format {
            config.output_format = format;
        }
        if let Some(output) = &self.output {
            config.download_path = output.clone();
        }
        if let Some(workers) = self.chapter_workers {
            config.max_chapter_workers = workers;
        }
        if let Some(workers) = self.image_workers {
            config.max_image_workers = workers;
        }
        if let Some(retries) = self.retries {
            config.retry_count = retries;
        }
        if let Some(delay) = self.retry_delay {
            config.retry_delay = delay;
        }
        config.keep_images |= self.keep_images;
        config.enable_logs |= self.verbose;
        config.clamped()
    }
}

#[tokio::main]
async fn main() -> Result<(), DownloadError> {
    let args = Args::parse();
    let config = args.resolve_config();
    init_logging(config.enable_logs);

    let transport = Arc::new(HttpTransport::new()?);
    let client = ComixClient::new(transport, config.retry_policy());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message("Fetching manga information...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let (manga, catalog) = match client.fetch_catalog_for_url(&args.url).await {
        Ok(found) => found,
        Err(e) => {
            spinner.abandon_with_message(format!("✗ {}", e));
            return Err(e);
        }
    };
    spinner.finish_with_message(format!("✓ Found manga: {} ({} chapters)", manga.title, catalog.len()));

    if catalog.is_empty() {
        println!("No chapters found for this manga");
        return Ok(());
    }

    let requested = parse_selection(&args.chapters, &catalog)?;
    let available_groups = scanlators(&requested);
    if available_groups.len() > 1 && args.scanlator.is_none() {
        println!("Several scanlators available: {}", available_groups.join(", "));
        println!("Using the first available release; pass --scanlator to choose one");
    }
    let selected = select_releases(&requested, args.scanlator.as_deref());

    if selected.is_empty() {
        return Err(DownloadError::Selection(String::from("No valid chapters selected")));
    }
    println!(
        "Downloading {} chapter(s) as {} into {}",
        selected.len(),
        config.output_format,
        config.download_path.join(manga.safe_title()).display()
    );

    let (tx, rx) = progress_channel();
    let orchestrator = DownloadOrchestrator::new(client).with_events(tx);

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling: pages in flight will finish, nothing new will start");
            cancel.cancel();
        }
    });

    let renderer = tokio::spawn(render_progress(rx, selected.len()));
    let report = orchestrator.download_batch(manga, selected, config).await?;
    drop(orchestrator);
    let _ = renderer.await;

    for outcome in report.outcomes.iter().filter(|o| !o.success) {
        eprintln!("✗ {}", outcome.message);
    }
    println!("Done: {} succeeded, {} failed", report.successful, report.failed);

    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(enable_logs: bool) {
    let level = if enable_logs { LevelFilter::Debug } else { LevelFilter::Warn };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:.bold.dim} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(SPINNER_TICKS)
}

/// Draws one bar for the batch and one spinner per running chapter until the
/// event channel closes.
async fn render_progress(mut rx: ProgressReceiver, total: usize) {
    let multi_progress = MultiProgress::new();
    let main_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} chapters ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    let main_pb = multi_progress.add(ProgressBar::new(total as u64));
    main_pb.set_style(main_style);

    let mut chapter_bars: HashMap<u64, ProgressBar> = HashMap::new();

    while let Some(event) = rx.recv().await {
        match event {
            ProgressEvent::ChapterStarted { chapter_id, chapter_name } => {
                let pb = multi_progress.add(ProgressBar::new_spinner());
                pb.set_style(spinner_style());
                pb.set_prefix(chapter_name);
                pb.set_message("fetching pages...");
                pb.enable_steady_tick(Duration::from_millis(100));
                chapter_bars.insert(chapter_id, pb);
            }
            ProgressEvent::PageProgress { chapter_id, downloaded, total } => {
                if let Some(pb) = chapter_bars.get(&chapter_id) {
                    pb.set_message(format!("{}/{} pages", downloaded, total));
                }
            }
            ProgressEvent::ChapterFinished(outcome) => {
                let mark = if outcome.success { "✓" } else { "✗" };
                match chapter_bars.remove(&outcome.chapter_id) {
                    Some(pb) => pb.finish_with_message(format!("{} {}", mark, outcome.message)),
                    None => {
                        let _ = multi_progress.println(format!("{} {}", mark, outcome.message));
                    }
                }
            }
            ProgressEvent::Overall { completed, .. } => main_pb.set_position(completed as u64),
            ProgressEvent::BatchFinished { successful, failed } => {
                main_pb.finish_with_message(format!("{} succeeded, {} failed", successful, failed));
            }
        }
    }
}
