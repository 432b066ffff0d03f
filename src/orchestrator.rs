use std::sync::{Arc, Mutex};

use futures::StreamExt;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::api::ComixClient;
use crate::config::DownloadConfig;
use crate::downloader::ChapterDownloader;
use crate::error::DownloadError;
use crate::models::{ChapterRecord, MangaRecord};
use crate::pool::bounded;
use crate::progress::{ChapterOutcome, ProgressEvent, ProgressSender, emit};
use crate::selection::shared_numbers;

/// Final result of a batch. `successful + failed` always equals the batch size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub successful: usize,
    pub failed: usize,
    /// Outcomes in completion order
    pub outcomes: Vec<ChapterOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.successful + self.failed
    }
}

#[derive(Debug, Default)]
struct TallyState {
    completed: usize,
    successful: usize,
    failed: usize,
    outcomes: Vec<ChapterOutcome>,
}

/// Counters for one batch, shared by reference with every chapter task.
#[derive(Debug)]
pub struct BatchTally {
    total: usize,
    state: Mutex<TallyState>,
}

impl BatchTally {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            state: Mutex::new(TallyState::default()),
        }
    }

    /// Records one finished chapter and returns `(completed, total)`.
    ///
    /// The finish and overall events are sent while the lock is held, so
    /// listeners see `completed` strictly increasing no matter which task
    /// records first.
    pub fn record(&self, outcome: ChapterOutcome, events: Option<&ProgressSender>) -> (usize, usize) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.completed += 1;
        if outcome.success {
            state.successful += 1;
        } else {
            state.failed += 1;
        }

        emit(events, ProgressEvent::ChapterFinished(outcome.clone()));
        emit(
            events,
            ProgressEvent::Overall {
                completed: state.completed,
                total: self.total,
            },
        );
        state.outcomes.push(outcome);
        (state.completed, self.total)
    }

    pub fn into_report(self) -> BatchReport {
        let state = self.state.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        BatchReport {
            successful: state.successful,
            failed: state.failed,
            outcomes: state.outcomes,
        }
    }
}

/// Drives a batch of chapter downloads under the chapter worker limit.
pub struct DownloadOrchestrator {
    client: ComixClient,
    cancel: CancellationToken,
    events: Option<ProgressSender>,
}

impl DownloadOrchestrator {
    pub fn new(client: ComixClient) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn with_events(mut self, events: ProgressSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Token a front-end can cancel. Pages already requested finish; chapters
    /// left unfinished are recorded as cancelled failures.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Downloads `chapters` and returns the tally. Only an invalid
    /// configuration is reported as an error, before any request is made.
    pub async fn download_batch(
        &self,
        manga: MangaRecord,
        chapters: Vec<ChapterRecord>,
        config: DownloadConfig,
    ) -> Result<BatchReport, DownloadError> {
        config.validate()?;

        let total = chapters.len();
        let workers = config.max_chapter_workers;
        info!(
            "Downloading {} chapters of {} as {} ({} chapter workers, {} image workers)",
            total, manga.title, config.output_format, workers, config.max_image_workers
        );

        let client = self.client.with_retry(config.retry_policy());
        let mut downloader = ChapterDownloader::new(client, Arc::new(manga), Arc::new(config))
            .with_cancellation(self.cancel.clone())
            .with_shared_numbers(shared_numbers(&chapters));
        if let Some(events) = &self.events {
            downloader = downloader.with_events(events.clone());
        }

        let tally = BatchTally::new(total);
        let tally_ref = &tally;
        let events = self.events.as_ref();

        let mut runs = bounded(chapters, workers, |chapter| {
            let downloader = downloader.clone();
            let cancel = self.cancel.clone();
            async move {
                let outcome = run_chapter(downloader, chapter, &cancel, events).await;
                tally_ref.record(outcome, events);
            }
        });
        while runs.next().await.is_some() {}
        drop(runs);

        let report = tally.into_report();
        info!("Batch finished: {} succeeded, {} failed", report.successful, report.failed);
        emit(
            self.events.as_ref(),
            ProgressEvent::BatchFinished {
                successful: report.successful,
                failed: report.failed,
            },
        );
        Ok(report)
    }
}

/// Runs one chapter on its own task so that a panic inside it only fails that chapter.
async fn run_chapter(
    downloader: ChapterDownloader,
    chapter: ChapterRecord,
    cancel: &CancellationToken,
    events: Option<&ProgressSender>,
) -> ChapterOutcome {
    let chapter_id = chapter.chapter_id;
    let name = chapter.display_name();

    if cancel.is_cancelled() {
        return ChapterOutcome::failed(chapter_id, name.clone(), format!("{}: {}", name, DownloadError::Cancelled));
    }

    emit(
        events,
        ProgressEvent::ChapterStarted {
            chapter_id,
            chapter_name: name.clone(),
        },
    );

    let task = tokio::spawn(async move { downloader.download_chapter(&chapter).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Chapter task for {} died: {}", name, e);
            ChapterOutcome::failed(chapter_id, name.clone(), format!("{}: unexpected failure: {}", name, e))
        }
    }
}
