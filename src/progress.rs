use tokio::sync::mpsc;

/// Result of downloading one chapter. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterOutcome {
    pub chapter_id: u64,
    pub chapter_name: String,
    pub success: bool,
    pub message: String,
}

impl ChapterOutcome {
    pub fn succeeded(chapter_id: u64, chapter_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chapter_id,
            chapter_name: chapter_name.into(),
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(chapter_id: u64, chapter_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            chapter_id,
            chapter_name: chapter_name.into(),
            success: false,
            message: message.into(),
        }
    }
}

/// Events a front-end consumes while a batch runs. Safe to emit from any task.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ChapterStarted {
        chapter_id: u64,
        chapter_name: String,
    },
    PageProgress {
        chapter_id: u64,
        downloaded: usize,
        total: usize,
    },
    ChapterFinished(ChapterOutcome),
    /// Sent once per finished chapter; `completed` strictly increases up to `total`.
    Overall {
        completed: usize,
        total: usize,
    },
    BatchFinished {
        successful: usize,
        failed: usize,
    },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Sends an event if anyone listens. A dropped receiver is not an error for the batch.
pub(crate) fn emit(sender: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}
