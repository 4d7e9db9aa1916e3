//! Single-worker FIFO transcription queue.
//!
//! Uploads are enqueued and acknowledged immediately; one worker task pops
//! jobs in arrival order, transcribes with bounded retry, appends to the
//! meeting's open transcript and pushes `transcript-update` to the room.
//! The job's temp audio file is removed once the job ends, whatever the outcome.

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::providers::TranscriptionProvider;
use super::retry::RetryPolicy;
use crate::db::{SessionStore, Transcript, TranscriptAppend};
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::signaling::{RoomBroadcaster, ServerMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionJob {
    pub audio_path: PathBuf,
    pub meeting_id: String,
    pub user_id: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Processing,
    Committed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Committed => "committed",
            JobState::Failed => "failed",
        }
    }
}

/// Counters exposed through the status endpoint.
#[derive(Debug, Default)]
pub struct QueueStats {
    queued: AtomicUsize,
    committed: AtomicUsize,
    failed: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub committed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            queue_length: self.queued.load(Ordering::SeqCst),
            committed: self.committed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }

    fn record(&self, state: JobState) {
        let counter = match state {
            JobState::Committed => &self.committed,
            JobState::Failed => &self.failed,
            JobState::Queued | JobState::Processing => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Removes the job's audio file when dropped.
struct TempAudio {
    path: PathBuf,
}

impl TempAudio {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string())
    }
}

impl Drop for TempAudio {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed temp audio {:?}", self.path),
            Err(e) => warn!("Failed to remove temp audio {:?}: {}", self.path, e),
        }
    }
}

pub struct TranscriptionWorker {
    provider: Arc<dyn TranscriptionProvider>,
    store: SessionStore,
    broadcaster: Arc<dyn RoomBroadcaster>,
    retry: RetryPolicy,
}

impl TranscriptionWorker {
    pub fn new(
        provider: Arc<dyn TranscriptionProvider>,
        store: SessionStore,
        broadcaster: Arc<dyn RoomBroadcaster>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            store,
            broadcaster,
            retry,
        }
    }

    /// Run one job to completion. The audio file is gone when this returns.
    pub async fn process(&self, job: TranscriptionJob) -> CoordinatorResult<Transcript> {
        let audio = TempAudio::new(job.audio_path);
        let bytes = tokio::fs::read(audio.path()).await?;
        let file_name = audio.file_name();

        debug!(
            "Transcribing {} ({} bytes) for meeting {} via {}",
            file_name,
            bytes.len(),
            job.meeting_id,
            self.provider.name()
        );

        let provider = self.provider.as_ref();
        let (bytes, name) = (bytes.as_slice(), file_name.as_str());
        let result = self
            .retry
            .run(|_| provider.transcribe(bytes, name))
            .await?;

        let transcript = self
            .store
            .append_transcript(TranscriptAppend {
                meeting_id: job.meeting_id.clone(),
                created_by: Some(job.user_id),
                text: result.text.clone(),
                segments: result.segments,
                is_final: job.is_final,
                provider_response: result.raw,
            })
            .await?;

        let delivered = self
            .broadcaster
            .broadcast_to_room(
                &job.meeting_id,
                ServerMessage::TranscriptUpdate {
                    transcript_id: transcript.id.clone(),
                    meeting_id: job.meeting_id.clone(),
                    text: result.text,
                    full_text: transcript.full_text.clone(),
                    segments: transcript.segments.clone(),
                    is_final: transcript.is_final,
                },
            )
            .await;
        debug!(
            "transcript-update for meeting {} delivered to {} connections",
            job.meeting_id, delivered
        );

        Ok(transcript)
    }
}

#[derive(Clone)]
pub struct TranscriptionQueue {
    tx: mpsc::UnboundedSender<TranscriptionJob>,
    stats: Arc<QueueStats>,
}

impl TranscriptionQueue {
    /// Spawn the worker. It runs until every queue handle is dropped.
    pub fn start(worker: TranscriptionWorker) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());
        let handle = tokio::spawn(run_worker(worker, rx, stats.clone()));
        (Self { tx, stats }, handle)
    }

    /// Queue a job and return the number of jobs waiting, this one included.
    /// The caller hands ownership of the audio file to the queue.
    pub fn enqueue(&self, job: TranscriptionJob) -> CoordinatorResult<usize> {
        let meeting_id = job.meeting_id.clone();
        let depth = self.stats.queued.fetch_add(1, Ordering::SeqCst) + 1;
        if let Err(mpsc::error::SendError(job)) = self.tx.send(job) {
            self.stats.queued.fetch_sub(1, Ordering::SeqCst);
            drop(TempAudio::new(job.audio_path));
            return Err(CoordinatorError::Storage(anyhow::anyhow!(
                "Transcription worker is not running"
            )));
        }
        info!(
            "Job for meeting {} is {} (queue length {})",
            meeting_id,
            JobState::Queued.as_str(),
            depth
        );
        Ok(depth)
    }

    pub fn len(&self) -> usize {
        self.stats.queued.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueSnapshot {
        self.stats.snapshot()
    }
}

async fn run_worker(
    worker: TranscriptionWorker,
    mut rx: mpsc::UnboundedReceiver<TranscriptionJob>,
    stats: Arc<QueueStats>,
) {
    info!("Transcription worker started");

    while let Some(job) = rx.recv().await {
        stats.queued.fetch_sub(1, Ordering::SeqCst);
        let meeting_id = job.meeting_id.clone();
        debug!(
            "Job for meeting {} is {}",
            meeting_id,
            JobState::Processing.as_str()
        );

        let state = match AssertUnwindSafe(worker.process(job)).catch_unwind().await {
            Ok(Ok(transcript)) => {
                info!(
                    "Transcript {} for meeting {} updated ({} chars, final: {})",
                    transcript.id,
                    meeting_id,
                    transcript.full_text.len(),
                    transcript.is_final
                );
                JobState::Committed
            }
            Ok(Err(e)) => {
                error!("Transcription job for meeting {} failed: {}", meeting_id, e);
                JobState::Failed
            }
            Err(_) => {
                error!("Transcription job for meeting {} panicked", meeting_id);
                JobState::Failed
            }
        };
        stats.record(state);
        debug!("Job for meeting {} is {}", meeting_id, state.as_str());
    }

    info!("Transcription worker stopped");
}
