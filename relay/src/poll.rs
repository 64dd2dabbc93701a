//! The long-running check-and-mirror loop.

use crate::VideoId;
use crate::channel_id::ChannelId;
use crate::cursor::CursorStore;
use crate::feed::UploadFeed;
use crate::fetch::{LocalMediaFile, MediaFetcher};
use crate::pipeline::Pipeline;
use crate::publish::Publisher;
use std::time::Duration;

/// Why a single poll did not complete.
///
/// None of these stop the loop; the next poll simply tries again.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("read upload feed: {0:#}")]
    FeedRead(eyre::Report),

    #[error("download {video_id}: {cause:#}")]
    Download {
        video_id: VideoId,
        cause: eyre::Report,
    },

    /// The downloaded file is still on disk at `file.path`.
    #[error("upload {}: {cause:#}", .file.path.display())]
    Upload {
        file: LocalMediaFile,
        cause: eyre::Report,
    },

    /// The video was mirrored but the cursor could not be persisted.
    #[error("save cursor: {0:#}")]
    Cursor(eyre::Report),
}

/// What a successful poll found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The channel has no uploads at all.
    NoUploads,
    /// The newest upload is a live event that hasn't started.
    PendingLive(VideoId),
    /// The newest upload has already been mirrored.
    Unchanged(VideoId),
    Republished {
        video_id: VideoId,
        remote_id: VideoId,
    },
}

pub struct PollLoop<F, M, P, S> {
    channel: ChannelId,
    feed: F,
    pipeline: Pipeline<M, P>,
    store: S,
    /// Last mirrored video, as loaded at startup and updated after each mirror.
    last_seen: Option<VideoId>,
    interval: Duration,
}

impl<F, M, P, S> PollLoop<F, M, P, S>
where
    F: UploadFeed,
    M: MediaFetcher,
    P: Publisher,
    S: CursorStore,
{
    /// Sets up a loop over `channel`, starting from whatever `store` has saved.
    pub fn new(
        channel: ChannelId,
        feed: F,
        pipeline: Pipeline<M, P>,
        store: S,
        interval: Duration,
    ) -> Self {
        let last_seen = store.load();
        Self {
            channel,
            feed,
            pipeline,
            store,
            last_seen,
            interval,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn last_seen(&self) -> Option<&VideoId> {
        self.last_seen.as_ref()
    }

    /// Checks the channel once, mirroring its newest upload if that is new.
    #[tracing::instrument(skip(self), fields(channel = %self.channel))]
    pub async fn tick(&mut self) -> Result<TickOutcome, CycleError> {
        let Some(candidate) = self
            .feed
            .latest(&self.channel)
            .await
            .map_err(CycleError::FeedRead)?
        else {
            tracing::info!("channel has no uploads");
            return Ok(TickOutcome::NoUploads);
        };

        if candidate.is_pending_live_event {
            tracing::info!(video_id = %candidate.video_id, "newest upload has not gone live yet");
            return Ok(TickOutcome::PendingLive(candidate.video_id));
        }

        if self.last_seen.as_ref() == Some(&candidate.video_id) {
            tracing::info!(video_id = %candidate.video_id, "no new upload");
            return Ok(TickOutcome::Unchanged(candidate.video_id));
        }

        tracing::info!(
            video_id = %candidate.video_id,
            title = %candidate.title,
            "new upload"
        );
        let remote_id = self.pipeline.process(&candidate.video_id).await?;
        tracing::info!(video_id = %candidate.video_id, %remote_id, "mirrored");

        // Even if persisting fails, don't mirror this video again while we're running.
        self.last_seen = Some(candidate.video_id.clone());
        self.store
            .save(&candidate.video_id)
            .map_err(CycleError::Cursor)?;

        Ok(TickOutcome::Republished {
            video_id: candidate.video_id,
            remote_id,
        })
    }

    /// Polls forever, sleeping the configured interval between checks.
    pub async fn run(mut self) {
        tracing::info!(
            channel = %self.channel,
            interval = ?self.interval,
            last_seen = ?self.last_seen,
            "watching channel"
        );
        loop {
            match self.tick().await {
                Ok(outcome) => tracing::debug!(?outcome, "poll complete"),
                Err(e @ CycleError::Cursor(_)) => {
                    tracing::error!(error = %e, "mirrored video but could not record it");
                }
                Err(e) => tracing::warn!(error = %e, "poll failed"),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::FileCursor;
    use crate::feed::UploadCandidate;
    use pretty_assertions::assert_eq;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const CHANNEL: &str = "UCKsbPaQz7yZEKb9z2TXkxDg";

    #[derive(Debug, Clone)]
    enum Latest {
        Nothing,
        Upload(&'static str),
        Upcoming(&'static str),
        Broken,
    }

    #[derive(Clone)]
    struct ScriptedFeed(Arc<Mutex<Latest>>);

    impl ScriptedFeed {
        fn set(&self, latest: Latest) {
            *self.0.lock().unwrap() = latest;
        }
    }

    impl UploadFeed for ScriptedFeed {
        async fn latest(&self, _: &ChannelId) -> eyre::Result<Option<UploadCandidate>> {
            let latest = self.0.lock().unwrap().clone();
            let candidate = |id: &str, pending| UploadCandidate {
                video_id: VideoId::new(id),
                title: format!("Title of {id}"),
                is_pending_live_event: pending,
            };
            match latest {
                Latest::Nothing => Ok(None),
                Latest::Upload(id) => Ok(Some(candidate(id, false))),
                Latest::Upcoming(id) => Ok(Some(candidate(id, true))),
                Latest::Broken => eyre::bail!("503 Service Unavailable"),
            }
        }
    }

    #[derive(Clone)]
    struct CountingFetcher {
        dir: PathBuf,
        downloads: Arc<Mutex<Vec<VideoId>>>,
        broken: Arc<AtomicBool>,
    }

    impl MediaFetcher for CountingFetcher {
        async fn download(&self, video_id: &VideoId) -> eyre::Result<LocalMediaFile> {
            self.downloads.lock().unwrap().push(video_id.clone());
            if self.broken.load(Ordering::SeqCst) {
                eyre::bail!("yt-dlp exited with status 1");
            }
            let path = self.dir.join(format!("{video_id}.mp4"));
            tokio::fs::write(&path, b"video").await?;
            Ok(LocalMediaFile::from_path(path))
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum UploadMode {
        Works,
        Fails,
        Hangs,
    }

    #[derive(Clone)]
    struct CountingPublisher {
        uploads: Arc<Mutex<Vec<String>>>,
        mode: Arc<Mutex<UploadMode>>,
    }

    impl Publisher for CountingPublisher {
        async fn republish(&self, file: &LocalMediaFile) -> eyre::Result<VideoId> {
            let mode = *self.mode.lock().unwrap();
            match mode {
                UploadMode::Works => {
                    self.uploads.lock().unwrap().push(file.title.clone());
                    Ok(VideoId::new(format!("mirror-of-{}", file.title)))
                }
                UploadMode::Fails => eyre::bail!("upload rejected"),
                UploadMode::Hangs => std::future::pending().await,
            }
        }
    }

    #[derive(Clone, Default)]
    struct MemoryCursor {
        saved: Arc<Mutex<Option<VideoId>>>,
        loads: Arc<AtomicUsize>,
        broken: bool,
    }

    impl CursorStore for MemoryCursor {
        fn load(&self) -> Option<VideoId> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.saved.lock().unwrap().clone()
        }

        fn save(&mut self, id: &VideoId) -> eyre::Result<()> {
            if self.broken {
                eyre::bail!("disk full");
            }
            *self.saved.lock().unwrap() = Some(id.clone());
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        feed: ScriptedFeed,
        fetcher: CountingFetcher,
        publisher: CountingPublisher,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            Self {
                feed: ScriptedFeed(Arc::new(Mutex::new(Latest::Nothing))),
                fetcher: CountingFetcher {
                    dir: dir.path().to_path_buf(),
                    downloads: Default::default(),
                    broken: Default::default(),
                },
                publisher: CountingPublisher {
                    uploads: Default::default(),
                    mode: Arc::new(Mutex::new(UploadMode::Works)),
                },
                _dir: dir,
            }
        }

        fn download_dir(&self) -> &Path {
            &self.fetcher.dir
        }

        fn poller<S: CursorStore>(
            &self,
            store: S,
        ) -> PollLoop<ScriptedFeed, CountingFetcher, CountingPublisher, S> {
            PollLoop::new(
                ChannelId::resolve(CHANNEL).unwrap(),
                self.feed.clone(),
                Pipeline::new(self.fetcher.clone(), self.publisher.clone()),
                store,
                Duration::from_secs(600),
            )
        }

        fn uploads(&self, mode: UploadMode) {
            *self.publisher.mode.lock().unwrap() = mode;
        }

        fn downloads(&self) -> usize {
            self.fetcher.downloads.lock().unwrap().len()
        }

        fn uploaded(&self) -> Vec<String> {
            self.publisher.uploads.lock().unwrap().clone()
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn mirrors_each_new_upload_once() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        let mut poller = h.poller(cursor.clone());

        h.feed.set(Latest::Upload("V1"));
        assert_eq!(
            poller.tick().await.unwrap(),
            TickOutcome::Republished {
                video_id: VideoId::new("V1"),
                remote_id: VideoId::new("mirror-of-V1"),
            }
        );
        assert_eq!(
            poller.tick().await.unwrap(),
            TickOutcome::Unchanged(VideoId::new("V1"))
        );

        h.feed.set(Latest::Upload("V2"));
        assert!(matches!(
            poller.tick().await.unwrap(),
            TickOutcome::Republished { .. }
        ));

        assert_eq!(h.downloads(), 2);
        assert_eq!(h.uploaded(), vec!["V1", "V2"]);
        assert_eq!(*cursor.saved.lock().unwrap(), Some(VideoId::new("V2")));
        assert_eq!(poller.last_seen(), Some(&VideoId::new("V2")));
        assert!(files_in(h.download_dir()).is_empty());
    }

    #[tokio::test]
    async fn failed_upload_keeps_cursor_and_file() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        *cursor.saved.lock().unwrap() = Some(VideoId::new("V2"));
        let mut poller = h.poller(cursor.clone());

        h.feed.set(Latest::Upload("V3"));
        h.uploads(UploadMode::Fails);
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, CycleError::Upload { .. }), "{err:?}");

        assert_eq!(*cursor.saved.lock().unwrap(), Some(VideoId::new("V2")));
        assert_eq!(poller.last_seen(), Some(&VideoId::new("V2")));
        assert_eq!(files_in(h.download_dir()), vec!["V3.mp4"]);

        // the next poll tries the same video again
        h.uploads(UploadMode::Works);
        poller.tick().await.unwrap();
        assert_eq!(h.downloads(), 2);
        assert_eq!(*cursor.saved.lock().unwrap(), Some(VideoId::new("V3")));
    }

    #[tokio::test]
    async fn upcoming_live_event_is_skipped() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        let mut poller = h.poller(cursor.clone());

        h.feed.set(Latest::Upcoming("L1"));
        for _ in 0..3 {
            assert_eq!(
                poller.tick().await.unwrap(),
                TickOutcome::PendingLive(VideoId::new("L1"))
            );
        }
        assert_eq!(h.downloads(), 0);
        assert_eq!(*cursor.saved.lock().unwrap(), None);

        // once it has started it is mirrored like any other upload
        h.feed.set(Latest::Upload("L1"));
        assert!(matches!(
            poller.tick().await.unwrap(),
            TickOutcome::Republished { .. }
        ));
    }

    #[tokio::test]
    async fn saved_cursor_suppresses_remirror_after_restart() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        *cursor.saved.lock().unwrap() = Some(VideoId::new("V1"));
        let mut poller = h.poller(cursor);

        h.feed.set(Latest::Upload("V1"));
        assert_eq!(
            poller.tick().await.unwrap(),
            TickOutcome::Unchanged(VideoId::new("V1"))
        );
        assert_eq!(h.downloads(), 0);
        assert!(h.uploaded().is_empty());
    }

    #[tokio::test]
    async fn interrupted_upload_is_redone_after_restart() {
        let h = Harness::new();
        let state = tempfile::tempdir().unwrap();
        let cursor_path = state.path().join("last_video.json");

        h.feed.set(Latest::Upload("V5"));
        h.uploads(UploadMode::Hangs);
        {
            let mut poller = h.poller(FileCursor::new(&cursor_path));
            let interrupted =
                tokio::time::timeout(Duration::from_millis(100), poller.tick()).await;
            assert!(interrupted.is_err(), "tick should still be uploading");
        }
        assert_eq!(h.downloads(), 1);
        assert!(!cursor_path.exists());

        h.uploads(UploadMode::Works);
        let mut poller = h.poller(FileCursor::new(&cursor_path));
        assert_eq!(poller.last_seen(), None);
        poller.tick().await.unwrap();

        assert_eq!(h.downloads(), 2);
        assert_eq!(h.uploaded(), vec!["V5"]);
        let record = FileCursor::new(&cursor_path).read_record().unwrap().unwrap();
        assert_eq!(record.video_id, VideoId::new("V5"));
    }

    #[tokio::test]
    async fn feed_errors_change_nothing() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        *cursor.saved.lock().unwrap() = Some(VideoId::new("V1"));
        let mut poller = h.poller(cursor.clone());

        h.feed.set(Latest::Broken);
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, CycleError::FeedRead(_)), "{err:?}");
        assert!(err.to_string().contains("503"), "{err}");
        assert_eq!(h.downloads(), 0);
        assert_eq!(poller.last_seen(), Some(&VideoId::new("V1")));
    }

    #[tokio::test]
    async fn empty_channel_does_nothing() {
        let h = Harness::new();
        let mut poller = h.poller(MemoryCursor::default());
        assert_eq!(poller.tick().await.unwrap(), TickOutcome::NoUploads);
        assert_eq!(h.downloads(), 0);
    }

    #[tokio::test]
    async fn failed_download_leaves_cursor_alone() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        let mut poller = h.poller(cursor.clone());

        h.feed.set(Latest::Upload("V1"));
        h.fetcher.broken.store(true, Ordering::SeqCst);
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, CycleError::Download { .. }), "{err:?}");
        assert!(h.uploaded().is_empty());
        assert_eq!(*cursor.saved.lock().unwrap(), None);
        assert_eq!(poller.last_seen(), None);
    }

    #[tokio::test]
    async fn unsaved_cursor_still_advances_in_memory() {
        let h = Harness::new();
        let cursor = MemoryCursor {
            broken: true,
            ..Default::default()
        };
        let mut poller = h.poller(cursor);

        h.feed.set(Latest::Upload("V1"));
        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, CycleError::Cursor(_)), "{err:?}");
        assert_eq!(poller.last_seen(), Some(&VideoId::new("V1")));

        assert_eq!(
            poller.tick().await.unwrap(),
            TickOutcome::Unchanged(VideoId::new("V1"))
        );
        assert_eq!(h.uploaded(), vec!["V1"]);
    }

    #[tokio::test]
    async fn cursor_is_read_once_at_startup() {
        let h = Harness::new();
        let cursor = MemoryCursor::default();
        *cursor.saved.lock().unwrap() = Some(VideoId::new("V1"));
        let mut poller = h.poller(cursor.clone());
        assert_eq!(poller.last_seen(), Some(&VideoId::new("V1")));

        h.feed.set(Latest::Upload("V1"));
        poller.tick().await.unwrap();
        h.feed.set(Latest::Upload("V2"));
        poller.tick().await.unwrap();
        poller.tick().await.unwrap();

        assert_eq!(cursor.loads.load(Ordering::SeqCst), 1);
        assert_eq!(poller.channel().as_str(), CHANNEL);
    }
}
