//! Re-uploading downloaded videos to the destination account.

use crate::VideoId;
use crate::config::UploadDefaults;
use crate::fetch::LocalMediaFile;
use crate::youtube_api::{VideoInsertRequest, VideoInsertSnippet, VideoInsertStatus, YouTubeClient};
use eyre::Context;
use std::future::Future;
use std::time::Duration;

/// YouTube rejects longer titles.
const MAX_TITLE_CHARS: usize = 100;

const UNTITLED: &str = "Untitled video";

/// Characters dropped from titles; YouTube rejects angle brackets, the rest are filesystem noise.
const FORBIDDEN_TITLE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Publishes a local file as a new video, returning the id it was published under.
pub trait Publisher {
    fn republish(&self, file: &LocalMediaFile) -> impl Future<Output = eyre::Result<VideoId>>;
}

/// [`Publisher`] that uploads through the YouTube Data API with the account's OAuth credential.
#[derive(Debug, Clone)]
pub struct Uploader {
    yt: YouTubeClient,
    defaults: UploadDefaults,
    timeout: Duration,
}

impl Uploader {
    /// `yt` must carry [`crate::youtube_api::Auth::OAuth`].
    pub fn new(yt: YouTubeClient, defaults: UploadDefaults, timeout: Duration) -> Self {
        Self {
            yt,
            defaults,
            timeout,
        }
    }
}

impl Publisher for Uploader {
    #[tracing::instrument(skip(self), fields(path = %file.path.display()))]
    async fn republish(&self, file: &LocalMediaFile) -> eyre::Result<VideoId> {
        let request = insert_request(&file.title, &self.defaults);
        tracing::info!(
            title = %request.snippet.title,
            privacy = %request.status.privacy_status,
            "uploading"
        );
        let video = self
            .yt
            .insert_video(&request, &file.path, self.timeout)
            .await
            .context("upload video")?;
        let id = VideoId::new(video.id);
        tracing::info!(remote_id = %id, "uploaded");
        Ok(id)
    }
}

/// Builds the `videos.insert` metadata for a file titled `title`.
///
/// The title is cleaned up to satisfy YouTube's constraints: no angle brackets (or characters
/// that don't belong in file names), at most 100 characters, not empty.
pub fn insert_request(title: &str, defaults: &UploadDefaults) -> VideoInsertRequest {
    let cleaned: String = title
        .chars()
        .filter(|c| !FORBIDDEN_TITLE_CHARS.contains(c))
        .take(MAX_TITLE_CHARS)
        .collect();
    let cleaned = cleaned.trim();
    let title = if cleaned.is_empty() { UNTITLED } else { cleaned };

    VideoInsertRequest {
        snippet: VideoInsertSnippet {
            title: title.to_string(),
            description: defaults.description.clone(),
            category_id: defaults.category_id.clone(),
        },
        status: VideoInsertStatus {
            privacy_status: defaults.privacy_status,
        },
    }
}
