//! Finding out what a channel uploaded most recently.

use crate::VideoId;
use crate::channel_id::ChannelId;
use crate::youtube_api::{Video, YouTubeClient};
use eyre::Context;
use std::future::Future;

/// The newest item in a channel's uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    pub video_id: VideoId,
    pub title: String,
    /// The item is a scheduled live broadcast (or premiere) that hasn't started yet.
    ///
    /// Such items are never mirrored, regardless of the cursor.
    pub is_pending_live_event: bool,
}

/// Source of the most recent upload of a channel.
pub trait UploadFeed {
    /// Returns the channel's most recent upload, or `None` if it has not uploaded anything.
    fn latest(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = eyre::Result<Option<UploadCandidate>>>;
}

/// [`UploadFeed`] backed by the read-only YouTube Data API.
#[derive(Debug, Clone)]
pub struct ApiFeed {
    yt: YouTubeClient,
}

impl ApiFeed {
    pub fn new(yt: YouTubeClient) -> Self {
        Self { yt }
    }
}

impl UploadFeed for ApiFeed {
    async fn latest(&self, channel: &ChannelId) -> eyre::Result<Option<UploadCandidate>> {
        let uploads = self
            .yt
            .uploads_playlist_id(channel.as_str())
            .await
            .context("look up uploads playlist")?;

        let Some(item) = self
            .yt
            .first_playlist_item(&uploads)
            .await
            .context("fetch newest upload")?
        else {
            return Ok(None);
        };

        let video = self
            .yt
            .get_video(&item.snippet.resource_id.video_id)
            .await
            .context("fetch video details")?;

        let scheduled_start = video
            .live_streaming_details
            .as_ref()
            .and_then(|live| live.scheduled_start_time);
        let candidate = classify(video, &item.snippet.title);
        if candidate.is_pending_live_event {
            tracing::info!(
                video_id = %candidate.video_id,
                title = %candidate.title,
                scheduled_start = ?scheduled_start,
                "newest upload is an upcoming live event"
            );
        }
        Ok(Some(candidate))
    }
}

/// Turns a video's metadata into an [`UploadCandidate`].
///
/// A video with live streaming details but no actual start time is a broadcast that is only
/// scheduled. Once it goes live, or for regular uploads, it is fair game.
pub fn classify(video: Video, fallback_title: &str) -> UploadCandidate {
    let is_pending_live_event = video
        .live_streaming_details
        .as_ref()
        .is_some_and(|live| live.is_upcoming());
    let title = video
        .snippet
        .map(|s| s.title)
        .unwrap_or_else(|| fallback_title.to_string());
    UploadCandidate {
        video_id: VideoId::new(video.id),
        title,
        is_pending_live_event,
    }
}
