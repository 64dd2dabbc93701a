//! YouTube Videos API types.

use crate::youtube_api::types::PageInfo;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response structure for the `videos.list` API call.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/list>
#[derive(Debug, Serialize, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<Video>,
    #[serde(rename = "pageInfo", default)]
    pub page_info: PageInfo,
}

/// A `video` resource represents a YouTube video.
///
/// Which of the optional parts are present depends on the `part` parameter of the request.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#resource>
#[derive(Debug, Serialize, Deserialize)]
pub struct Video {
    /// The ID that YouTube uses to uniquely identify the video.
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    /// Only present for videos that are, were, or will be live broadcasts.
    #[serde(rename = "liveStreamingDetails")]
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

/// See: <https://developers.google.com/youtube/v3/docs/videos#snippet>
#[derive(Debug, Serialize, Deserialize)]
pub struct VideoSnippet {
    pub title: String,
}

/// Timing of a live broadcast.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#liveStreamingDetails>
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LiveStreamingDetails {
    /// Only set once the broadcast has actually begun.
    #[serde(rename = "actualStartTime")]
    pub actual_start_time: Option<Timestamp>,
    #[serde(rename = "scheduledStartTime")]
    pub scheduled_start_time: Option<Timestamp>,
}

impl LiveStreamingDetails {
    /// Scheduled, but not started yet.
    pub fn is_upcoming(&self) -> bool {
        self.actual_start_time.is_none()
    }
}

/// Who can see a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Unlisted,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown privacy status {0:?} (expected public, unlisted or private)")]
pub struct UnknownPrivacyStatus(pub String);

impl FromStr for PrivacyStatus {
    type Err = UnknownPrivacyStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "unlisted" => Ok(Self::Unlisted),
            "private" => Ok(Self::Private),
            _ => Err(UnknownPrivacyStatus(s.to_string())),
        }
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Unlisted => write!(f, "unlisted"),
            Self::Private => write!(f, "private"),
        }
    }
}

/// Request body for `videos.insert` with `part=snippet,status`.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos/insert>
#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertRequest {
    pub snippet: VideoInsertSnippet,
    pub status: VideoInsertStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertSnippet {
    /// At most 100 characters, and must not contain `<` or `>`.
    pub title: String,
    pub description: String,
    /// See <https://developers.google.com/youtube/v3/docs/videoCategories/list>; `22` is
    /// "People & Blogs".
    #[serde(rename = "categoryId")]
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoInsertStatus {
    #[serde(rename = "privacyStatus")]
    pub privacy_status: PrivacyStatus,
}
