//! Mirror the newest upload of one YouTube channel onto another account.
//!
//! The [`poll::PollLoop`] asks an [`feed::UploadFeed`] for the channel's latest
//! upload, compares it with the [`cursor::CursorStore`], and hands genuinely
//! new videos to the [`pipeline::Pipeline`], which downloads them with
//! [`fetch::YtDlp`] and re-uploads them with [`publish::Uploader`].

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod channel_id;
pub mod config;
pub mod credentials;
pub mod cursor;
pub mod feed;
pub mod fetch;
pub mod oauth;
pub mod pipeline;
pub mod poll;
pub mod publish;
pub mod youtube_api;

/// The id YouTube uses to identify a single video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The public watch page for this video.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for VideoId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
