//! A small YouTube Data API v3 client.
//!
//! Only the handful of endpoints needed to find a channel's newest upload and to upload a
//! video are covered:
//!
//! 1. [`YouTubeClient::uploads_playlist_id`] maps a channel to its "uploads" playlist.
//! 2. [`YouTubeClient::first_playlist_item`] reads the newest entry of that playlist.
//! 3. [`YouTubeClient::get_video`] fetches the entry's live streaming details, which tell a
//!    finished upload apart from a scheduled broadcast.
//! 4. [`YouTubeClient::insert_video`] uploads a file to the account behind an OAuth token.
//!
//! The read calls work with a plain API key ([`Auth::ApiKey`]); uploading needs
//! [`Auth::OAuth`].

pub mod channels;
pub mod client;
pub mod playlist_items;
pub mod types;
pub mod videos;

pub use client::{Auth, YouTubeClient};
pub use types::PageInfo;

pub use channels::{Channel, ChannelListResponse};
pub use playlist_items::{PlaylistItem, PlaylistItemListResponse};
pub use videos::{
    LiveStreamingDetails, PrivacyStatus, Video, VideoInsertRequest, VideoInsertSnippet,
    VideoInsertStatus, VideoListResponse,
};
