//! HTTP plumbing for the YouTube Data API v3.

use crate::credentials::TokenCache;
use crate::youtube_api::{
    channels::ChannelListResponse,
    playlist_items::{PlaylistItem, PlaylistItemListResponse},
    videos::{Video, VideoInsertRequest, VideoListResponse},
};
use eyre::Context;
use http::Method;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// How requests to the API are authorized.
#[derive(Clone)]
pub enum Auth {
    /// A static API key; enough for reading public data.
    ApiKey(String),
    /// A user's OAuth credential; required for anything that acts on their channel.
    OAuth(Arc<TokenCache>),
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(..)"),
            Self::OAuth(tokens) => f.debug_tuple("OAuth").field(&tokens.path()).finish(),
        }
    }
}

/// Client for the parts of the YouTube Data API v3 we use.
///
/// All calls are bounded by the configured request timeout, except for the body of a video
/// upload, which gets its own (much longer) timeout.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    auth: Auth,
    /// HTTP client for API requests
    client: reqwest::Client,
    /// Scheme and host to send requests to, without a trailing slash.
    base_url: String,
    request_timeout: Duration,
}

impl YouTubeClient {
    pub fn new(
        auth: Auth,
        client: reqwest::Client,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            client,
            base_url: base_url.into(),
            request_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attaches whatever credential this client carries to `request`.
    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> eyre::Result<reqwest::RequestBuilder> {
        Ok(match &self.auth {
            // Google accepts the key as a header, which keeps it out of URLs in error messages.
            Auth::ApiKey(key) => request.header("X-Goog-Api-Key", key),
            Auth::OAuth(tokens) => {
                let access_token = tokens
                    .access_token()
                    .await
                    .context("obtain access token")?;
                request.bearer_auth(access_token)
            }
        })
    }

    /// Makes an authorized request to the YouTube API and checks that it succeeded.
    ///
    /// # Returns
    ///
    /// The raw [`reqwest::Response`] for method-specific JSON parsing.
    #[instrument(skip(self), level = tracing::Level::TRACE)]
    pub(crate) async fn make_request(
        &self,
        method: Method,
        url: &str,
        query_params: Option<&[(&str, &str)]>,
    ) -> eyre::Result<reqwest::Response> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .timeout(self.request_timeout);

        if let Some(params) = query_params {
            request = request.query(params);
        }

        let request = self.authorize(request).await?;
        let response = request
            .send()
            .await
            .with_context(|| format!("send {} request to YouTube API: {}", method, url))?;

        error_for_status(response, &method).await
    }

    /// Looks up the id of a channel's "uploads" playlist.
    ///
    /// Costs 1 quota unit.
    ///
    /// <https://developers.google.com/youtube/v3/docs/channels/list>
    #[instrument(skip(self), ret)]
    pub async fn uploads_playlist_id(&self, channel_id: &str) -> eyre::Result<String> {
        let url = self.url("/youtube/v3/channels");
        let query_params = [("part", "contentDetails"), ("id", channel_id)];

        let response = self
            .make_request(Method::GET, &url, Some(&query_params))
            .await?;

        let channels: ChannelListResponse = response
            .json()
            .await
            .context("parse YouTube channels API response as JSON")?;

        tracing::debug!(
            channel_id,
            total_results = channels.page_info.total_results,
            "fetched channel"
        );

        channels
            .items
            .into_iter()
            .next()
            .map(|channel| channel.content_details.related_playlists.uploads)
            .ok_or_else(|| eyre::eyre!("channel not found: {}", channel_id))
    }

    /// Returns the first item of a playlist, if it has any.
    ///
    /// For an uploads playlist that is the most recent upload. Costs 1 quota unit.
    ///
    /// <https://developers.google.com/youtube/v3/docs/playlistItems/list>
    #[instrument(skip(self), ret)]
    pub async fn first_playlist_item(
        &self,
        playlist_id: &str,
    ) -> eyre::Result<Option<PlaylistItem>> {
        let url = self.url("/youtube/v3/playlistItems");
        let query_params = [
            ("part", "snippet"),
            ("playlistId", playlist_id),
            ("maxResults", "1"),
        ];

        let response = self
            .make_request(Method::GET, &url, Some(&query_params))
            .await?;

        let items: PlaylistItemListResponse = response
            .json()
            .await
            .context("parse YouTube playlistItems API response as JSON")?;

        tracing::debug!(
            playlist_id,
            total_results = items.page_info.total_results,
            "fetched playlist head"
        );

        Ok(items.items.into_iter().next())
    }

    /// Gets the snippet and live streaming details of a single video.
    ///
    /// Costs 1 quota unit.
    ///
    /// <https://developers.google.com/youtube/v3/docs/videos/list>
    #[instrument(skip(self), ret)]
    pub async fn get_video(&self, video_id: &str) -> eyre::Result<Video> {
        let url = self.url("/youtube/v3/videos");
        let query_params = [("part", "snippet,liveStreamingDetails"), ("id", video_id)];

        let response = self
            .make_request(Method::GET, &url, Some(&query_params))
            .await?;

        let videos: VideoListResponse = response
            .json()
            .await
            .context("parse YouTube videos API response as JSON")?;

        videos
            .items
            .into_iter()
            .next()
            .ok_or_else(|| eyre::eyre!("video not found: {}", video_id))
    }

    /// Uploads a local file as a new video on the authorized channel.
    ///
    /// Uses the resumable upload protocol, but only as a transport: one request opens the
    /// upload session, a second one sends the whole file. An interrupted upload is not resumed.
    ///
    /// Requires [`Auth::OAuth`] with the `youtube.upload` scope. Costs 1600 quota units.
    ///
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>
    #[instrument(skip(self, metadata), fields(title = %metadata.snippet.title))]
    pub async fn insert_video(
        &self,
        metadata: &VideoInsertRequest,
        file: &Path,
        upload_timeout: Duration,
    ) -> eyre::Result<Video> {
        let media = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("open {}", file.display()))?;
        let length = media
            .metadata()
            .await
            .with_context(|| format!("stat {}", file.display()))?
            .len();

        let url = self.url("/upload/youtube/v3/videos");
        let query_params = [("uploadType", "resumable"), ("part", "snippet,status")];
        let request = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .query(&query_params)
            .header("X-Upload-Content-Length", length)
            .header("X-Upload-Content-Type", "video/*")
            .json(metadata);
        let response = self
            .authorize(request)
            .await?
            .send()
            .await
            .context("open resumable upload session")?;
        let response = error_for_status(response, &Method::POST).await?;

        let session = response
            .headers()
            .get(http::header::LOCATION)
            .ok_or_else(|| eyre::eyre!("upload session response has no Location header"))?
            .to_str()
            .context("upload session Location header is not valid UTF-8")?
            .to_string();
        tracing::debug!(bytes = length, "opened upload session");

        // The session URL itself authorizes the upload.
        let response = self
            .client
            .put(&session)
            .timeout(upload_timeout)
            .header(http::header::CONTENT_LENGTH, length)
            .header(http::header::CONTENT_TYPE, "video/*")
            .body(reqwest::Body::from(media))
            .send()
            .await
            .context("send video bytes")?;
        let response = error_for_status(response, &Method::PUT).await?;

        let video: Video = response
            .json()
            .await
            .context("parse YouTube upload response as JSON")?;

        tracing::debug!(video_id = %video.id, "upload complete");

        Ok(video)
    }
}

async fn error_for_status(
    response: reqwest::Response,
    method: &Method,
) -> eyre::Result<reqwest::Response> {
    let status_code = response.status();
    if !status_code.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(eyre::eyre!(
            "YouTube API {} request failed with status {}: {}",
            method,
            status_code,
            error_text
        ));
    }
    Ok(response)
}
