//! Shared types for the YouTube API client.

/// Paging details for lists of resources.
///
/// We only ever ask for the first page, but the total is useful in debug logs.
///
/// See: <https://developers.google.com/youtube/v3/docs/pageInfo>
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PageInfo {
    /// The total number of results in the result set.
    #[serde(rename = "totalResults", default)]
    pub total_results: u32,
}
