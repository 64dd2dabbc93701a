//! Turning whatever the user configured into a canonical YouTube channel id.

use regex::Regex;
use reqwest::Url;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// `UC` followed by the id body. Real ids have a 22-character body, but we only insist on "long
/// enough" so that we don't reject ids from API mocks.
static CANONICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^UC[A-Za-z0-9_-]{19,}$").expect("valid regex"));

static CHANNEL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/channel/(UC[A-Za-z0-9_-]{19,})(?:/|$)").expect("valid regex")
});

/// The configured identifier is neither a channel id nor a URL containing one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "invalid channel identifier {input:?}: expected a channel id (UC...) \
     or a URL of the form https://www.youtube.com/channel/<id>"
)]
pub struct InvalidIdentifier {
    pub input: String,
}

/// A validated YouTube channel id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Resolves a channel id or a `/channel/<id>` URL into a [`ChannelId`].
    ///
    /// Handles (`@name`) and legacy `/c/` or `/user/` URLs are not resolved, since that would
    /// require a search API call that costs quota on every startup.
    pub fn resolve(input: &str) -> Result<Self, InvalidIdentifier> {
        let trimmed = input.trim();
        if CANONICAL.is_match(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }

        if let Ok(url) = Url::parse(trimmed)
            && matches!(url.scheme(), "http" | "https")
            && let Some(captures) = CHANNEL_PATH.captures(url.path())
        {
            return Ok(Self(captures[1].to_string()));
        }

        Err(InvalidIdentifier {
            input: input.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ChannelId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
