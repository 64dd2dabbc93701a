//! Process configuration, read once from the environment at startup.

use crate::youtube_api::PrivacyStatus;
use eyre::Context;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_API_BASE_URL: &str = "https://www.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    /// Key for the read-only Data API calls that watch the source channel.
    pub api_key: String,
    /// Channel id or `/channel/` URL of the channel to mirror.
    pub channel_identifier: String,
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub poll_interval: Duration,
    pub download_dir: PathBuf,
    pub cursor_file: PathBuf,
    pub token_file: PathBuf,
    pub yt_dlp: PathBuf,
    /// How much to cut off the start of each download; `None` leaves videos untouched.
    pub trim_start: Option<Duration>,
    pub ffmpeg: PathBuf,
    pub upload: UploadDefaults,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub upload_timeout: Duration,
}

/// Fixed metadata attached to every re-upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDefaults {
    pub description: String,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
}

impl Default for UploadDefaults {
    fn default() -> Self {
        Self {
            description: "Uploaded via script".to_string(),
            category_id: "22".to_string(),
            privacy_status: PrivacyStatus::Public,
        }
    }
}

impl Config {
    /// Reads the configuration from the process environment, after loading `.env` if present.
    pub fn from_env() -> eyre::Result<Self> {
        // a missing .env is the normal case
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> eyre::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| eyre::eyre!("missing required environment variable {key}"))
        };
        let seconds = |key: &str, default: u64| -> eyre::Result<Duration> {
            match get(key) {
                None => Ok(Duration::from_secs(default)),
                Some(v) => {
                    let secs: u64 = v
                        .trim()
                        .parse()
                        .with_context(|| format!("parse {key}={v:?} as a number of seconds"))?;
                    eyre::ensure!(secs > 0, "{key} must be greater than zero");
                    Ok(Duration::from_secs(secs))
                }
            }
        };

        let trim_start = match get("TRIM_START_SECONDS") {
            None => None,
            Some(v) => {
                let secs: u64 = v.trim().parse().with_context(|| {
                    format!("parse TRIM_START_SECONDS={v:?} as a number of seconds")
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
        };

        let defaults = UploadDefaults::default();
        let privacy_status = match get("UPLOAD_PRIVACY_STATUS") {
            None => defaults.privacy_status,
            Some(v) => v
                .parse()
                .with_context(|| format!("parse UPLOAD_PRIVACY_STATUS={v:?}"))?,
        };

        Ok(Self {
            api_key: required("YOUTUBE_API_KEY")?,
            channel_identifier: required("CHANNEL_IDENTIFIER")?,
            oauth_client_id: required("GOOGLE_CLIENT_ID")?,
            oauth_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            poll_interval: seconds("POLL_INTERVAL_SECONDS", 600)?,
            download_dir: get("DOWNLOAD_FOLDER")
                .unwrap_or_else(|| "downloads".to_string())
                .into(),
            cursor_file: get("LAST_VIDEO_FILE")
                .unwrap_or_else(|| "last_video.json".to_string())
                .into(),
            token_file: get("TOKEN_FILE")
                .unwrap_or_else(|| "token.json".to_string())
                .into(),
            yt_dlp: get("YT_DLP_PATH")
                .unwrap_or_else(|| "yt-dlp".to_string())
                .into(),
            trim_start,
            ffmpeg: get("FFMPEG_PATH")
                .unwrap_or_else(|| "ffmpeg".to_string())
                .into(),
            upload: UploadDefaults {
                description: get("UPLOAD_DESCRIPTION").unwrap_or(defaults.description),
                category_id: get("UPLOAD_CATEGORY_ID").unwrap_or(defaults.category_id),
                privacy_status,
            },
            api_base_url: get("YOUTUBE_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            request_timeout: seconds("REQUEST_TIMEOUT_SECONDS", 30)?,
            download_timeout: seconds("DOWNLOAD_TIMEOUT_SECONDS", 3600)?,
            upload_timeout: seconds("UPLOAD_TIMEOUT_SECONDS", 3600)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("YOUTUBE_API_KEY", "key"),
        ("CHANNEL_IDENTIFIER", "UCKsbPaQz7yZEKb9z2TXkxDg"),
        ("GOOGLE_CLIENT_ID", "client"),
        ("GOOGLE_CLIENT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let config = Config::from_lookup(env(REQUIRED)).unwrap();
        assert_eq!(config.api_key, "key");
        assert_eq!(config.poll_interval, Duration::from_secs(600));
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.cursor_file, PathBuf::from("last_video.json"));
        assert_eq!(config.token_file, PathBuf::from("token.json"));
        assert_eq!(config.yt_dlp, PathBuf::from("yt-dlp"));
        assert_eq!(config.trim_start, None);
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.upload, UploadDefaults::default());
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_honored() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("POLL_INTERVAL_SECONDS", "60"),
            ("DOWNLOAD_FOLDER", "/tmp/dl"),
            ("UPLOAD_PRIVACY_STATUS", "unlisted"),
            ("UPLOAD_CATEGORY_ID", "10"),
            ("YOUTUBE_API_BASE_URL", "http://localhost:8080/"),
        ]);
        let config = Config::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.download_dir, PathBuf::from("/tmp/dl"));
        assert_eq!(config.upload.privacy_status, PrivacyStatus::Unlisted);
        assert_eq!(config.upload.category_id, "10");
        assert_eq!(config.upload.description, "Uploaded via script");
        assert_eq!(config.api_base_url, "http://localhost:8080");
    }

    #[test]
    fn missing_required_var_is_an_error() {
        let err = Config::from_lookup(env(&REQUIRED[1..])).unwrap_err();
        assert!(err.to_string().contains("YOUTUBE_API_KEY"), "{err}");
    }

    #[test]
    fn malformed_values_are_errors() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("POLL_INTERVAL_SECONDS", "ten minutes"));
        assert!(Config::from_lookup(env(&vars)).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("POLL_INTERVAL_SECONDS", "0"));
        assert!(Config::from_lookup(env(&vars)).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("UPLOAD_PRIVACY_STATUS", "friends-only"));
        assert!(Config::from_lookup(env(&vars)).is_err());
    }

    #[test]
    fn trimming_is_opt_in() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([("TRIM_START_SECONDS", "5"), ("FFMPEG_PATH", "/opt/ffmpeg")]);
        let config = Config::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.trim_start, Some(Duration::from_secs(5)));
        assert_eq!(config.ffmpeg, PathBuf::from("/opt/ffmpeg"));

        let mut vars = REQUIRED.to_vec();
        vars.push(("TRIM_START_SECONDS", "0"));
        let config = Config::from_lookup(env(&vars)).unwrap();
        assert_eq!(config.trim_start, None);

        let mut vars = REQUIRED.to_vec();
        vars.push(("TRIM_START_SECONDS", "-5"));
        assert!(Config::from_lookup(env(&vars)).is_err());
    }
}
