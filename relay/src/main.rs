use eyre::Context;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_relay::channel_id::ChannelId;
use youtube_relay::config::Config;
use youtube_relay::credentials::TokenCache;
use youtube_relay::cursor::FileCursor;
use youtube_relay::feed::ApiFeed;
use youtube_relay::fetch::{TrimStart, YtDlp};
use youtube_relay::oauth::OAuthManager;
use youtube_relay::pipeline::Pipeline;
use youtube_relay::poll::PollLoop;
use youtube_relay::publish::Uploader;
use youtube_relay::youtube_api::{Auth, YouTubeClient};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let config = Config::from_env().context("load configuration")?;
    let channel = ChannelId::resolve(&config.channel_identifier)?;

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| format!("create {}", config.download_dir.display()))?;
    let mut fetcher = YtDlp::new(&config.yt_dlp, &config.download_dir, config.download_timeout);
    if let Some(offset) = config.trim_start {
        tracing::info!(?offset, "trimming the start of each download");
        fetcher = fetcher.trim_start(TrimStart {
            ffmpeg: config.ffmpeg.clone(),
            offset,
        });
    }
    let version = fetcher
        .ensure_available()
        .await
        .context("yt-dlp is required to download videos")?;
    tracing::info!(%version, "found yt-dlp");

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("build HTTP client")?;

    let feed = ApiFeed::new(YouTubeClient::new(
        Auth::ApiKey(config.api_key.clone()),
        http.clone(),
        &config.api_base_url,
        config.request_timeout,
    ));

    let oauth = OAuthManager::new(
        &config.oauth_client_id,
        &config.oauth_client_secret,
        config.request_timeout,
    );
    let tokens = TokenCache::open(&config.token_file, oauth).context("open token cache")?;
    tokens
        .prepare()
        .await
        .context("authorize the destination account")?;
    let uploader = Uploader::new(
        YouTubeClient::new(
            Auth::OAuth(Arc::new(tokens)),
            http,
            &config.api_base_url,
            config.request_timeout,
        ),
        config.upload.clone(),
        config.upload_timeout,
    );

    let poller = PollLoop::new(
        channel,
        feed,
        Pipeline::new(fetcher, uploader),
        FileCursor::new(&config.cursor_file),
        config.poll_interval,
    );
    tracing::info!(
        channel = %poller.channel(),
        input = %config.channel_identifier,
        previous = ?poller.last_seen(),
        "resolved channel"
    );
    poller.run().await;

    Ok(())
}
